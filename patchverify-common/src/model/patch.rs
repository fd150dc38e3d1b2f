// patchverify-common/src/model/patch.rs
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PatchVerifyError, Result};
use crate::model::descriptor::InstallerDescriptor;
use crate::platform::InstallerKind;

/// Edition codes accepted in patch file names. Anything else is read as "no
/// edition".
pub const RECOGNIZED_EDITIONS: &[&str] = &["PY", "PC", "PE", "IU", "IC"];

/// Legacy codes that are reported under a different label.
const LEGACY_EDITION_LABELS: &[(&str, &str)] = &[("PE", "EDU")];

pub const NO_RUNTIME_SUFFIX: &str = "no-jdk";
pub const PATCH_EXTENSION: &str = ".jar";

/// Whether a file name is a patch artifact for `marker`: it contains the
/// marker and is itself a `.jar`, so sidecars like `<patch>.jar.sha256` are
/// left out.
pub fn is_patch_file_name(name: &str, marker: &str) -> bool {
    name.contains(marker) && name.ends_with(PATCH_EXTENSION)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edition(String);

impl Edition {
    /// Normalises a raw token: recognized codes are kept (upper-cased),
    /// everything else becomes the empty edition.
    pub fn from_token(token: &str) -> Self {
        let upper = token.trim().to_ascii_uppercase();
        if RECOGNIZED_EDITIONS.contains(&upper.as_str()) {
            Edition(upper)
        } else {
            if !upper.is_empty() {
                debug!("Edition token '{}' is not recognized, treating as empty", token);
            }
            Edition::default()
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn display_label(&self) -> &str {
        LEGACY_EDITION_LABELS
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, label)| *label)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_label())
    }
}

/// An update package discovered on disk.
///
/// File names follow `<edition>-<previous>-<current>[-no-jdk].jar`, with the
/// edition possibly absent and an optional discriminator marker embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchArtifact {
    pub path: PathBuf,
    pub edition: Edition,
    pub previous_build: String,
    pub current_build: String,
    pub bundled_runtime: bool,
}

impl PatchArtifact {
    pub fn parse(path: &Path, marker: &str) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PatchVerifyError::PatchName(path.display().to_string(), "no file name".into())
            })?;
        let invalid = |reason: &str| PatchVerifyError::PatchName(file_name.to_string(), reason.into());

        let stem = file_name
            .strip_suffix(PATCH_EXTENSION)
            .ok_or_else(|| invalid("expected a .jar file"))?;
        let marker_core = marker.trim_end_matches(PATCH_EXTENSION);
        let stem = if marker_core.is_empty() {
            stem.to_string()
        } else {
            stem.replacen(marker_core, "", 1)
        };

        let mut tokens: Vec<&str> = stem.split('-').collect();
        let mut bundled_runtime = true;
        if tokens.len() >= 2 && tokens[tokens.len() - 2..] == ["no", "jdk"] {
            bundled_runtime = false;
            tokens.truncate(tokens.len() - 2);
        }

        let (edition_token, previous, current) = match tokens.as_slice() {
            [previous, current] => ("", *previous, *current),
            [edition, previous, current] if !starts_with_digit(edition) => {
                (*edition, *previous, *current)
            }
            _ => return Err(invalid("expected <edition>-<previous>-<current>[-no-jdk]")),
        };
        for build in [previous, current] {
            if !is_build_number(build) {
                return Err(invalid(&format!("'{build}' is not a build number")));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            edition: Edition::from_token(edition_token),
            previous_build: previous.to_string(),
            current_build: current.to_string(),
            bundled_runtime,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn previous_installer(&self, product: &str, kind: InstallerKind) -> InstallerDescriptor {
        self.installer(product, &self.previous_build, kind)
    }

    pub fn current_installer(&self, product: &str, kind: InstallerKind) -> InstallerDescriptor {
        self.installer(product, &self.current_build, kind)
    }

    fn installer(&self, product: &str, build: &str, kind: InstallerKind) -> InstallerDescriptor {
        InstallerDescriptor::new(
            product,
            self.edition.clone(),
            build,
            kind,
            self.bundled_runtime,
        )
    }

    /// Human-readable name of the trial for this artifact and format.
    pub fn trial_name(&self, kind: InstallerKind) -> String {
        let mut name = String::new();
        if !self.edition.is_empty() {
            name.push_str(self.edition.display_label());
            name.push(' ');
        }
        name.push_str(&format!("{} -> {}", self.previous_build, self.current_build));
        if !self.bundled_runtime {
            name.push(' ');
            name.push_str(NO_RUNTIME_SUFFIX);
        }
        name.push_str(&format!(" ({kind})"));
        name
    }
}

fn starts_with_digit(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn is_build_number(s: &str) -> bool {
    starts_with_digit(s) && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
}
