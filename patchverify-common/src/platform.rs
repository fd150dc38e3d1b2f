// patchverify-common/src/platform.rs
//! Platform and installer-format capabilities.
//!
//! Everything that differs between packaging formats lives on
//! [`InstallerKind`]: how an artifact is unpacked, how deep the product sits
//! inside the unpacked tree, which files are left out of the checksum and
//! whether a signature check exists. Adding a format means adding a variant
//! here; the pipeline only dispatches on it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PatchVerifyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    Linux,
    Mac,
}

impl Platform {
    pub fn tag(&self) -> &'static str {
        match self {
            Platform::Windows => "win",
            Platform::Linux => "linux",
            Platform::Mac => "mac",
        }
    }

    /// Installer formats tested when `customExtensions` is not set.
    pub fn default_extensions(&self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &["exe", "zip"],
            Platform::Linux => &["tar.gz"],
            Platform::Mac => &["sit"],
        }
    }

    pub fn default_kinds(&self) -> Vec<InstallerKind> {
        self.default_extensions()
            .iter()
            .filter_map(|ext| InstallerKind::for_platform(*self, ext).ok())
            .collect()
    }
}

impl FromStr for Platform {
    type Err = PatchVerifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win" | "windows" => Ok(Platform::Windows),
            "linux" | "unix" => Ok(Platform::Linux),
            "mac" | "macos" | "osx" => Ok(Platform::Mac),
            other => Err(PatchVerifyError::Config(format!(
                "Unknown platform '{other}' (expected win, linux or mac)"
            ))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How an installer artifact is turned into a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Run the installer binary silently with a destination argument.
    SilentInstaller,
    Zip,
    /// Gunzip to an intermediate `.tar`, then untar.
    GzippedTar,
    /// Unpack with the external `ditto` tool.
    Ditto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallerKind {
    WindowsExecutable,
    WindowsArchive,
    LinuxTarball,
    MacArchive,
}

impl InstallerKind {
    /// Resolves a configured extension for the target platform.
    pub fn for_platform(platform: Platform, extension: &str) -> Result<Self> {
        let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        let kind = match (platform, ext.as_str()) {
            (Platform::Windows, "exe") => InstallerKind::WindowsExecutable,
            (Platform::Windows, "zip") => InstallerKind::WindowsArchive,
            (Platform::Linux, "tar.gz") => InstallerKind::LinuxTarball,
            (Platform::Mac, "sit") => InstallerKind::MacArchive,
            _ => {
                return Err(PatchVerifyError::UnsupportedFormat(format!(
                    "{ext} (platform {platform})"
                )))
            }
        };
        Ok(kind)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            InstallerKind::WindowsExecutable => "exe",
            InstallerKind::WindowsArchive => "zip",
            InstallerKind::LinuxTarball => "tar.gz",
            InstallerKind::MacArchive => "sit",
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            InstallerKind::WindowsExecutable | InstallerKind::WindowsArchive => Platform::Windows,
            InstallerKind::LinuxTarball => Platform::Linux,
            InstallerKind::MacArchive => Platform::Mac,
        }
    }

    pub fn extraction(&self) -> Extraction {
        match self {
            InstallerKind::WindowsExecutable => Extraction::SilentInstaller,
            InstallerKind::WindowsArchive => Extraction::Zip,
            InstallerKind::LinuxTarball => Extraction::GzippedTar,
            InstallerKind::MacArchive => Extraction::Ditto,
        }
    }

    /// Number of single-entry directories between the extraction directory
    /// and the build root. Archives wrap the product in a version-named
    /// folder; on macOS the `.app` bundle adds a `Contents` level.
    pub fn build_root_depth(&self) -> usize {
        match self {
            InstallerKind::WindowsExecutable => 0,
            InstallerKind::WindowsArchive | InstallerKind::LinuxTarball => 1,
            InstallerKind::MacArchive => 2,
        }
    }

    pub fn checksum_exclusions(&self) -> ChecksumExclusions {
        match self.platform() {
            // The uninstaller and the CDS archive are written by the
            // installer or the first run, never by the patch.
            Platform::Windows => ChecksumExclusions::new(&["uninstall.exe"], &["jsa"]),
            Platform::Mac => ChecksumExclusions::new(&[], &["dylib", "jnilib"]),
            Platform::Linux => ChecksumExclusions::default(),
        }
    }

    pub fn supports_signature_check(&self) -> bool {
        matches!(self, InstallerKind::MacArchive)
    }
}

impl fmt::Display for InstallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Files left out of a build-root checksum.
///
/// File names and extensions are matched case-insensitively against the last
/// path component only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumExclusions {
    file_names: Vec<String>,
    extensions: Vec<String>,
}

impl ChecksumExclusions {
    pub fn new(file_names: &[&str], extensions: &[&str]) -> Self {
        Self {
            file_names: file_names.iter().map(|s| s.to_ascii_lowercase()).collect(),
            extensions: extensions.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_names.is_empty() && self.extensions.is_empty()
    }

    pub fn is_excluded(&self, relative_path: &Path) -> bool {
        let Some(name) = relative_path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_ascii_lowercase();
        if self.file_names.iter().any(|n| *n == name) {
            return true;
        }
        match name.rsplit_once('.') {
            Some((_, ext)) => self.extensions.iter().any(|e| e == ext),
            None => false,
        }
    }
}
