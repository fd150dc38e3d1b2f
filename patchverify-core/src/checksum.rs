// patchverify-core/src/checksum.rs
//! Content checksums of an installed build tree.
//!
//! Every regular file contributes its relative path and the SHA-256 of its
//! content; every symlink contributes its path and link target. Directories
//! only matter through what they contain. Entries are visited in file-name
//! order, so the digest depends on the tree alone. The manifest is written
//! to a scratch directory outside the build root and removed afterwards.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use patchverify_common::error::{PatchVerifyError, Result};
use patchverify_common::platform::ChecksumExclusions;
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

const MANIFEST_FILE: &str = "manifest.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    digest: String,
    /// Relative path (`/`-separated) to per-entry digest.
    entries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    Changed(String),
    OnlyInSelf(String),
    OnlyInOther(String),
}

impl Checksum {
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Per-path differences, in path order.
    pub fn differences(&self, other: &Checksum) -> Vec<Difference> {
        let mut diffs = Vec::new();
        for (path, digest) in &self.entries {
            match other.entries.get(path) {
                Some(theirs) if theirs == digest => {}
                Some(_) => diffs.push(Difference::Changed(path.clone())),
                None => diffs.push(Difference::OnlyInSelf(path.clone())),
            }
        }
        for path in other.entries.keys() {
            if !self.entries.contains_key(path) {
                diffs.push(Difference::OnlyInOther(path.clone()));
            }
        }
        diffs.sort_by(|a, b| a.path().cmp(b.path()));
        diffs
    }
}

impl Difference {
    pub fn path(&self) -> &str {
        match self {
            Difference::Changed(p) | Difference::OnlyInSelf(p) | Difference::OnlyInOther(p) => p,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChecksumEngine {
    exclusions: ChecksumExclusions,
    scratch_parent: Option<PathBuf>,
}

impl ChecksumEngine {
    pub fn new(exclusions: ChecksumExclusions) -> Self {
        Self {
            exclusions,
            scratch_parent: None,
        }
    }

    /// Scratch directories are created under `dir` instead of the system
    /// temp directory. `dir` must not be inside any tree being checksummed.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_parent = Some(dir.into());
        self
    }

    /// Checksums the tree under `build_root`. The tree itself is never
    /// written to.
    pub fn checksum(&self, build_root: &Path) -> Result<Checksum> {
        debug!("Checksumming {}", build_root.display());
        let entries = self.collect_entries(build_root)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("patchverify-checksum-");
        let scratch = match &self.scratch_parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        let manifest_path = scratch.path().join(MANIFEST_FILE);
        {
            let mut manifest = BufWriter::new(File::create(&manifest_path)?);
            for (path, digest) in &entries {
                writeln!(manifest, "{digest}  {path}")?;
            }
            manifest.flush()?;
        }
        let digest = sha256_file(&manifest_path)?;
        scratch.close()?;

        debug!(
            "Checksum of {} is {} ({} entries)",
            build_root.display(),
            digest,
            entries.len()
        );
        Ok(Checksum { digest, entries })
    }

    /// Runs [`checksum`](Self::checksum) on the blocking pool.
    pub async fn checksum_async(&self, build_root: &Path) -> Result<Checksum> {
        let engine = self.clone();
        let root = build_root.to_path_buf();
        tokio::task::spawn_blocking(move || engine.checksum(&root))
            .await
            .map_err(|e| PatchVerifyError::Join(e.to_string()))?
    }

    fn collect_entries(&self, build_root: &Path) -> Result<BTreeMap<String, String>> {
        let mut entries = BTreeMap::new();
        let walker = WalkDir::new(build_root)
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1);
        for entry in walker {
            let entry = entry.map_err(|e| {
                PatchVerifyError::Io(std::sync::Arc::new(io::Error::other(format!(
                    "Failed to walk {}: {}",
                    build_root.display(),
                    e
                ))))
            })?;
            let relative = entry.path().strip_prefix(build_root).map_err(|e| {
                PatchVerifyError::Generic(format!(
                    "{} is not under {}: {}",
                    entry.path().display(),
                    build_root.display(),
                    e
                ))
            })?;
            if self.exclusions.is_excluded(relative) {
                debug!("Excluded from checksum: {}", relative.display());
                continue;
            }

            let file_type = entry.file_type();
            let digest = if file_type.is_symlink() {
                let target = fs::read_link(entry.path())?;
                format!("link:{}", target.to_string_lossy())
            } else if file_type.is_file() {
                format!("sha256:{}", sha256_file(entry.path())?)
            } else {
                continue;
            };
            entries.insert(relative_key(relative), digest);
        }
        Ok(entries)
    }
}

fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn tree(root: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
    }

    fn engine(scratch: &Path) -> ChecksumEngine {
        ChecksumEngine::new(ChecksumExclusions::default()).with_scratch_dir(scratch)
    }

    #[test]
    fn identical_trees_have_identical_checksums() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let files = [("bin/pycharm.sh", "run"), ("lib/app.jar", "app"), ("build.txt", "171.200")];
        tree(a.path(), &files);
        tree(b.path(), &files);

        let engine = engine(scratch.path());
        assert_eq!(
            engine.checksum(a.path()).unwrap().digest(),
            engine.checksum(b.path()).unwrap().digest()
        );
    }

    #[test]
    fn checksum_is_idempotent_and_leaves_no_residue() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        tree(root.path(), &[("lib/app.jar", "app"), ("build.txt", "1")]);

        let engine = engine(scratch.path());
        let first = engine.checksum(root.path()).unwrap();
        let second = engine.checksum(root.path()).unwrap();
        assert_eq!(first, second);

        let mut listing: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        listing.sort();
        assert_eq!(listing, vec!["build.txt", "lib"]);
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn content_and_path_changes_are_detected() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        tree(a.path(), &[("lib/app.jar", "app"), ("lib/old.jar", "old")]);
        tree(b.path(), &[("lib/app.jar", "app2"), ("lib/new.jar", "new")]);

        let engine = engine(scratch.path());
        let left = engine.checksum(a.path()).unwrap();
        let right = engine.checksum(b.path()).unwrap();
        assert_ne!(left.digest(), right.digest());
        assert_eq!(
            left.differences(&right),
            vec![
                Difference::Changed("lib/app.jar".into()),
                Difference::OnlyInOther("lib/new.jar".into()),
                Difference::OnlyInSelf("lib/old.jar".into()),
            ]
        );
    }

    #[test]
    fn excluded_entries_do_not_count() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        tree(a.path(), &[("lib/app.jar", "app"), ("uninstall.exe", "one")]);
        tree(b.path(), &[("lib/app.jar", "app"), ("uninstall.exe", "two"), ("jre/lib/server/classes.jsa", "x")]);

        let engine = ChecksumEngine::new(ChecksumExclusions::new(&["uninstall.exe"], &["jsa"]))
            .with_scratch_dir(scratch.path());
        assert_eq!(
            engine.checksum(a.path()).unwrap().digest(),
            engine.checksum(b.path()).unwrap().digest()
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_hash_their_target_not_their_content() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        tree(a.path(), &[("lib/app.jar", "app"), ("lib/other.jar", "app")]);
        tree(b.path(), &[("lib/app.jar", "app"), ("lib/other.jar", "app")]);
        std::os::unix::fs::symlink("lib/app.jar", a.path().join("current")).unwrap();
        std::os::unix::fs::symlink("lib/other.jar", b.path().join("current")).unwrap();

        let engine = engine(scratch.path());
        let left = engine.checksum(a.path()).unwrap();
        assert_eq!(left.entries()["current"], "link:lib/app.jar");
        assert_ne!(left.digest(), engine.checksum(b.path()).unwrap().digest());
    }
}
