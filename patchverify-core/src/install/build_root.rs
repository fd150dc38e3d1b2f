// patchverify-core/src/install/build_root.rs
use std::fs;
use std::path::{Path, PathBuf};

use patchverify_common::error::{PatchVerifyError, Result};
use tracing::debug;

/// Descends `depth` levels from `install_dir`, requiring exactly one entry
/// at every level. The result must be a directory.
///
/// A tarball wraps its content in one versioned folder (depth 1); a Mac
/// archive adds `<Name>.app/Contents` (depth 2); a silent installer writes
/// straight into the target (depth 0).
pub fn locate(install_dir: &Path, depth: usize) -> Result<PathBuf> {
    let mut current = install_dir.to_path_buf();
    for _ in 0..depth {
        let mut entries = fs::read_dir(&current)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        if entries.len() != 1 {
            let mut found: Vec<String> = entries
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            found.sort();
            return Err(PatchVerifyError::AmbiguousLayout {
                dir: current,
                found,
            });
        }
        current = entries.remove(0);
        debug!("Descended into {}", current.display());
    }
    if !current.is_dir() {
        return Err(PatchVerifyError::Extraction(format!(
            "Build root candidate {} is not a directory",
            current.display()
        )));
    }
    Ok(current)
}
