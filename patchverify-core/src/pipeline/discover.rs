// patchverify-core/src/pipeline/discover.rs
use std::fs;
use std::path::{Path, PathBuf};

use patchverify_common::config::Config;
use patchverify_common::error::{PatchVerifyError, Result};
use patchverify_common::model::patch::{is_patch_file_name, PATCH_EXTENSION};
use patchverify_common::model::PatchArtifact;
use patchverify_net::BuildServerSource;
use tracing::{debug, info, warn};

use crate::oracle::Trial;

/// A unit of work, or a patch file whose name could not be understood.
#[derive(Debug, Clone)]
pub enum PlannedTrial {
    Ready(Trial),
    Invalid {
        name: String,
        error: PatchVerifyError,
    },
}

impl PlannedTrial {
    pub fn name(&self) -> &str {
        match self {
            PlannedTrial::Ready(trial) => &trial.name,
            PlannedTrial::Invalid { name, .. } => name,
        }
    }
}

/// `.jar` files in `dir` whose name contains `marker`, sorted by name.
/// Sidecars such as `<patch>.jar.sha256` are skipped.
pub fn discover_patch_files(dir: &Path, marker: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PatchVerifyError::Config(format!(
            "Patches directory {} does not exist",
            dir.display()
        )));
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.contains(marker) {
            continue;
        }
        if !is_patch_file_name(&name, marker) {
            debug!("Skipping {}: not a {} file", name, PATCH_EXTENSION);
            continue;
        }
        found.push(entry.path());
    }
    found.sort();
    debug!(
        "Found {} patch artifact(s) matching '{}' in {}",
        found.len(),
        marker,
        dir.display()
    );
    Ok(found)
}

/// Patch artifacts for this run: the configured directory, or the source
/// build's artifacts downloaded into the output directory.
pub async fn collect_patches(config: &Config) -> Result<Vec<PathBuf>> {
    if let Some(dir) = &config.patches_dir {
        return discover_patch_files(dir, &config.patch_marker);
    }
    let (Some(server), Some(build_id)) = (&config.server, &config.build_id) else {
        return Err(PatchVerifyError::Config(
            "No patch source: set patches, or server and buildId".to_string(),
        ));
    };
    let dest = config.fetched_patches_dir();
    tokio::fs::create_dir_all(&dest).await?;
    info!("Fetching patch artifacts of build {} into {}", build_id, dest.display());
    let source = BuildServerSource::new(server, Vec::new(), config.credentials.clone())?;
    let mut fetched = source
        .download_patches(build_id, &config.patch_marker, &dest)
        .await?;
    fetched.sort();
    Ok(fetched)
}

/// One trial per patch artifact and installer format, artifacts in order.
pub fn plan_trials(patches: &[PathBuf], config: &Config) -> Vec<PlannedTrial> {
    let mut plan = Vec::new();
    for path in patches {
        match PatchArtifact::parse(path, &config.patch_marker) {
            Ok(patch) => {
                for kind in &config.installer_kinds {
                    plan.push(PlannedTrial::Ready(Trial::new(patch.clone(), *kind)));
                }
            }
            Err(error) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                warn!("Skipping unparseable patch artifact {}: {}", name, error);
                plan.push(PlannedTrial::Invalid { name, error });
            }
        }
    }
    plan
}
