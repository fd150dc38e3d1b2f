// patchverify-core/src/install/mod.rs
use std::path::{Path, PathBuf};

use patchverify_common::config::Config;
use patchverify_common::error::Result;
use patchverify_common::model::InstallerDescriptor;
use tracing::{debug, info};

use crate::checksum::{Checksum, ChecksumEngine};

pub mod build_root;
pub mod extract;

/// An installer extracted into a trial workspace.
///
/// The tree lives inside the trial's workspace directory and goes away with
/// it. The checksum is computed on first request and cached until the tree
/// is modified.
#[derive(Debug)]
pub struct InstalledBuild {
    descriptor: InstallerDescriptor,
    build_root: PathBuf,
    checksum: Option<Checksum>,
}

impl InstalledBuild {
    /// Extracts `artifact` into `install_dir` and locates the build root.
    pub async fn install(
        descriptor: InstallerDescriptor,
        artifact: &Path,
        install_dir: &Path,
        config: &Config,
    ) -> Result<Self> {
        info!("Installing {} into {}", descriptor, install_dir.display());
        let kind = descriptor.kind();
        let options = extract::ExtractOptions::from_config(config);
        extract::extract(artifact, kind, install_dir, &options).await?;
        let build_root = build_root::locate(install_dir, kind.build_root_depth())?;
        debug!("Build root of {} is {}", descriptor, build_root.display());
        Ok(Self {
            descriptor,
            build_root,
            checksum: None,
        })
    }

    pub fn descriptor(&self) -> &InstallerDescriptor {
        &self.descriptor
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    pub async fn checksum(&mut self, engine: &ChecksumEngine) -> Result<&Checksum> {
        let checksum = match self.checksum.take() {
            Some(cached) => cached,
            None => engine.checksum_async(&self.build_root).await?,
        };
        Ok(self.checksum.insert(checksum))
    }

    /// Forgets the cached checksum after the tree has been modified.
    pub fn invalidate_checksum(&mut self) {
        self.checksum = None;
    }
}
