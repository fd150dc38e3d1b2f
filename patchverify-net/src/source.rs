// patchverify-net/src/source.rs
use std::path::{Path, PathBuf};

use patchverify_common::config::Config;
use patchverify_common::error::{PatchVerifyError, Result};
use patchverify_common::model::InstallerDescriptor;
use tracing::{debug, warn};

use crate::build_server::BuildServerSource;

/// A directory of already-downloaded installers. Files are used in place:
/// sources are read-only for the duration of a run.
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    dir: PathBuf,
}

impl LocalDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn fetch(&self, descriptor: &InstallerDescriptor) -> Option<PathBuf> {
        let candidate = self.dir.join(descriptor.file_name());
        if candidate.is_file() {
            Some(candidate)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub enum ArtifactSource {
    Local(LocalDirSource),
    BuildServer(BuildServerSource),
}

impl ArtifactSource {
    pub fn describe(&self) -> String {
        match self {
            ArtifactSource::Local(source) => format!("local:{}", source.dir.display()),
            ArtifactSource::BuildServer(source) => source.describe(),
        }
    }

    /// Returns a local path to the installer, downloading into `dest_dir`
    /// when needed. `Ok(None)` means this source does not have it.
    pub async fn fetch(
        &self,
        descriptor: &InstallerDescriptor,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        match self {
            ArtifactSource::Local(source) => Ok(source.fetch(descriptor)),
            ArtifactSource::BuildServer(source) => source.fetch(descriptor, dest_dir).await,
        }
    }
}

/// Configured sources, tried in order.
#[derive(Debug, Clone, Default)]
pub struct SourceChain {
    sources: Vec<ArtifactSource>,
}

impl SourceChain {
    pub fn new(sources: Vec<ArtifactSource>) -> Self {
        Self { sources }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut sources = Vec::new();
        if let Some(dir) = &config.installers_dir {
            sources.push(ArtifactSource::Local(LocalDirSource::new(dir)));
        }
        if let Some(server) = &config.server {
            if !config.build_configuration_ids.is_empty() {
                sources.push(ArtifactSource::BuildServer(BuildServerSource::new(
                    server,
                    config.build_configuration_ids.clone(),
                    config.credentials.clone(),
                )?));
            }
        }
        Ok(Self { sources })
    }

    pub fn describe(&self) -> String {
        self.sources
            .iter()
            .map(ArtifactSource::describe)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A source that fails outright is skipped; if nothing else has the
    /// installer, that failure is returned instead of "not found" so a
    /// broken server is not mistaken for a missing build.
    pub async fn fetch(&self, descriptor: &InstallerDescriptor, dest_dir: &Path) -> Result<PathBuf> {
        let mut last_error: Option<PatchVerifyError> = None;
        for source in &self.sources {
            match source.fetch(descriptor, dest_dir).await {
                Ok(Some(path)) => {
                    debug!("Found {} in {}", descriptor, source.describe());
                    return Ok(path);
                }
                Ok(None) => debug!("{} not in {}", descriptor, source.describe()),
                Err(e) => {
                    warn!("Source {} failed for {}: {}", source.describe(), descriptor, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| PatchVerifyError::ArtifactNotFound {
            file: descriptor.file_name(),
            sources: self.describe(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use patchverify_common::model::Edition;
    use patchverify_common::platform::InstallerKind;

    use super::*;

    fn descriptor(build: &str) -> InstallerDescriptor {
        InstallerDescriptor::new(
            "pycharm",
            Edition::from_token("PY"),
            build,
            InstallerKind::LinuxTarball,
            true,
        )
    }

    #[tokio::test]
    async fn local_source_finds_installers_in_place() {
        let installers = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let file = installers.path().join("pycharmPY-171.100.tar.gz");
        fs::write(&file, b"archive").unwrap();

        let chain = SourceChain::new(vec![ArtifactSource::Local(LocalDirSource::new(
            installers.path(),
        ))]);
        assert_eq!(chain.fetch(&descriptor("171.100"), dest.path()).await.unwrap(), file);
    }

    #[tokio::test]
    async fn missing_everywhere_is_artifact_not_found() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let chain = SourceChain::new(vec![
            ArtifactSource::Local(LocalDirSource::new(first.path())),
            ArtifactSource::Local(LocalDirSource::new(second.path())),
        ]);
        let err = chain
            .fetch(&descriptor("171.999"), first.path())
            .await
            .unwrap_err();
        match err {
            PatchVerifyError::ArtifactNotFound { file, sources } => {
                assert_eq!(file, "pycharmPY-171.999.tar.gz");
                assert!(sources.contains(&first.path().display().to_string()));
                assert!(sources.contains(&second.path().display().to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn later_sources_are_consulted() {
        let empty = tempfile::tempdir().unwrap();
        let full = tempfile::tempdir().unwrap();
        let file = full.path().join("pycharmPY-171.200.tar.gz");
        fs::write(&file, b"archive").unwrap();
        let chain = SourceChain::new(vec![
            ArtifactSource::Local(LocalDirSource::new(empty.path())),
            ArtifactSource::Local(LocalDirSource::new(full.path())),
        ]);
        assert_eq!(chain.fetch(&descriptor("171.200"), empty.path()).await.unwrap(), file);
    }
}
