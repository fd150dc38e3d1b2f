// patchverify-core/src/oracle.rs
//! Decides whether patching the previous build yields exactly the tree a
//! fresh install of the current build produces.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use patchverify_common::config::Config;
use patchverify_common::error::{PatchVerifyError, Result};
use patchverify_common::model::PatchArtifact;
use patchverify_common::platform::InstallerKind;
use patchverify_net::SourceChain;
use tracing::{debug, info, instrument, warn};

use crate::checksum::{Checksum, ChecksumEngine, Difference};
use crate::install::InstalledBuild;
use crate::patch::PatchApplier;
use crate::signature;

/// Differences listed in an unequal verdict before truncating.
pub const MAX_REPORTED_DIFFERENCES: usize = 50;

/// One patch artifact checked against one installer format.
#[derive(Debug, Clone)]
pub struct Trial {
    pub patch: PatchArtifact,
    pub kind: InstallerKind,
    pub name: String,
}

impl Trial {
    pub fn new(patch: PatchArtifact, kind: InstallerKind) -> Self {
        let name = patch.trial_name(kind);
        Self { patch, kind, name }
    }
}

/// Progress of a trial. The previous build is fully installed, checksummed,
/// patched and checksummed again before the current build is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Init,
    PrevInstalled,
    PrevChecksummed,
    PrevPatched,
    PrevPostChecksummed,
    CurrInstalled,
    CurrChecksummed,
    Compared,
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub enum Verdict {
    Equal {
        checksum: Checksum,
    },
    Unequal {
        patched: Checksum,
        installed: Checksum,
        differences: String,
    },
}

/// Per-trial working directories, all under the trial workspace.
struct TrialDirs {
    downloads: PathBuf,
    previous: PathBuf,
    current: PathBuf,
    scratch: PathBuf,
}

impl TrialDirs {
    fn create(workspace: &Path) -> Result<Self> {
        let dirs = Self {
            downloads: workspace.join("downloads"),
            previous: workspace.join("previous"),
            current: workspace.join("current"),
            scratch: workspace.join("scratch"),
        };
        for dir in [&dirs.downloads, &dirs.scratch] {
            fs::create_dir_all(dir)?;
        }
        Ok(dirs)
    }
}

pub struct EquivalenceOracle<'a> {
    config: &'a Config,
    sources: &'a SourceChain,
    applier: &'a PatchApplier,
}

impl<'a> EquivalenceOracle<'a> {
    pub fn new(config: &'a Config, sources: &'a SourceChain, applier: &'a PatchApplier) -> Self {
        Self {
            config,
            sources,
            applier,
        }
    }

    /// Runs `trial` inside `workspace`, which the caller owns and removes.
    #[instrument(skip_all, fields(trial = %trial.name))]
    pub async fn run(&self, trial: &Trial, workspace: &Path) -> Result<Verdict> {
        let mut state = TrialState::Init;
        let result = self.run_steps(trial, workspace, &mut state).await;
        if let Err(e) = &result {
            warn!("Trial stopped in state {}: {}", state, e);
        }
        result
    }

    async fn run_steps(
        &self,
        trial: &Trial,
        workspace: &Path,
        state: &mut TrialState,
    ) -> Result<Verdict> {
        let dirs = TrialDirs::create(workspace)?;
        let engine = ChecksumEngine::new(trial.kind.checksum_exclusions())
            .with_scratch_dir(&dirs.scratch);
        let product = &self.config.product;

        // Both installers are located before any work so a missing one is
        // noticed early.
        let previous_descriptor = trial.patch.previous_installer(product, trial.kind);
        let current_descriptor = trial.patch.current_installer(product, trial.kind);
        let previous_artifact = self
            .sources
            .fetch(&previous_descriptor, &dirs.downloads)
            .await?;
        let current_artifact = self
            .sources
            .fetch(&current_descriptor, &dirs.downloads)
            .await?;

        let mut previous = InstalledBuild::install(
            previous_descriptor,
            &previous_artifact,
            &dirs.previous,
            self.config,
        )
        .await?;
        advance(state, TrialState::PrevInstalled);

        let before = previous.checksum(&engine).await?.digest().to_string();
        info!("Checksum of {} before patching: {}", previous.descriptor(), before);
        advance(state, TrialState::PrevChecksummed);
        self.check_signature_before_patch(trial.kind, previous.build_root())
            .await;

        let log_path = self.config.patch_log_path(&trial.name);
        let outcome = self
            .applier
            .apply(&trial.patch, previous.build_root(), &log_path)
            .await?;
        previous.invalidate_checksum();
        debug!("Patch outcome: {:?}", outcome);
        advance(state, TrialState::PrevPatched);

        let patched = previous.checksum(&engine).await?.clone();
        info!("Checksum of {} after patching: {}", previous.descriptor(), patched.digest());
        advance(state, TrialState::PrevPostChecksummed);
        self.check_signature_after_patch(trial.kind, previous.build_root())
            .await?;

        let mut current = InstalledBuild::install(
            current_descriptor,
            &current_artifact,
            &dirs.current,
            self.config,
        )
        .await?;
        advance(state, TrialState::CurrInstalled);

        let installed = current.checksum(&engine).await?.clone();
        info!("Checksum of {}: {}", current.descriptor(), installed.digest());
        advance(state, TrialState::CurrChecksummed);

        let verdict = compare(patched, installed);
        advance(state, TrialState::Compared);
        Ok(verdict)
    }

    /// An unsigned or broken previous build is noted but does not stop the
    /// trial; only damage done by the patch is a finding.
    async fn check_signature_before_patch(&self, kind: InstallerKind, build_root: &Path) {
        if !self.config.verify_signatures {
            return;
        }
        match signature::verify(kind, build_root, &self.config.codesign).await {
            Ok(Some(false)) => warn!(
                "Signature of {} does not verify before patching",
                build_root.display()
            ),
            Ok(_) => {}
            Err(e) => warn!("Could not check signature before patching: {}", e),
        }
    }

    async fn check_signature_after_patch(
        &self,
        kind: InstallerKind,
        build_root: &Path,
    ) -> Result<()> {
        if !self.config.verify_signatures {
            return Ok(());
        }
        match signature::verify(kind, build_root, &self.config.codesign).await? {
            Some(false) => Err(PatchVerifyError::SignatureMismatch(
                signature::bundle_for(build_root).display().to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn advance(state: &mut TrialState, next: TrialState) {
    debug!("Trial state {} -> {}", state, next);
    *state = next;
}

fn compare(patched: Checksum, installed: Checksum) -> Verdict {
    if patched.digest() == installed.digest() {
        return Verdict::Equal { checksum: patched };
    }
    let differences = describe_differences(&patched.differences(&installed));
    Verdict::Unequal {
        patched,
        installed,
        differences,
    }
}

/// Renders per-path differences between the patched build (left) and the
/// freshly installed build (right).
pub fn describe_differences(diffs: &[Difference]) -> String {
    let mut lines: Vec<String> = diffs
        .iter()
        .take(MAX_REPORTED_DIFFERENCES)
        .map(|diff| match diff {
            Difference::Changed(path) => format!("differs: {path}"),
            Difference::OnlyInSelf(path) => format!("only in patched build: {path}"),
            Difference::OnlyInOther(path) => format!("only in installed build: {path}"),
        })
        .collect();
    if diffs.len() > MAX_REPORTED_DIFFERENCES {
        lines.push(format!(
            "... and {} more",
            diffs.len() - MAX_REPORTED_DIFFERENCES
        ));
    }
    lines.join("\n")
}
