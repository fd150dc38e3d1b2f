// patchverify-core/src/pipeline/engine.rs
use std::fs;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use patchverify_common::config::Config;
use patchverify_common::error::{ErrorKind, PatchVerifyError, Result};
use patchverify_common::model::{EquivalenceResult, Outcome, RunSummary};
use patchverify_common::pipeline::TrialEvent;
use patchverify_net::SourceChain;
use tempfile::TempDir;
use tracing::{debug, error, info, instrument, warn};

use super::discover::{collect_patches, plan_trials, PlannedTrial};
use crate::oracle::{EquivalenceOracle, Trial, Verdict};
use crate::patch::PatchApplier;
use crate::report::Reporter;

/// Everything a finished run produced.
#[derive(Debug, Default)]
pub struct RunReport {
    pub summary: RunSummary,
    pub results: Vec<EquivalenceResult>,
}

impl RunReport {
    fn record(&mut self, result: EquivalenceResult) {
        self.summary.record(result.outcome);
        self.results.push(result);
    }
}

/// Runs every trial of a configuration, one after another.
pub struct PipelineOrchestrator<'a> {
    config: &'a Config,
    sources: SourceChain,
    applier: PatchApplier,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        let sources = SourceChain::from_config(config)?;
        let applier = PatchApplier::new(config)?;
        Ok(Self::with_parts(config, sources, applier))
    }

    pub fn with_parts(config: &'a Config, sources: SourceChain, applier: PatchApplier) -> Self {
        Self {
            config,
            sources,
            applier,
        }
    }

    /// Errors returned here are fatal setup problems; trial failures are
    /// part of the report instead. A reporter that fails to write is logged
    /// and the remaining trials still run.
    #[instrument(skip_all, name = "pipeline")]
    pub async fn run(&self, reporter: &mut dyn Reporter) -> Result<RunReport> {
        info!("Installer sources: {}", self.sources.describe());
        let patches = collect_patches(self.config).await?;
        let plan = plan_trials(&patches, self.config);
        if plan.is_empty() {
            warn!(
                "No patch artifacts matching '{}' found",
                self.config.patch_marker
            );
        }
        emit(reporter, &TrialEvent::TrialCount { count: plan.len() });

        let mut report = RunReport::default();
        for planned in plan {
            emit(
                reporter,
                &TrialEvent::Started {
                    name: planned.name().to_string(),
                },
            );
            let result = match planned {
                PlannedTrial::Ready(trial) => self.run_trial(&trial).await,
                PlannedTrial::Invalid { name, error } => {
                    EquivalenceResult::from_error(&name, &error, Duration::ZERO)
                }
            };
            log_result(&result);
            for event in events_for(&result) {
                emit(reporter, &event);
            }
            report.record(result);
        }
        info!("Run finished: {}", report.summary);
        Ok(report)
    }

    /// Runs one trial in a fresh workspace that is removed afterwards,
    /// whatever happened inside.
    pub async fn run_trial(&self, trial: &Trial) -> EquivalenceResult {
        let started = Instant::now();
        let workspace = match self.create_workspace() {
            Ok(dir) => dir,
            Err(e) => return EquivalenceResult::from_error(&trial.name, &e, started.elapsed()),
        };
        debug!("Workspace for {}: {}", trial.name, workspace.path().display());

        let oracle = EquivalenceOracle::new(self.config, &self.sources, &self.applier);
        let outcome = AssertUnwindSafe(oracle.run(trial, workspace.path()))
            .catch_unwind()
            .await;
        let duration = started.elapsed();

        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!("Failed to remove trial workspace {}: {}", path.display(), e);
        } else {
            debug!("Removed trial workspace {}", path.display());
        }

        match outcome {
            Ok(Ok(Verdict::Equal { checksum })) => {
                EquivalenceResult::equal(&trial.name, checksum.digest(), duration)
            }
            Ok(Ok(Verdict::Unequal {
                patched,
                installed,
                differences,
            })) => EquivalenceResult::unequal(
                &trial.name,
                patched.digest(),
                installed.digest(),
                differences,
                duration,
            ),
            Ok(Err(e)) => EquivalenceResult::from_error(&trial.name, &e, duration),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let e = PatchVerifyError::Generic(format!("Trial panicked: {message}"));
                EquivalenceResult::from_error(&trial.name, &e, duration)
            }
        }
    }

    fn create_workspace(&self) -> Result<TempDir> {
        let parent = self.config.work_dir();
        fs::create_dir_all(&parent)?;
        Ok(tempfile::Builder::new()
            .prefix("patchverify-trial-")
            .tempdir_in(parent)?)
    }
}

fn emit(reporter: &mut dyn Reporter, event: &TrialEvent) {
    if let Err(e) = reporter.report(event) {
        error!("Failed to report {:?}: {}", event, e);
    }
}

fn log_result(result: &EquivalenceResult) {
    let cause = result.cause.as_deref().unwrap_or_default();
    match result.outcome {
        Outcome::Equal => info!("{}: checksums are equal", result.trial),
        Outcome::Unequal => error!("{}: {}", result.trial, cause),
        Outcome::Ignored => warn!("{}: ignored: {}", result.trial, cause),
        Outcome::Errored(ErrorKind::KnownFailure) => error!("{}: failed: {}", result.trial, cause),
        Outcome::Errored(kind) => {
            error!("{}: unexpected {:?} error: {}", result.trial, kind, cause)
        }
    }
}

/// Outcome-specific events followed by `Finished`.
pub fn events_for(result: &EquivalenceResult) -> Vec<TrialEvent> {
    let mut events = Vec::with_capacity(2);
    let cause = result.cause.clone().unwrap_or_default();
    match result.outcome {
        Outcome::Equal => {}
        Outcome::Ignored => events.push(TrialEvent::Ignored {
            name: result.trial.clone(),
            message: cause,
        }),
        Outcome::Unequal | Outcome::Errored(_) => events.push(TrialEvent::Failed {
            name: result.trial.clone(),
            message: cause,
            details: result.details.clone().unwrap_or_default(),
        }),
    }
    events.push(TrialEvent::finished(&result.trial, result.duration));
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_trials_only_finish() {
        let result = EquivalenceResult::equal("PY 1 -> 2 (zip)", "abc", Duration::from_millis(7));
        assert_eq!(
            events_for(&result),
            vec![TrialEvent::Finished {
                name: "PY 1 -> 2 (zip)".into(),
                duration_ms: 7
            }]
        );
    }

    #[test]
    fn missing_artifact_is_reported_as_ignored() {
        let err = PatchVerifyError::ArtifactNotFound {
            file: "pycharmPY-1.zip".into(),
            sources: "local:/x".into(),
        };
        let result = EquivalenceResult::from_error("PY 1 -> 2 (zip)", &err, Duration::ZERO);
        let events = events_for(&result);
        assert!(matches!(events[0], TrialEvent::Ignored { .. }));
        assert!(matches!(events[1], TrialEvent::Finished { .. }));
    }

    #[test]
    fn errors_are_reported_as_failures() {
        let err = PatchVerifyError::PatchRunnerUnexpectedExit(3);
        let result = EquivalenceResult::from_error("PY 1 -> 2 (zip)", &err, Duration::ZERO);
        match &events_for(&result)[0] {
            TrialEvent::Failed { message, .. } => assert!(message.contains("code 3")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
