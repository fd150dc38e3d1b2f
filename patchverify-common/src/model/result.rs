use std::fmt;
use std::time::Duration;

use crate::error::{ErrorKind, PatchVerifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Patched previous build and fresh current build checksum the same.
    Equal,
    /// Both checksums were computed and differ: a product defect.
    Unequal,
    /// The environment could not supply an artifact; not a defect.
    Ignored,
    Errored(ErrorKind),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Equal => f.write_str("equal"),
            Outcome::Unequal => f.write_str("unequal"),
            Outcome::Ignored => f.write_str("ignored"),
            Outcome::Errored(ErrorKind::KnownFailure) => f.write_str("failed"),
            Outcome::Errored(_) => f.write_str("errored"),
        }
    }
}

/// Outcome of one (patch artifact x installer format) trial.
#[derive(Debug, Clone)]
pub struct EquivalenceResult {
    pub trial: String,
    pub outcome: Outcome,
    pub previous_checksum: Option<String>,
    pub current_checksum: Option<String>,
    pub cause: Option<String>,
    pub details: Option<String>,
    pub duration: Duration,
}

impl EquivalenceResult {
    pub fn equal(trial: &str, checksum: &str, duration: Duration) -> Self {
        Self {
            trial: trial.to_string(),
            outcome: Outcome::Equal,
            previous_checksum: Some(checksum.to_string()),
            current_checksum: Some(checksum.to_string()),
            cause: None,
            details: None,
            duration,
        }
    }

    pub fn unequal(
        trial: &str,
        previous: &str,
        current: &str,
        differences: String,
        duration: Duration,
    ) -> Self {
        Self {
            trial: trial.to_string(),
            outcome: Outcome::Unequal,
            previous_checksum: Some(previous.to_string()),
            current_checksum: Some(current.to_string()),
            cause: Some(
                PatchVerifyError::ChecksumMismatch(format!(
                    "patched build {previous} vs installed build {current}"
                ))
                .to_string(),
            ),
            details: Some(differences),
            duration,
        }
    }

    /// Classifies an error raised inside a trial.
    ///
    /// Only a missing artifact is ignored; other configuration-class errors
    /// cannot legitimately surface mid-trial and are reported as errors.
    pub fn from_error(trial: &str, err: &PatchVerifyError, duration: Duration) -> Self {
        let outcome = match err {
            PatchVerifyError::ArtifactNotFound { .. } => Outcome::Ignored,
            other => Outcome::Errored(other.kind()),
        };
        Self {
            trial: trial.to_string(),
            outcome,
            previous_checksum: None,
            current_checksum: None,
            cause: Some(err.to_string()),
            details: Some(format!("{err:?}")),
            duration,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub equal: usize,
    pub unequal: usize,
    pub ignored: usize,
    pub errored: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Equal => self.equal += 1,
            Outcome::Unequal => self.unequal += 1,
            Outcome::Ignored => self.ignored += 1,
            Outcome::Errored(_) => self.errored += 1,
        }
    }

    /// Ignored trials never fail a run.
    pub fn is_success(&self) -> bool {
        self.unequal == 0 && self.errored == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} trial(s): {} equal, {} unequal, {} ignored, {} errored",
            self.total, self.equal, self.unequal, self.ignored, self.errored
        )
    }
}
