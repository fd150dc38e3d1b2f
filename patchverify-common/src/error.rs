use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// How a failure is reported by the pipeline.
///
/// Configuration problems are not product defects and must not be counted as
/// regressions; known failures are genuine findings; everything else means
/// the tool or the environment misbehaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    KnownFailure,
    Unexpected,
}

#[derive(Error, Debug, Clone)]
pub enum PatchVerifyError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("TOML Parsing Error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Unsupported installer format '{0}'")]
    UnsupportedFormat(String),

    #[error("Artifact '{file}' not found in any configured source ({sources})")]
    ArtifactNotFound { file: String, sources: String },

    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("Invalid patch artifact name '{0}': {1}")]
    PatchName(String, String),

    #[error("Ambiguous layout in {dir}: expected exactly one entry, found {found:?}")]
    AmbiguousLayout { dir: PathBuf, found: Vec<String> },

    #[error("Extraction Error: {0}")]
    Extraction(String),

    #[error("Failed to execute command: {0}")]
    CommandFailed(String),

    #[error("Support library '{library}' not found under {build_root}")]
    MissingSupportLibrary { library: String, build_root: PathBuf },

    #[error("Patch runner reported failure (exit code {0})")]
    PatchFailed(i32),

    #[error("Patch runner exited with unexpected code {0}")]
    PatchRunnerUnexpectedExit(i32),

    #[error("Patch runner did not finish within {0} seconds")]
    PatchRunnerTimeout(u64),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Signature verification failed for {0}")]
    SignatureMismatch(String),

    #[error("Task Error: {0}")]
    Join(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl PatchVerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchVerifyError::Config(_)
            | PatchVerifyError::UnsupportedFormat(_)
            | PatchVerifyError::ArtifactNotFound { .. } => ErrorKind::Configuration,
            PatchVerifyError::PatchFailed(_)
            | PatchVerifyError::ChecksumMismatch(_)
            | PatchVerifyError::SignatureMismatch(_) => ErrorKind::KnownFailure,
            _ => ErrorKind::Unexpected,
        }
    }
}

impl From<std::io::Error> for PatchVerifyError {
    fn from(err: std::io::Error) -> Self {
        PatchVerifyError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for PatchVerifyError {
    fn from(err: reqwest::Error) -> Self {
        PatchVerifyError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for PatchVerifyError {
    fn from(err: serde_json::Error) -> Self {
        PatchVerifyError::Json(Arc::new(err))
    }
}

impl From<toml::de::Error> for PatchVerifyError {
    fn from(err: toml::de::Error) -> Self {
        PatchVerifyError::Toml(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PatchVerifyError>;
