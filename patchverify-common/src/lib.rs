// patchverify-common/src/lib.rs
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod platform;

// Re-export key types
pub use config::Config;
pub use error::{ErrorKind, PatchVerifyError, Result};
pub use model::{EquivalenceResult, InstallerDescriptor, Outcome, PatchArtifact, RunSummary};
pub use platform::{InstallerKind, Platform};
