// patchverify-core/src/lib.rs
pub mod checksum;
pub mod install;
pub mod oracle;
pub mod patch;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod signature;

pub use checksum::{Checksum, ChecksumEngine};
pub use install::InstalledBuild;
pub use oracle::{EquivalenceOracle, Trial, TrialState, Verdict};
pub use patch::{PatchApplier, PatchOutcome};
pub use pipeline::{PipelineOrchestrator, RunReport};
pub use report::{RecordingReporter, Reporter, ServiceMessageReporter};
