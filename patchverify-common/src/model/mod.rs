// patchverify-common/src/model/mod.rs
pub mod descriptor;
pub mod patch;
pub mod result;

pub use descriptor::InstallerDescriptor;
pub use patch::{Edition, PatchArtifact};
pub use result::{EquivalenceResult, Outcome, RunSummary};
