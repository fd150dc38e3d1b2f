// patchverify-core/src/pipeline/mod.rs
pub mod discover;
pub mod engine;

pub use discover::{collect_patches, discover_patch_files, plan_trials, PlannedTrial};
pub use engine::{events_for, PipelineOrchestrator, RunReport};
