// patchverify-net/src/lib.rs
pub mod build_server;
pub mod http;
pub mod source;
pub mod validation;

pub use build_server::BuildServerSource;
pub use source::{ArtifactSource, LocalDirSource, SourceChain};
pub use validation::validate_url;
