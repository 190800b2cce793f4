//! Core building blocks for Metaforge.
//!
//! Configuration, the generic correction loop, script execution and shared
//! text helpers.

mod config;
mod executor;
mod retry;
pub mod text;

pub use config::{AnalysisConfig, Config, GenerationConfig, LlmConfig, StorageConfig};
pub use executor::{ArtifactExecutor, ExecutionError, ExecutionOutcome, ScriptRunner};
pub use retry::{
    retry_with_correction, Rejection, RejectionKind, RetryConfig, RetryResult, Validator,
};
