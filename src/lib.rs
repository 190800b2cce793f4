#![allow(clippy::format_push_string)]

//! # Metaforge
//!
//! Multi-domain analysis that ends in a generated deliverable.
//!
//! A request is analyzed by several domain experts, a planner picks the
//! deliverable (report, diagram, presentation, document or code project) and
//! a linear workflow of generation steps produces it. Each step generates
//! through a self-correcting loop: the model writes a script or a project
//! blueprint, the candidate is executed or parsed, and failures are fed back
//! into the next prompt.
//!
//! ## Features
//!
//! - **Domain experts**: one analysis per configured domain, run concurrently
//! - **Workflow planning**: model-driven choice of deliverable with a safe default
//! - **Step chains**: later steps see the prompts of earlier ones; editing a step redoes it and everything after it
//! - **Self-correction**: execution and parse errors are sent back to the model
//! - **Resumable**: the conversation state is persisted after every transition
//!
//! ## Quick Start
//!
//! ```bash
//! metaforge run "Design a line-following robot" --workflow diagram,report
//! metaforge status <conversation_id>
//! metaforge modify <conversation_id> step_2_report --feedback "Add a cost table"
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::unnecessary_literal_bound)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::unnecessary_map_or)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::unnecessary_debug_formatting)]
#![allow(clippy::for_kv_map)]
#![allow(clippy::use_self)]
#![allow(clippy::ptr_arg)]

pub mod ai;
pub mod analysis;
pub mod core;
pub mod generation;
pub mod orchestrator;
pub mod storage;
pub mod workflow;

// Re-export commonly used types
pub use ai::{LanguageModel, LlmError, ModelChain, ScriptedModel};
pub use analysis::{AnalysisResult, DomainProfile};
pub use crate::core::{Config, ScriptRunner};
pub use orchestrator::{
    FailureKind, Orchestrator, PipelineError, RunOutcome, StepOutcome, SystemState,
};
pub use storage::{FileStore, MemoryStore, Storage};
pub use workflow::{ArtifactRef, ArtifactType, Plan, WorkflowStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "metaforge";
