//! Deliverable workflows.
//!
//! Provides:
//! - Artifact types and how each one is generated
//! - Planning: choosing the deliverable for a request
//! - The linear step chain with prompt accumulation and forward reset
//! - Step prompt construction

mod artifact;
mod manager;
pub mod planning;
pub mod prompts;

pub use artifact::{ArtifactRef, ArtifactType, GenerationShape};
pub use manager::{
    GeneratedPrompt, StepFailure, StepFailureKind, StepStatus, StepStatusEntry, WorkflowError,
    WorkflowManager, WorkflowStatus, WorkflowStep,
};
pub use planning::{parse_decision, Plan, PlanDecision, PlanningFailure, WorkflowPlanner};
pub use prompts::{StepContext, StepPromptBuilder};
