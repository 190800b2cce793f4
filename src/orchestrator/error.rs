//! Caller-facing error type.

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisError;
use crate::generation::GenerationError;
use crate::storage::StorageError;
use crate::workflow::WorkflowError;

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Analysis,
    Generation,
    Parse,
    InvalidRequest,
    NotFound,
    State,
}

/// Pipeline error types.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid conversation state: {0}")]
    State(String),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::Analysis(AnalysisError::InvalidRequest(_)) => FailureKind::InvalidRequest,
            Self::Analysis(_) => FailureKind::Analysis,
            Self::Generation(GenerationError::ParseFailure { .. }) => FailureKind::Parse,
            Self::Generation(_) => FailureKind::Generation,
            Self::Workflow(WorkflowError::UnknownStep(_)) | Self::ConversationNotFound(_) => {
                FailureKind::NotFound
            }
            Self::Workflow(WorkflowError::EmptyWorkflow) => FailureKind::InvalidRequest,
            Self::Workflow(WorkflowError::DependenciesNotMet { .. }) | Self::Storage(_) | Self::State(_) => {
                FailureKind::State
            }
        }
    }
}
