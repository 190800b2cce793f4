//! Conversation record.
//!
//! One [`SystemState`] per conversation holds everything needed to resume it:
//! the analyses, the plan, the step chain and a log of what happened.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisResult, IntegrationReport};
use crate::storage::{keys, load_record, save_record, Storage, StorageError};
use crate::workflow::{ArtifactRef, Plan, PlanDecision, WorkflowManager};

/// Lifecycle of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Analyzing,
    Planned,
    Running,
    Completed,
    Failed,
}

impl ConversationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Planned => "planned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Stage names used in the event log.
pub mod stage {
    pub const ANALYSIS: &str = "analysis";
    pub const INTEGRATION: &str = "integration";
    pub const PLANNING: &str = "planning";
    pub const STEP_STARTED: &str = "step_started";
    pub const STEP_COMPLETED: &str = "step_completed";
    pub const STEP_FAILED: &str = "step_failed";
    pub const STEP_MODIFIED: &str = "step_modified";
}

/// One entry of the processing log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingEvent {
    pub stage: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Persisted record of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub conversation_id: String,
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Keyed by domain name
    pub analysis_results: BTreeMap<String, AnalysisResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<IntegrationReport>,

    pub plan: Plan,

    /// Planner outcome when the plan was decided rather than given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<PlanDecision>,

    pub workflow: WorkflowManager,

    /// Every artifact produced, including ones later superseded
    #[serde(default)]
    pub generated_artifacts: Vec<ArtifactRef>,

    #[serde(default)]
    pub events: Vec<ProcessingEvent>,

    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SystemState {
    pub fn new(
        conversation_id: impl Into<String>,
        query: impl Into<String>,
        context: Option<String>,
        plan: Plan,
    ) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            query: query.into(),
            context,
            analysis_results: BTreeMap::new(),
            integration: None,
            plan,
            decision: None,
            workflow: WorkflowManager::new(),
            generated_artifacts: Vec::new(),
            events: Vec::new(),
            status: ConversationStatus::Analyzing,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append to the processing log.
    pub fn record_event(&mut self, stage: &str, detail: impl Into<String>) {
        let now = Utc::now();
        self.events.push(ProcessingEvent { stage: stage.to_string(), detail: detail.into(), at: now });
        self.updated_at = now;
    }

    /// Recompute `status` from the workflow.
    pub fn refresh_status(&mut self) {
        if self.status == ConversationStatus::Analyzing || self.workflow.is_empty() {
            return;
        }
        self.status = if self.workflow.is_complete() {
            ConversationStatus::Completed
        } else if self.workflow.steps().iter().any(|s| s.failure.is_some()) {
            ConversationStatus::Failed
        } else if self.workflow.steps().iter().any(|s| s.executed) {
            ConversationStatus::Running
        } else {
            ConversationStatus::Planned
        };
    }

    /// Integration insights for step prompts, if integration ran.
    pub fn integration_insights(&self) -> Option<String> {
        self.integration.as_ref().map(IntegrationReport::insights)
    }

    /// Overwrite the stored record.
    pub fn save(&self, storage: &dyn Storage) -> Result<(), StorageError> {
        save_record(storage, &keys::system_state(&self.conversation_id), self)
    }

    pub fn load(storage: &dyn Storage, conversation_id: &str) -> Result<Option<Self>, StorageError> {
        load_record(storage, &keys::system_state(conversation_id))
    }
}
