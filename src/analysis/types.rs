//! Analysis request and result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One domain's view of a user query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// The user's request. Must not be blank.
    pub query: String,

    /// Name of the domain profile that should answer.
    pub domain: String,

    /// Optional background supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Optional extra direction for this analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_instructions: Option<String>,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            domain: domain.into(),
            context: None,
            extra_instructions: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_extra_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.extra_instructions = Some(instructions.into());
        self
    }
}

/// Structured analysis produced by one domain expert.
///
/// Produced once per domain per conversation and never modified afterwards.
/// The three lists are never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub domain: String,
    pub analysis_text: String,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,

    /// Share of the three lists that were extracted from the model's text
    /// rather than filled with placeholders, in `[0, 1]`.
    pub confidence: f64,

    pub created_at: DateTime<Utc>,
}
