//! Deliverable planning.
//!
//! Decides which artifact type best answers a request, or accepts an explicit
//! list from the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ArtifactType;
use crate::ai::{complete_bounded, CompletionOptions, LanguageModel};
use crate::analysis::AnalysisResult;
use crate::core::text::truncate_chars;
use crate::storage::{keys, persist_quietly, Storage};

/// Entries per list included in the planner summary.
const SUMMARY_ITEMS: usize = 3;

/// Characters of analysis text included in the planner summary.
const SUMMARY_SNIPPET: usize = 200;

/// Where a workflow's artifact list comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "artifact_types", rename_all = "snake_case")]
pub enum Plan {
    /// Let the planner choose a single deliverable.
    Decide,
    /// Use this ordered list as-is.
    Explicit(Vec<ArtifactType>),
}

/// Why the planner fell back to the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PlanningFailure {
    #[error("planner model call failed: {0}")]
    Model(String),

    #[error("planner answer named no known deliverable: {0:?}")]
    Undecidable(String),
}

/// Outcome of a planning decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDecision {
    pub artifact_type: ArtifactType,

    /// The model's answer, or a note on how the type was chosen.
    pub rationale: String,

    /// Set when the default was used instead of a real decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<PlanningFailure>,
}

/// Chooses a deliverable type from the domain analyses.
pub struct WorkflowPlanner {
    model: Arc<dyn LanguageModel>,
    storage: Arc<dyn Storage>,
    options: CompletionOptions,
}

impl WorkflowPlanner {
    /// Type used when no decision can be made.
    pub const DEFAULT: ArtifactType = ArtifactType::Report;

    pub fn new(
        model: Arc<dyn LanguageModel>,
        storage: Arc<dyn Storage>,
        options: CompletionOptions,
    ) -> Self {
        Self { model, storage, options }
    }

    /// Ask the model for the single best deliverable.
    ///
    /// Never fails: model errors and unrecognized answers fall back to
    /// [`Self::DEFAULT`] with a warning.
    pub async fn decide(
        &self,
        query: &str,
        analyses: &BTreeMap<String, AnalysisResult>,
        conversation_id: &str,
    ) -> PlanDecision {
        let prompt = build_prompt(query, analyses);
        persist_quietly(self.storage.as_ref(), &keys::planner_prompt(conversation_id), &prompt);

        let failure = match complete_bounded(self.model.as_ref(), &prompt, &self.options).await {
            Ok(answer) => match parse_decision(&answer) {
                Some(artifact_type) => {
                    tracing::info!(%artifact_type, conversation_id, "planner chose deliverable");
                    return PlanDecision {
                        artifact_type,
                        rationale: answer.trim().to_string(),
                        fallback: None,
                    };
                }
                None => PlanningFailure::Undecidable(truncate_chars(answer.trim(), 200).to_string()),
            },
            Err(e) => PlanningFailure::Model(e.to_string()),
        };

        tracing::warn!(error = %failure, default = %Self::DEFAULT, "planner fell back to default deliverable");
        PlanDecision {
            artifact_type: Self::DEFAULT,
            rationale: format!("defaulted to {}", Self::DEFAULT),
            fallback: Some(failure),
        }
    }
}

/// Per-domain digest of the analyses for the planner prompt.
pub fn summarize_analyses(analyses: &BTreeMap<String, AnalysisResult>) -> String {
    let mut summary = String::new();
    for (domain, result) in analyses {
        let findings: Vec<&str> =
            result.key_findings.iter().take(SUMMARY_ITEMS).map(String::as_str).collect();
        let recommendations: Vec<&str> =
            result.recommendations.iter().take(SUMMARY_ITEMS).map(String::as_str).collect();

        summary.push_str(&format!(
            "{} ANALYSIS:\nKey Findings: {}\nRecommendations: {}\nAnalysis Summary: {}...\n\n",
            domain.to_uppercase(),
            findings.join("; "),
            recommendations.join("; "),
            truncate_chars(&result.analysis_text, SUMMARY_SNIPPET),
        ));
    }
    summary
}

fn build_prompt(query: &str, analyses: &BTreeMap<String, AnalysisResult>) -> String {
    let mut prompt = format!(
        "You are a workflow planner. Based on the user request and the domain \
         analyses below, choose the SINGLE most appropriate deliverable.\n\n\
         USER REQUEST:\n{query}\n\nDOMAIN ANALYSES:\n{}",
        summarize_analyses(analyses)
    );
    prompt.push_str("AVAILABLE DELIVERABLES:\n");
    for ty in ArtifactType::ALL {
        prompt.push_str(&format!("- {}\n", ty.description()));
    }
    prompt.push_str("\nAnswer with one deliverable from the list and one sentence of justification.");
    prompt
}

/// Map a free-text answer onto an artifact type.
///
/// Matching is by lower-cased substring in precedence order: report,
/// diagram, presentation, document, code project. The bare word "report"
/// is not a keyword; a report is selected by "pdf".
pub fn parse_decision(answer: &str) -> Option<ArtifactType> {
    let lower = answer.to_lowercase();
    ArtifactType::ALL
        .into_iter()
        .find(|ty| ty.keywords().iter().any(|kw| lower.contains(kw)))
}
