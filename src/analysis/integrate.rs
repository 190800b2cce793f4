//! Cross-domain integration report.
//!
//! An optional pass that reads every domain analysis at once and looks for
//! conflicts and shared recommendations. Its output is advisory: failures are
//! logged and the pipeline carries on without a report.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::extract::clean_bullet;
use super::AnalysisResult;
use crate::ai::{complete_bounded, CompletionOptions, LanguageModel, LlmError};
use crate::storage::{keys, persist_quietly, Storage};

const MAX_ITEMS: usize = 7;

/// Synthesis of all domain analyses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationReport {
    pub analysis: String,
    pub cross_domain_issues: Vec<String>,
    pub unified_recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl IntegrationReport {
    /// Short text block for inclusion in step prompts.
    pub fn insights(&self) -> String {
        let mut out = String::from("CROSS-DOMAIN INTEGRATION INSIGHTS:\n");
        if !self.cross_domain_issues.is_empty() {
            out.push_str("Issues:\n");
            for issue in &self.cross_domain_issues {
                out.push_str(&format!("- {issue}\n"));
            }
        }
        if !self.unified_recommendations.is_empty() {
            out.push_str("Unified recommendations:\n");
            for rec in &self.unified_recommendations {
                out.push_str(&format!("- {rec}\n"));
            }
        }
        out
    }
}

pub struct DomainIntegrator {
    model: Arc<dyn LanguageModel>,
    storage: Arc<dyn Storage>,
    options: CompletionOptions,
}

impl DomainIntegrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        storage: Arc<dyn Storage>,
        options: CompletionOptions,
    ) -> Self {
        Self { model, storage, options }
    }

    pub fn build_prompt(query: &str, analyses: &BTreeMap<String, AnalysisResult>) -> String {
        let mut prompt = String::from(
            "You are a systems integration lead. Review the domain analyses below and \
             identify where they interact or conflict.\n\n",
        );
        prompt.push_str(&format!("USER REQUEST:\n{query}\n\n"));
        for (domain, result) in analyses {
            prompt.push_str(&format!("=== {} ===\n{}\n\n", domain.to_uppercase(), result.analysis_text));
        }
        prompt.push_str(
            "Respond with a short integration analysis, then a section headed \
             \"CROSS-DOMAIN ISSUES:\" and a section headed \"UNIFIED RECOMMENDATIONS:\", \
             one item per line.",
        );
        prompt
    }

    /// Produce and persist an integration report.
    pub async fn integrate(
        &self,
        query: &str,
        analyses: &BTreeMap<String, AnalysisResult>,
        conversation_id: &str,
    ) -> Result<IntegrationReport, LlmError> {
        let prompt = Self::build_prompt(query, analyses);
        let text = complete_bounded(self.model.as_ref(), &prompt, &self.options).await?;
        let report = parse_report(&text);

        persist_quietly(self.storage.as_ref(), &keys::integration(conversation_id), &report);
        Ok(report)
    }
}

#[derive(Clone, Copy)]
enum Section {
    Preamble,
    Issues,
    Recommendations,
}

/// Split a model response into the report's sections.
pub fn parse_report(text: &str) -> IntegrationReport {
    let mut section = Section::Preamble;
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    for line in text.lines() {
        let lower = line.to_lowercase();
        if lower.contains("cross-domain issues") || lower.contains("cross domain issues") {
            section = Section::Issues;
            continue;
        }
        if lower.contains("unified recommendations") {
            section = Section::Recommendations;
            continue;
        }

        let item = clean_bullet(line);
        if item.is_empty() {
            continue;
        }
        match section {
            Section::Preamble => {}
            Section::Issues if issues.len() < MAX_ITEMS => issues.push(item),
            Section::Recommendations if recommendations.len() < MAX_ITEMS => {
                recommendations.push(item);
            }
            _ => {}
        }
    }

    IntegrationReport {
        analysis: text.trim().to_string(),
        cross_domain_issues: issues,
        unified_recommendations: recommendations,
        created_at: Utc::now(),
    }
}
