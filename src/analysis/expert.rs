//! Domain expert: one prompt, one model call, one structured analysis.

use std::sync::Arc;

use chrono::Utc;

use super::extract::{apply_fallbacks, extract_sections};
use super::{AnalysisError, AnalysisRequest, AnalysisResult, DomainProfile};
use crate::ai::{complete_bounded, CompletionOptions, LanguageModel};
use crate::storage::{keys, persist_quietly, Storage};

/// Produces a structured analysis from one domain's point of view.
///
/// Stateless apart from its collaborators; one instance can serve any number
/// of conversations.
pub struct DomainExpert {
    profile: DomainProfile,
    model: Arc<dyn LanguageModel>,
    storage: Arc<dyn Storage>,
    options: CompletionOptions,
}

impl DomainExpert {
    pub fn new(
        profile: DomainProfile,
        model: Arc<dyn LanguageModel>,
        storage: Arc<dyn Storage>,
        options: CompletionOptions,
    ) -> Self {
        Self { profile, model, storage, options }
    }

    /// The domain this expert answers for.
    pub fn domain(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &DomainProfile {
        &self.profile
    }

    /// Build the analysis prompt for a request.
    pub fn build_prompt(&self, request: &AnalysisRequest) -> String {
        let mut prompt = format!(
            "{}\n\nDOMAIN: {}\n\nUSER REQUEST:\n{}\n",
            self.profile.system_prompt,
            self.profile.name,
            request.query.trim()
        );

        if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!("\nADDITIONAL CONTEXT:\n{}\n", context.trim()));
        }
        if let Some(extra) = request.extra_instructions.as_deref().filter(|e| !e.trim().is_empty()) {
            prompt.push_str(&format!("\nSPECIFIC INSTRUCTIONS:\n{}\n", extra.trim()));
        }

        prompt.push_str(&format!(
            "\nProvide a thorough {} analysis. Label your key findings, \
             recommendations and next steps clearly, one per line.",
            self.profile.title
        ));
        prompt
    }

    /// Analyze a request.
    ///
    /// Makes exactly one model call. Persistence of the prompt and result is
    /// best-effort.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        conversation_id: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        if request.query.trim().is_empty() {
            return Err(AnalysisError::InvalidRequest("query must not be empty".to_string()));
        }
        if request.domain != self.profile.name {
            return Err(AnalysisError::InvalidRequest(format!(
                "request for domain {:?} sent to the {:?} expert",
                request.domain, self.profile.name
            )));
        }

        let prompt = self.build_prompt(request);
        persist_quietly(
            self.storage.as_ref(),
            &keys::domain_prompt(&self.profile.name, conversation_id),
            &prompt,
        );

        tracing::info!(domain = %self.profile.name, conversation_id, "running domain analysis");
        let text = complete_bounded(self.model.as_ref(), &prompt, &self.options)
            .await
            .map_err(|cause| AnalysisError::Failure {
                domain: self.profile.name.clone(),
                cause: cause.to_string(),
            })?;

        let (sections, extracted) = apply_fallbacks(extract_sections(&text), &self.profile);
        let result = AnalysisResult {
            domain: self.profile.name.clone(),
            analysis_text: text,
            key_findings: sections.key_findings,
            recommendations: sections.recommendations,
            next_steps: sections.next_steps,
            confidence: extracted as f64 / 3.0,
            created_at: Utc::now(),
        };

        persist_quietly(
            self.storage.as_ref(),
            &keys::domain_analysis(&self.profile.name, conversation_id),
            &result,
        );
        tracing::debug!(domain = %result.domain, confidence = result.confidence, "analysis complete");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{LlmError, ScriptedModel};
    use crate::analysis::builtin_profiles;
    use crate::storage::{MemoryStore, Storage, StorageError};

    struct FailingStore;

    impl Storage for FailingStore {
        fn save(&self, key: &str, _value: &serde_json::Value) -> Result<(), StorageError> {
            Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::other("disk full"),
            })
        }

        fn load(&self, _key: &str) -> Result<Option<serde_json::Value>, StorageError> {
            Ok(None)
        }
    }

    fn expert(model: ScriptedModel, storage: Arc<MemoryStore>) -> DomainExpert {
        DomainExpert::new(
            builtin_profiles().remove(0),
            Arc::new(model),
            storage,
            CompletionOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_analysis_extracts_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let model = ScriptedModel::new().with_responses([
            "Key finding: torque is high\nWe recommend steel\nNext: build a prototype",
        ]);
        let expert = expert(model, store.clone());

        let result = expert
            .analyze(&AnalysisRequest::new("design a winch", "mechanical"), "c1")
            .await
            .unwrap();

        assert_eq!(result.domain, "mechanical");
        assert_eq!(result.key_findings, vec!["Key finding: torque is high"]);
        assert_eq!(result.recommendations, vec!["We recommend steel"]);
        assert_eq!(result.next_steps, vec!["Next: build a prototype"]);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(store.keys(), vec!["mechanical_analysis_c1", "mechanical_prompt_c1"]);
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_fail_analysis() {
        let expert = DomainExpert::new(
            builtin_profiles().remove(0),
            Arc::new(ScriptedModel::new().with_responses(["We recommend steel"])),
            Arc::new(FailingStore),
            CompletionOptions::default(),
        );

        let result = expert
            .analyze(&AnalysisRequest::new("design a winch", "mechanical"), "c1")
            .await
            .unwrap();

        assert_eq!(result.domain, "mechanical");
        assert_eq!(result.recommendations, vec!["We recommend steel"]);
    }

    #[tokio::test]
    async fn test_prompt_embeds_query_context_and_instructions() {
        let model = Arc::new(ScriptedModel::new().with_fallback("plain text"));
        let expert = DomainExpert::new(
            builtin_profiles().remove(0),
            model.clone(),
            Arc::new(MemoryStore::new()),
            CompletionOptions::default(),
        );
        let request = AnalysisRequest::new("design a winch", "mechanical")
            .with_context("marine use")
            .with_extra_instructions("metric units only");

        let result = expert.analyze(&request, "c1").await.unwrap();
        let prompt = &model.prompts()[0];

        assert!(prompt.contains("design a winch"));
        assert!(prompt.contains("marine use"));
        assert!(prompt.contains("metric units only"));
        assert_eq!(model.call_count(), 1);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.next_steps, vec!["Proceed to electrical analysis"]);
    }

    #[tokio::test]
    async fn test_empty_query_rejected_without_model_call() {
        let model = Arc::new(ScriptedModel::new().with_fallback("x"));
        let expert = DomainExpert::new(
            builtin_profiles().remove(0),
            model.clone(),
            Arc::new(MemoryStore::new()),
            CompletionOptions::default(),
        );

        let err = expert.analyze(&AnalysisRequest::new("  ", "mechanical"), "c1").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRequest(_)));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_domain_rejected() {
        let expert = expert(ScriptedModel::new(), Arc::new(MemoryStore::new()));
        let err = expert.analyze(&AnalysisRequest::new("q", "electrical"), "c1").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_model_failure_names_domain() {
        let model = ScriptedModel::new().with_error(LlmError::Connection("refused".into()));
        let expert = expert(model, Arc::new(MemoryStore::new()));

        let err = expert.analyze(&AnalysisRequest::new("q", "mechanical"), "c1").await.unwrap_err();
        match err {
            AnalysisError::Failure { domain, cause } => {
                assert_eq!(domain, "mechanical");
                assert!(cause.contains("refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_response_is_a_failure() {
        let expert = expert(ScriptedModel::new().with_responses([""]), Arc::new(MemoryStore::new()));
        let err = expert.analyze(&AnalysisRequest::new("q", "mechanical"), "c1").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Failure { .. }));
    }
}
