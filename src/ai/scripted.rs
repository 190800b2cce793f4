//! Deterministic model for tests and offline runs.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CompletionOptions, LanguageModel, LlmError};

/// A model that replays canned responses and records every prompt it sees.
///
/// Lookup order for each call:
/// 1. the first rule whose needle occurs in the prompt (rules are reusable)
/// 2. the next queued response
/// 3. the fallback response, if set
#[derive(Debug, Default)]
pub struct ScriptedModel {
    rules: Vec<(String, Result<String, LlmError>)>,
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    /// Create an empty scripted model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses, returned one per call in order.
    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queue.lock().extend(responses.into_iter().map(|r| Ok(r.into())));
        self
    }

    /// Queue an error.
    pub fn with_error(self, error: LlmError) -> Self {
        self.queue.lock().push_back(Err(error));
        self
    }

    /// Answer any prompt containing `needle` with `response`.
    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Ok(response.into())));
        self
    }

    /// Fail any prompt containing `needle` with `error`.
    pub fn with_failing_rule(mut self, needle: impl Into<String>, error: LlmError) -> Self {
        self.rules.push((needle.into(), Err(error)));
        self
    }

    /// Response used once rules and queue are exhausted.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Prompts received that contain `needle`.
    pub fn prompts_containing(&self, needle: &str) -> Vec<String> {
        self.prompts.lock().iter().filter(|p| p.contains(needle)).cloned().collect()
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        self.prompts.lock().push(prompt.to_string());

        if let Some((_, response)) = self.rules.iter().find(|(needle, _)| prompt.contains(needle)) {
            return response.clone();
        }

        if let Some(response) = self.queue.lock().pop_front() {
            return response;
        }

        self.fallback
            .clone()
            .ok_or_else(|| LlmError::ProviderNotAvailable("scripted model exhausted".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
