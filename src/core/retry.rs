//! Generate, validate, correct.
//!
//! One loop drives every self-correcting generation. Each attempt asks the
//! model for a candidate and hands it to a [`Validator`]. A rejected candidate
//! turns into a correction prompt for the next attempt, carrying the captured
//! error back to the model.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ai::{complete_bounded, CompletionOptions, LanguageModel};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first. Values below 1 act as 1.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryConfig {
    /// Create a config that makes a single attempt.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1 }
    }

    fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why a candidate was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The model call itself failed or timed out.
    Model,
    /// The candidate ran and failed.
    Execution,
    /// The candidate could not be parsed.
    Parse,
}

/// A rejected candidate together with the error it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    /// The artifact text that was rejected (empty for model failures).
    pub candidate: String,
    /// Captured error text fed back to the model.
    pub error: String,
}

impl Rejection {
    pub fn execution(candidate: impl Into<String>, error: impl Into<String>) -> Self {
        Self { kind: RejectionKind::Execution, candidate: candidate.into(), error: error.into() }
    }

    pub fn parse(candidate: impl Into<String>, error: impl Into<String>) -> Self {
        Self { kind: RejectionKind::Parse, candidate: candidate.into(), error: error.into() }
    }

    fn model(error: impl Into<String>) -> Self {
        Self { kind: RejectionKind::Model, candidate: String::new(), error: error.into() }
    }
}

/// Checks a raw model response and explains failures.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Accepted artifact type.
    type Output: Send;

    /// Validate one raw model response.
    async fn validate(&self, response: &str) -> Result<Self::Output, Rejection>;

    /// Build the follow-up prompt for a rejected candidate.
    fn correction_prompt(&self, goal: &str, rejection: &Rejection) -> String;
}

/// Result of a retry operation.
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The accepted artifact, or the last rejection.
    pub result: Result<T, Rejection>,

    /// Number of attempts made.
    pub attempts: u32,

    /// Every prompt sent, in order.
    pub prompts: Vec<String>,

    /// Total time spent.
    pub total_time: Duration,
}

impl<T> RetryResult<T> {
    /// Check if the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Whether more than one attempt was needed.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Get the result.
    pub fn into_result(self) -> Result<T, Rejection> {
        self.result
    }
}

/// Run the generate/validate/correct loop.
///
/// Attempts stop at the first accepted candidate or after
/// `config.max_attempts`. A correction prompt is only built when another
/// attempt will follow. Model failures re-send the current prompt since there
/// is no candidate to correct.
pub async fn retry_with_correction<V: Validator>(
    model: &dyn LanguageModel,
    options: &CompletionOptions,
    config: &RetryConfig,
    goal: &str,
    initial_prompt: String,
    validator: &V,
) -> RetryResult<V::Output> {
    let start = Instant::now();
    let limit = config.attempt_limit();
    let mut prompts = Vec::new();
    let mut prompt = initial_prompt;
    let mut last = Rejection::model("no attempt made");

    for attempt in 1..=limit {
        tracing::debug!(attempt, limit, "generation attempt");
        prompts.push(prompt.clone());

        let rejection = match complete_bounded(model, &prompt, options).await {
            Ok(response) => match validator.validate(&response).await {
                Ok(output) => {
                    return RetryResult {
                        result: Ok(output),
                        attempts: attempt,
                        prompts,
                        total_time: start.elapsed(),
                    };
                }
                Err(rejection) => rejection,
            },
            Err(e) => Rejection::model(e.to_string()),
        };

        tracing::warn!(attempt, kind = ?rejection.kind, error = %last_line(&rejection.error), "attempt rejected");

        if attempt < limit && rejection.kind != RejectionKind::Model {
            prompt = validator.correction_prompt(goal, &rejection);
        }
        last = rejection;
    }

    RetryResult { result: Err(last), attempts: limit, prompts, total_time: start.elapsed() }
}

fn last_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or(text)
}
