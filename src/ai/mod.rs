//! Language model integration.
//!
//! Every stage of the pipeline talks to a model through the [`LanguageModel`]
//! trait, so providers can be swapped for a scripted double in tests.
//!
//! ## Providers
//!
//! - [`OllamaProvider`]: local models over the Ollama HTTP API
//! - [`OpenAiProvider`]: OpenAI-compatible chat completions (OpenRouter works)
//! - [`ScriptedModel`]: deterministic replay for tests and offline runs
//! - [`ModelChain`]: tries several providers in order

#[cfg(feature = "providers")]
mod ollama;
#[cfg(feature = "providers")]
mod openai;
mod scripted;

#[cfg(feature = "providers")]
pub use ollama::OllamaProvider;
#[cfg(feature = "providers")]
pub use openai::OpenAiProvider;
pub use scripted::ScriptedModel;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Sampling and deadline options for a single completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    /// Sampling temperature.
    pub temperature: f32,

    /// Upper bound on how long one call may take.
    pub timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self { temperature: 0.7, timeout: Duration::from_secs(60) }
    }
}

/// Trait for language model providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt and return the raw response text.
    async fn complete(&self, prompt: &str, options: &CompletionOptions)
        -> Result<String, LlmError>;

    /// Get the provider name.
    fn name(&self) -> &str;
}

/// Language model error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("No response from model")]
    EmptyResponse,
}

/// Call a model with the deadline from `options` applied.
///
/// A blank response is reported as [`LlmError::EmptyResponse`] so callers
/// never have to special-case it.
pub async fn complete_bounded(
    model: &dyn LanguageModel,
    prompt: &str,
    options: &CompletionOptions,
) -> Result<String, LlmError> {
    let text = tokio::time::timeout(options.timeout, model.complete(prompt, options))
        .await
        .map_err(|_| LlmError::Timeout(options.timeout))??;

    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}

/// Provider chain with fallback support.
///
/// Tries providers in order and returns the first successful completion.
pub struct ModelChain {
    providers: Vec<Arc<dyn LanguageModel>>,
}

impl ModelChain {
    /// Create a chain from an ordered provider list.
    pub fn new(providers: Vec<Arc<dyn LanguageModel>>) -> Self {
        Self { providers }
    }

    /// Check if any provider is configured.
    pub fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Get the first provider's name.
    pub fn active_provider(&self) -> Option<&str> {
        self.providers.first().map(|p| p.name())
    }
}

#[async_trait]
impl LanguageModel for ModelChain {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let mut last_error = None;
        for provider in &self.providers {
            match provider.complete(prompt, options).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Provider failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::ProviderNotAvailable("No model provider configured".to_string())))
    }

    fn name(&self) -> &str {
        self.active_provider().unwrap_or("chain")
    }
}

/// Build the configured provider.
#[cfg(feature = "providers")]
pub fn provider_from_config(
    config: &crate::core::LlmConfig,
) -> anyhow::Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(
            OllamaProvider::new().with_base_url(&config.base_url).with_model(&config.model),
        )),
        "openai" | "openrouter" => {
            let api_key = std::env::var(&config.api_key_env)
                .map_err(|_| anyhow::anyhow!("{} not set", config.api_key_env))?;
            Ok(Arc::new(
                OpenAiProvider::new(api_key)
                    .with_base_url(&config.base_url)
                    .with_model(&config.model),
            ))
        }
        // Hosted model when a key is present, local Ollama otherwise
        "auto" => {
            let mut providers: Vec<Arc<dyn LanguageModel>> = Vec::new();
            if let Ok(api_key) = std::env::var(&config.api_key_env) {
                providers.push(Arc::new(OpenAiProvider::new(api_key).with_model(&config.model)));
            }
            providers.push(Arc::new(
                OllamaProvider::new().with_base_url(&config.base_url).with_model(&config.model),
            ));
            Ok(Arc::new(ModelChain::new(providers)))
        }
        other => anyhow::bail!("Unknown model provider: {other}"),
    }
}
