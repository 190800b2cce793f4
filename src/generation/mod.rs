//! Self-correcting artifact generation.
//!
//! Both generation shapes run through the same correction loop in
//! [`crate::core::retry_with_correction`]:
//!
//! - **Script**: the model writes a Python script that renders the deliverable.
//!   A failed run feeds its error output into the next prompt.
//! - **Blueprint**: the model writes a JSON file manifest. A parse failure
//!   feeds the parser's message into the next prompt.

pub mod blueprint;
pub mod script;

pub use blueprint::{materialize, parse_blueprint, Blueprint, BlueprintFile, BlueprintValidator};
pub use script::{ScriptArtifact, ScriptValidator};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::ai::{CompletionOptions, LanguageModel};
use crate::core::{retry_with_correction, ArtifactExecutor, Rejection, RejectionKind, RetryConfig};
use crate::workflow::prompts::output_contract;
use crate::workflow::{ArtifactRef, ArtifactType, GenerationShape, StepFailureKind};

/// Generation error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("{step_id} failed after {attempts} attempt(s): {last_error}")]
    GenerationFailure { step_id: String, attempts: u32, last_error: String },

    #[error("{step_id} produced no valid blueprint after {attempts} attempt(s): {last_error}")]
    ParseFailure { step_id: String, attempts: u32, last_error: String },
}

impl GenerationError {
    pub fn step_id(&self) -> &str {
        match self {
            Self::GenerationFailure { step_id, .. } | Self::ParseFailure { step_id, .. } => step_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::GenerationFailure { attempts, .. } | Self::ParseFailure { attempts, .. } => *attempts,
        }
    }

    pub fn last_error(&self) -> &str {
        match self {
            Self::GenerationFailure { last_error, .. } | Self::ParseFailure { last_error, .. } => {
                last_error
            }
        }
    }

    pub fn kind(&self) -> StepFailureKind {
        match self {
            Self::GenerationFailure { .. } => StepFailureKind::Generation,
            Self::ParseFailure { .. } => StepFailureKind::Parse,
        }
    }

    fn setup(step_id: &str, error: impl std::fmt::Display) -> Self {
        Self::GenerationFailure {
            step_id: step_id.to_string(),
            attempts: 0,
            last_error: error.to_string(),
        }
    }

    fn exhausted(step_id: &str, attempts: u32, rejection: Rejection) -> Self {
        let step_id = step_id.to_string();
        match rejection.kind {
            RejectionKind::Parse => Self::ParseFailure { step_id, attempts, last_error: rejection.error },
            RejectionKind::Execution | RejectionKind::Model => {
                Self::GenerationFailure { step_id, attempts, last_error: rejection.error }
            }
        }
    }
}

/// Tunables for the generator.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub retry: RetryConfig,
    pub execution_timeout: Duration,
    pub scratch_dir: PathBuf,
    pub require_output_file: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            execution_timeout: Duration::from_secs(120),
            scratch_dir: std::env::temp_dir(),
            require_output_file: true,
        }
    }
}

/// One artifact to produce.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub step_id: &'a str,
    pub artifact_type: ArtifactType,
    /// Short statement of intent, repeated in correction prompts.
    pub goal: &'a str,
    /// The step's agent prompt; the output contract is appended here.
    pub prompt: &'a str,
    /// Directory the artifact is written into.
    pub output_dir: &'a Path,
}

/// Drives the correction loop for either generation shape.
pub struct SelfCorrectingGenerator {
    model: Arc<dyn LanguageModel>,
    executor: Arc<dyn ArtifactExecutor>,
    options: CompletionOptions,
    settings: GeneratorSettings,
}

impl SelfCorrectingGenerator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        executor: Arc<dyn ArtifactExecutor>,
        options: CompletionOptions,
        settings: GeneratorSettings,
    ) -> Self {
        Self { model, executor, options, settings }
    }

    /// Produce an artifact, retrying with corrections until it validates or
    /// the attempt budget runs out.
    pub async fn generate(&self, request: &GenerationRequest<'_>) -> Result<ArtifactRef, GenerationError> {
        let step_id = request.step_id;
        std::fs::create_dir_all(request.output_dir).map_err(|e| GenerationError::setup(step_id, e))?;

        tracing::info!(step_id, artifact_type = %request.artifact_type, "generating artifact");
        match request.artifact_type.shape() {
            GenerationShape::Script => self.generate_script(request).await,
            GenerationShape::Blueprint => self.generate_blueprint(request).await,
        }
    }

    async fn generate_script(&self, request: &GenerationRequest<'_>) -> Result<ArtifactRef, GenerationError> {
        let step_id = request.step_id;
        let extension = request.artifact_type.file_extension().unwrap_or("out");
        let output_file = format!("{step_id}.{extension}");
        let output_path = request.output_dir.join(&output_file);

        std::fs::create_dir_all(&self.settings.scratch_dir)
            .map_err(|e| GenerationError::setup(step_id, e))?;
        // The script runs from the output directory, so its path must be absolute.
        let scratch_dir = std::fs::canonicalize(&self.settings.scratch_dir)
            .map_err(|e| GenerationError::setup(step_id, e))?;
        // A stale file from an earlier run must not satisfy the output check.
        if output_path.exists() {
            std::fs::remove_file(&output_path).map_err(|e| GenerationError::setup(step_id, e))?;
        }

        let validator = ScriptValidator {
            executor: Arc::clone(&self.executor),
            scratch_dir,
            working_dir: request.output_dir.to_path_buf(),
            output_file: output_file.clone(),
            require_output_file: self.settings.require_output_file,
            timeout: self.settings.execution_timeout,
        };
        let prompt =
            format!("{}\n\n{}", request.prompt, output_contract(request.artifact_type, &output_file));

        let outcome = retry_with_correction(
            self.model.as_ref(),
            &self.options,
            &self.settings.retry,
            request.goal,
            prompt,
            &validator,
        )
        .await;

        let attempts = outcome.attempts;
        match outcome.result {
            Ok(_) => Ok(ArtifactRef {
                artifact_type: request.artifact_type,
                path: output_path,
                attempts,
                created_at: Utc::now(),
            }),
            Err(rejection) => Err(GenerationError::exhausted(step_id, attempts, rejection)),
        }
    }

    async fn generate_blueprint(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<ArtifactRef, GenerationError> {
        let step_id = request.step_id;
        let prompt = format!("{}\n\n{}", request.prompt, output_contract(request.artifact_type, ""));

        let outcome = retry_with_correction(
            self.model.as_ref(),
            &self.options,
            &self.settings.retry,
            request.goal,
            prompt,
            &BlueprintValidator,
        )
        .await;

        let attempts = outcome.attempts;
        let blueprint = outcome
            .result
            .map_err(|rejection| GenerationError::exhausted(step_id, attempts, rejection))?;

        let path = materialize(&blueprint, request.output_dir).map_err(|e| {
            GenerationError::GenerationFailure {
                step_id: step_id.to_string(),
                attempts,
                last_error: format!("failed to write project files: {e}"),
            }
        })?;
        tracing::info!(step_id, files = blueprint.files.len(), path = %path.display(), "project materialized");

        Ok(ArtifactRef { artifact_type: request.artifact_type, path, attempts, created_at: Utc::now() })
    }
}
