//! Script-shaped generation.
//!
//! The model writes a script, the script is executed in the conversation's
//! output directory, and a failed run is sent back to the model with its
//! error output.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::text::strip_code_fences;
use crate::core::{ArtifactExecutor, Rejection, Validator};

/// An accepted script and what it printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptArtifact {
    pub code: String,
    pub stdout: String,
}

/// Runs each candidate script and accepts the first clean run.
pub struct ScriptValidator {
    pub(crate) executor: Arc<dyn ArtifactExecutor>,
    pub(crate) scratch_dir: PathBuf,
    pub(crate) working_dir: PathBuf,
    /// File name the script must produce, relative to `working_dir`.
    pub(crate) output_file: String,
    pub(crate) require_output_file: bool,
    pub(crate) timeout: Duration,
}

impl ScriptValidator {
    fn expected_output(&self) -> PathBuf {
        self.working_dir.join(&self.output_file)
    }
}

#[async_trait]
impl Validator for ScriptValidator {
    type Output = ScriptArtifact;

    async fn validate(&self, response: &str) -> Result<ScriptArtifact, Rejection> {
        let code = strip_code_fences(response);
        if code.is_empty() {
            return Err(Rejection::execution(response, "the response contained no code"));
        }

        // Removed when dropped, on every return path below.
        let mut scratch = tempfile::Builder::new()
            .prefix("metaforge_")
            .suffix(".py")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| Rejection::execution(&code, format!("could not create scratch file: {e}")))?;
        let write_err =
            |e: std::io::Error| Rejection::execution(&code, format!("could not write scratch file: {e}"));
        scratch.write_all(code.as_bytes()).map_err(write_err)?;
        scratch.flush().map_err(write_err)?;

        let outcome = self
            .executor
            .execute(scratch.path(), &self.working_dir, self.timeout)
            .await
            .map_err(|e| Rejection::execution(&code, e.to_string()))?;

        if !outcome.success {
            return Err(Rejection::execution(code, outcome.error_text()));
        }
        if self.require_output_file && !self.expected_output().exists() {
            return Err(Rejection::execution(
                code,
                format!(
                    "the script exited successfully but did not create '{}'",
                    self.output_file
                ),
            ));
        }

        tracing::debug!(duration_ms = outcome.duration.as_millis() as u64, "script succeeded");
        Ok(ScriptArtifact { code, stdout: outcome.stdout })
    }

    fn correction_prompt(&self, goal: &str, rejection: &Rejection) -> String {
        format!(
            "The following Python script you generated failed.\n\
             Original goal: {goal}\n\n\
             --- FAILED CODE ---\n{}\n--- END FAILED CODE ---\n\n\
             It produced this error:\n\
             --- ERROR ---\n{}\n--- END ERROR ---\n\n\
             Analyze the error and return a corrected, complete version of the script. \
             It must still save its output as '{}' in the current working directory. \
             Your entire output must be ONLY the corrected Python code.",
            rejection.candidate, rejection.error, self.output_file
        )
    }
}
