//! Script execution module.
//!
//! Runs generated scripts in a child process and captures their output.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command as ProcessCommand;

/// Result of running a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Whether the process exited with status 0
    pub success: bool,

    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Time taken to execute
    pub duration: Duration,
}

impl ExecutionOutcome {
    /// Error text suitable for feeding back to the model.
    ///
    /// Prefers stderr, then stdout, then the exit status.
    pub fn error_text(&self) -> String {
        if !self.stderr.trim().is_empty() {
            return self.stderr.clone();
        }
        if !self.stdout.trim().is_empty() {
            return self.stdout.clone();
        }
        match self.exit_code {
            Some(code) => format!("process exited with status {code}"),
            None => "process terminated by signal".to_string(),
        }
    }
}

/// Errors raised before a script could produce an outcome.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for script: {0}")]
    Wait(#[source] std::io::Error),
}

/// Runs a candidate script file.
#[async_trait]
pub trait ArtifactExecutor: Send + Sync {
    /// Execute `script` with `working_dir` as its current directory.
    ///
    /// A run that exceeds `timeout` is killed and reported as an unsuccessful
    /// outcome, not as an error.
    async fn execute(
        &self,
        script: &Path,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}

/// Executor that runs scripts through an interpreter.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    /// Interpreter program (for example `python3`)
    pub interpreter: String,

    /// Extra arguments placed before the script path
    pub args: Vec<String>,
}

impl ScriptRunner {
    /// Create a runner for the given interpreter.
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self { interpreter: interpreter.into(), args: Vec::new() }
    }

    /// Add interpreter arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new("python3")
    }
}

#[async_trait]
impl ArtifactExecutor for ScriptRunner {
    async fn execute(
        &self,
        script: &Path,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let start = Instant::now();

        let mut cmd = ProcessCommand::new(&self.interpreter);
        cmd.args(&self.args)
            .arg(script)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
            program: self.interpreter.clone(),
            source,
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.map_err(ExecutionError::Wait)?;
                Ok(ExecutionOutcome {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    duration: start.elapsed(),
                })
            }
            // The child is dropped with the future and killed.
            Err(_) => Ok(ExecutionOutcome {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: format!("script timed out after {}s", timeout.as_secs_f32()),
                duration: start.elapsed(),
            }),
        }
    }
}
