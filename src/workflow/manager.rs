//! Workflow step chain.
//!
//! A workflow is a strictly linear chain of generation steps. Step `k` depends
//! on step `k - 1` and sees the generated prompts of every earlier completed
//! step. Editing step `k` invalidates it and every step after it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ArtifactRef, ArtifactType};
use crate::analysis::AnalysisResult;

/// Workflow error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("unknown workflow step: {0}")]
    UnknownStep(String),

    #[error("step {step_id} depends on {dependency}, which has not been executed")]
    DependenciesNotMet { step_id: String, dependency: String },

    #[error("a workflow needs at least one artifact type")]
    EmptyWorkflow,
}

/// Prompt generated for one step's agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPrompt {
    pub agent: ArtifactType,
    pub content: String,

    /// Whether a model pass rewrote the assembled prompt.
    #[serde(default)]
    pub enhanced: bool,

    pub created_at: DateTime<Utc>,
}

/// Terminal failure recorded on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFailureKind {
    Generation,
    Parse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: StepFailureKind,
    pub message: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// One generation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// `step_{index}_{artifact_type}`
    pub step_id: String,

    /// 1-based position in the chain
    pub index: usize,

    pub artifact_type: ArtifactType,

    /// Ids of steps that must be executed first (the predecessor, if any)
    pub dependencies: Vec<String>,

    /// Snapshot of the context this step was last prompted with
    #[serde(default)]
    pub accumulated_prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_prompt: Option<GeneratedPrompt>,

    pub executed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ArtifactRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

impl WorkflowStep {
    pub fn status(&self) -> StepStatus {
        if self.executed {
            StepStatus::Completed
        } else if self.failure.is_some() {
            StepStatus::Failed
        } else {
            StepStatus::Pending
        }
    }

    fn clear_results(&mut self) {
        self.executed = false;
        self.output = None;
        self.failure = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
}

/// Per-step entry of a [`WorkflowStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStatusEntry {
    pub step_id: String,
    pub artifact_type: ArtifactType,
    pub status: StepStatus,
    pub has_prompt: bool,
    pub has_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Progress summary of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub execution_order: Vec<String>,
    pub steps: Vec<StepStatusEntry>,
}

impl WorkflowStatus {
    /// Plain-text rendering for terminals.
    pub fn to_summary_string(&self) -> String {
        let mut out = format!("Workflow: {}/{} steps completed\n", self.completed_steps, self.total_steps);
        for entry in &self.steps {
            let icon = match entry.status {
                StepStatus::Completed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Pending => "○",
            };
            out.push_str(&format!("  {icon} {}", entry.step_id));
            if let Some(path) = &entry.output {
                out.push_str(&format!(" -> {}", path.display()));
            }
            if let Some(error) = &entry.error {
                out.push_str(&format!(" ({error})"));
            }
            out.push('\n');
        }
        out
    }
}

/// Owns the ordered step chain of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowManager {
    steps: Vec<WorkflowStep>,
}

impl WorkflowManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current chain with one step per artifact type.
    pub fn create_workflow(
        &mut self,
        artifact_types: &[ArtifactType],
    ) -> Result<&[WorkflowStep], WorkflowError> {
        if artifact_types.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }

        let mut steps: Vec<WorkflowStep> = Vec::with_capacity(artifact_types.len());
        for (i, &artifact_type) in artifact_types.iter().enumerate() {
            let index = i + 1;
            let dependencies = steps.last().map(|prev| vec![prev.step_id.clone()]).unwrap_or_default();
            steps.push(WorkflowStep {
                step_id: format!("step_{index}_{artifact_type}"),
                index,
                artifact_type,
                dependencies,
                accumulated_prompt: String::new(),
                generated_prompt: None,
                executed: false,
                output: None,
                failure: None,
            });
        }

        self.steps = steps;
        Ok(&self.steps)
    }

    /// Steps in chain order.
    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    fn step_mut(&mut self, step_id: &str) -> Result<&mut WorkflowStep, WorkflowError> {
        self.steps
            .iter_mut()
            .find(|s| s.step_id == step_id)
            .ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))
    }

    fn position(&self, step_id: &str) -> Result<usize, WorkflowError> {
        self.steps
            .iter()
            .position(|s| s.step_id == step_id)
            .ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.executed)
    }

    /// First unexecuted step in chain order.
    pub fn next_pending(&self) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| !s.executed)
    }

    /// First dependency of `step_id` that has not been executed.
    pub fn unmet_dependency(&self, step_id: &str) -> Result<Option<String>, WorkflowError> {
        let step = self.step(step_id).ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))?;
        Ok(step
            .dependencies
            .iter()
            .find(|dep| !self.step(dep).is_some_and(|d| d.executed))
            .cloned())
    }

    /// Whether every dependency of `step_id` has been executed.
    pub fn is_ready(&self, step_id: &str) -> Result<bool, WorkflowError> {
        Ok(self.unmet_dependency(step_id)?.is_none())
    }

    /// Context for a step: every domain analysis, then the generated prompts
    /// of the completed steps before it.
    ///
    /// Depends only on `analyses` and on earlier steps, so repeated calls
    /// without state changes return identical text.
    pub fn accumulated_prompt(
        &self,
        step_id: &str,
        analyses: &BTreeMap<String, AnalysisResult>,
    ) -> Result<String, WorkflowError> {
        let position = self.position(step_id)?;
        let mut out = String::new();

        if !analyses.is_empty() {
            out.push_str("DOMAIN EXPERT ANALYSES:\n\n");
            for (domain, result) in analyses {
                out.push_str(&format!("=== {} DOMAIN ANALYSIS ===\n", domain.to_uppercase()));
                out.push_str(result.analysis_text.trim());
                out.push_str("\n\n");
                push_list(&mut out, "Key Findings", &result.key_findings);
                push_list(&mut out, "Recommendations", &result.recommendations);
                push_list(&mut out, "Next Steps", &result.next_steps);
                out.push('\n');
            }
        }

        let previous: Vec<(&WorkflowStep, &GeneratedPrompt)> = self.steps[..position]
            .iter()
            .filter(|s| s.executed)
            .filter_map(|s| s.generated_prompt.as_ref().map(|p| (s, p)))
            .collect();

        if !previous.is_empty() {
            out.push_str("PREVIOUS AGENT PROMPTS:\n\n");
            for (step, prompt) in previous {
                out.push_str(&format!(
                    "=== {} AGENT PROMPT ===\n",
                    step.artifact_type.as_str().to_uppercase()
                ));
                out.push_str(prompt.content.trim());
                out.push_str("\n\n");
            }
        }

        Ok(out)
    }

    /// Store the prompt a step is about to be generated with.
    pub fn record_prompt(
        &mut self,
        step_id: &str,
        prompt: GeneratedPrompt,
        accumulated: String,
    ) -> Result<(), WorkflowError> {
        let step = self.step_mut(step_id)?;
        step.generated_prompt = Some(prompt);
        step.accumulated_prompt = accumulated;
        Ok(())
    }

    /// Mark a step executed with its output.
    ///
    /// Leaves the step untouched and returns an error when a dependency has
    /// not been executed.
    pub fn mark_executed(&mut self, step_id: &str, output: ArtifactRef) -> Result<(), WorkflowError> {
        if let Some(dependency) = self.unmet_dependency(step_id)? {
            tracing::warn!(step_id, %dependency, "refusing to mark step executed before its dependency");
            return Err(WorkflowError::DependenciesNotMet { step_id: step_id.to_string(), dependency });
        }

        let step = self.step_mut(step_id)?;
        step.executed = true;
        step.output = Some(output);
        step.failure = None;
        Ok(())
    }

    /// Record a terminal generation failure on a step.
    pub fn record_failure(&mut self, step_id: &str, failure: StepFailure) -> Result<(), WorkflowError> {
        let step = self.step_mut(step_id)?;
        step.executed = false;
        step.output = None;
        step.failure = Some(failure);
        Ok(())
    }

    /// The changed step and every step after it, in chain order.
    ///
    /// Unknown ids yield an empty list.
    pub fn steps_to_redo(&self, changed_step_id: &str) -> Vec<String> {
        match self.position(changed_step_id) {
            Ok(position) => self.steps[position..].iter().map(|s| s.step_id.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Clear execution results for the given steps. Unknown ids are ignored.
    pub fn reset(&mut self, step_ids: &[String]) {
        for step in self.steps.iter_mut().filter(|s| step_ids.contains(&s.step_id)) {
            step.clear_results();
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus {
            total_steps: self.steps.len(),
            completed_steps: self.steps.iter().filter(|s| s.executed).count(),
            execution_order: self.steps.iter().map(|s| s.step_id.clone()).collect(),
            steps: self
                .steps
                .iter()
                .map(|s| StepStatusEntry {
                    step_id: s.step_id.clone(),
                    artifact_type: s.artifact_type,
                    status: s.status(),
                    has_prompt: s.generated_prompt.is_some(),
                    has_output: s.output.is_some(),
                    output: s.output.as_ref().map(|o| o.path.clone()),
                    error: s.failure.as_ref().map(|f| f.message.clone()),
                })
                .collect(),
        }
    }
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    out.push_str(heading);
    out.push_str(":\n");
    for item in items {
        out.push_str("- ");
        out.push_str(item);
        out.push('\n');
    }
}
