//! Conversation orchestration.
//!
//! The [`Orchestrator`] drives one conversation end to end:
//!
//! 1. every configured domain expert analyzes the request
//! 2. optionally, the analyses are integrated into one cross-domain report
//! 3. the planner decides the deliverable, or the caller supplies a list
//! 4. each workflow step is prompted and generated in chain order
//!
//! The conversation's [`SystemState`] is written back to storage after every
//! transition, so any later call can pick it up by conversation id.

mod error;
mod state;

pub use error::{FailureKind, PipelineError};
pub use state::{stage, ConversationStatus, ProcessingEvent, SystemState};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::ai::LanguageModel;
use crate::analysis::{AnalysisError, AnalysisRequest, AnalysisResult, DomainExpert, DomainIntegrator};
use crate::core::{ArtifactExecutor, Config};
use crate::generation::{GenerationRequest, GeneratorSettings, SelfCorrectingGenerator};
use crate::storage::{keys, persist_quietly, Storage};
use crate::workflow::{
    ArtifactRef, ArtifactType, Plan, PlanDecision, StepContext, StepFailure, StepFailureKind,
    StepPromptBuilder, WorkflowError, WorkflowPlanner, WorkflowStatus,
};

/// Result type for orchestrator calls.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Terminal result of one workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded {
        step_id: String,
        artifact: ArtifactRef,
    },
    Failed {
        step_id: String,
        kind: StepFailureKind,
        message: String,
        attempts: u32,
    },
}

impl StepOutcome {
    pub fn step_id(&self) -> &str {
        match self {
            Self::Succeeded { step_id, .. } | Self::Failed { step_id, .. } => step_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn artifact(&self) -> Option<&ArtifactRef> {
        match self {
            Self::Succeeded { artifact, .. } => Some(artifact),
            Self::Failed { .. } => None,
        }
    }
}

/// What a full run hands back to the caller.
///
/// Analyses are always present; a failed deliverable shows up as a
/// [`StepOutcome::Failed`] rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub conversation_id: String,
    pub domain_outputs: BTreeMap<String, AnalysisResult>,

    /// Type of the final step in the chain
    pub chosen_artifact_type: ArtifactType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<PlanDecision>,

    /// Outcome of every step attempted, in chain order
    pub steps: Vec<StepOutcome>,

    /// Outcome of the last step attempted
    pub generated_artifact: StepOutcome,
}

/// Runs conversations against injected collaborators.
pub struct Orchestrator {
    experts: Vec<DomainExpert>,
    integrator: Option<DomainIntegrator>,
    planner: WorkflowPlanner,
    prompt_builder: StepPromptBuilder,
    generator: SelfCorrectingGenerator,
    storage: Arc<dyn Storage>,
    output_dir: PathBuf,
    parallel: bool,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        model: Arc<dyn LanguageModel>,
        executor: Arc<dyn ArtifactExecutor>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let options = config.llm.completion_options();

        let experts = config
            .domains
            .iter()
            .cloned()
            .map(|profile| {
                DomainExpert::new(profile, Arc::clone(&model), Arc::clone(&storage), options.clone())
            })
            .collect();

        let integrator = config
            .analysis
            .integrate
            .then(|| DomainIntegrator::new(Arc::clone(&model), Arc::clone(&storage), options.clone()));

        let settings = GeneratorSettings {
            retry: config.generation.retry_config(),
            execution_timeout: config.generation.execution_timeout(),
            scratch_dir: config.resolved_scratch_dir(),
            require_output_file: config.generation.require_output_file,
        };

        Self {
            experts,
            integrator,
            planner: WorkflowPlanner::new(Arc::clone(&model), Arc::clone(&storage), options.clone()),
            prompt_builder: StepPromptBuilder::new(
                Arc::clone(&model),
                options.clone(),
                config.generation.enhance_prompts,
            ),
            generator: SelfCorrectingGenerator::new(model, executor, options, settings),
            storage,
            output_dir: config.resolved_output_dir(),
            parallel: config.analysis.parallel,
        }
    }

    /// Domains this orchestrator consults, in configuration order.
    pub fn domains(&self) -> Vec<&str> {
        self.experts.iter().map(DomainExpert::domain).collect()
    }

    /// Analyze, let the planner choose a deliverable, and generate it.
    pub async fn run(&self, query: &str) -> Result<RunOutcome> {
        self.run_with(query, Plan::Decide, None).await
    }

    /// Analyze, plan and execute every step of the workflow.
    pub async fn run_with(&self, query: &str, plan: Plan, context: Option<String>) -> Result<RunOutcome> {
        let mut state = self.start(query, plan, context).await?;
        let steps = self.execute_pending(&mut state).await?;

        let generated_artifact = steps
            .last()
            .cloned()
            .ok_or_else(|| PipelineError::State("workflow has no runnable step".to_string()))?;
        let chosen_artifact_type = state
            .workflow
            .steps()
            .last()
            .map(|s| s.artifact_type)
            .ok_or_else(|| PipelineError::State("workflow is empty".to_string()))?;

        Ok(RunOutcome {
            conversation_id: state.conversation_id,
            domain_outputs: state.analysis_results,
            chosen_artifact_type,
            decision: state.decision,
            steps,
            generated_artifact,
        })
    }

    /// Analyze and plan without generating anything.
    ///
    /// Any domain analysis failure aborts the conversation. The failed state is
    /// still persisted so it can be inspected.
    pub async fn start(&self, query: &str, plan: Plan, context: Option<String>) -> Result<SystemState> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::InvalidRequest("query must not be empty".to_string()));
        }
        if self.experts.is_empty() {
            return Err(PipelineError::InvalidRequest("no domain experts configured".to_string()));
        }
        if matches!(&plan, Plan::Explicit(types) if types.is_empty()) {
            return Err(WorkflowError::EmptyWorkflow.into());
        }

        let conversation_id = uuid::Uuid::new_v4().simple().to_string();
        let mut state = SystemState::new(&conversation_id, query, context, plan.clone());
        state.record_event(stage::ANALYSIS, format!("consulting {}", self.domains().join(", ")));
        self.persist(&state);
        tracing::info!(%conversation_id, domains = self.experts.len(), "conversation started");

        match self.analyze_all(query, state.context.as_deref(), &conversation_id).await {
            Ok(results) => {
                state.analysis_results = results;
                state.record_event(stage::ANALYSIS, "all domain analyses complete");
            }
            Err(e) => {
                tracing::error!(%conversation_id, error = %e, "domain analysis failed");
                state.status = ConversationStatus::Failed;
                state.record_event(stage::ANALYSIS, format!("failed: {e}"));
                self.persist(&state);
                return Err(e.into());
            }
        }

        if let Some(integrator) = &self.integrator {
            match integrator.integrate(query, &state.analysis_results, &conversation_id).await {
                Ok(report) => {
                    state.record_event(
                        stage::INTEGRATION,
                        format!("{} cross-domain issue(s)", report.cross_domain_issues.len()),
                    );
                    state.integration = Some(report);
                }
                Err(e) => {
                    tracing::warn!(%conversation_id, error = %e, "integration failed, continuing without it");
                    state.record_event(stage::INTEGRATION, format!("skipped: {e}"));
                }
            }
        }

        let artifact_types = match &plan {
            Plan::Decide => {
                let decision =
                    self.planner.decide(query, &state.analysis_results, &conversation_id).await;
                let artifact_type = decision.artifact_type;
                state.decision = Some(decision);
                vec![artifact_type]
            }
            Plan::Explicit(types) => types.clone(),
        };

        let order: Vec<String> = state
            .workflow
            .create_workflow(&artifact_types)?
            .iter()
            .map(|s| s.step_id.clone())
            .collect();
        state.status = ConversationStatus::Planned;
        state.record_event(stage::PLANNING, order.join(" -> "));
        self.persist(&state);

        Ok(state)
    }

    /// Execute every pending step of a stored conversation, in order.
    ///
    /// Stops at the first failed step; later steps depend on it.
    pub async fn run_all(&self, conversation_id: &str) -> Result<Vec<StepOutcome>> {
        let mut state = self.load_conversation(conversation_id)?;
        if state.workflow.is_empty() {
            return Err(PipelineError::State(format!("conversation {conversation_id} has no workflow")));
        }
        self.execute_pending(&mut state).await
    }

    /// Execute one step.
    ///
    /// The step's dependencies must already be executed. Running a step that
    /// already has output regenerates it and resets every later step.
    pub async fn run_step(
        &self,
        conversation_id: &str,
        step_id: &str,
        extra_instructions: Option<&str>,
    ) -> Result<ArtifactRef> {
        let mut state = self.load_conversation(conversation_id)?;
        let step = state
            .workflow
            .step(step_id)
            .ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))?;

        if step.executed {
            let redo = state.workflow.steps_to_redo(step_id);
            tracing::info!(step_id, reset = redo.len(), "re-running executed step");
            state.workflow.reset(&redo);
        }

        self.execute_step(&mut state, step_id, extra_instructions).await
    }

    /// Regenerate a step with feedback, then every step after it.
    ///
    /// Earlier steps keep their outputs. The feedback only reaches the
    /// changed step; later steps pick up its new prompt through accumulation.
    ///
    /// Stops at the first step that fails and returns its error. Steps
    /// regenerated before it keep their new outputs in the stored state, so
    /// [`Self::workflow_status`] shows what was redone.
    pub async fn modify_step(
        &self,
        conversation_id: &str,
        step_id: &str,
        feedback: &str,
    ) -> Result<BTreeMap<ArtifactType, ArtifactRef>> {
        let mut state = self.load_conversation(conversation_id)?;
        let redo = state.workflow.steps_to_redo(step_id);
        if redo.is_empty() {
            return Err(WorkflowError::UnknownStep(step_id.to_string()).into());
        }
        if let Some(dependency) = state.workflow.unmet_dependency(step_id)? {
            return Err(WorkflowError::DependenciesNotMet { step_id: step_id.to_string(), dependency }.into());
        }

        state.workflow.reset(&redo);
        state.record_event(stage::STEP_MODIFIED, format!("{step_id}: resetting {}", redo.join(", ")));
        state.refresh_status();
        self.persist(&state);
        tracing::info!(conversation_id, step_id, redo = redo.len(), "modifying workflow step");

        let mut produced = BTreeMap::new();
        for (i, id) in redo.iter().enumerate() {
            let instructions = (i == 0).then_some(feedback);
            let artifact = self.execute_step(&mut state, id, instructions).await?;
            produced.insert(artifact.artifact_type, artifact);
        }
        Ok(produced)
    }

    /// Progress of a stored conversation's workflow.
    pub fn workflow_status(&self, conversation_id: &str) -> Result<WorkflowStatus> {
        Ok(self.load_conversation(conversation_id)?.workflow.status())
    }

    pub fn load_conversation(&self, conversation_id: &str) -> Result<SystemState> {
        SystemState::load(self.storage.as_ref(), conversation_id)?
            .ok_or_else(|| PipelineError::ConversationNotFound(conversation_id.to_string()))
    }

    async fn analyze_all(
        &self,
        query: &str,
        context: Option<&str>,
        conversation_id: &str,
    ) -> std::result::Result<BTreeMap<String, AnalysisResult>, AnalysisError> {
        let requests: Vec<AnalysisRequest> = self
            .experts
            .iter()
            .map(|expert| {
                let request = AnalysisRequest::new(query, expert.domain());
                match context {
                    Some(context) => request.with_context(context),
                    None => request,
                }
            })
            .collect();

        let results = if self.parallel {
            join_all(
                self.experts
                    .iter()
                    .zip(&requests)
                    .map(|(expert, request)| expert.analyze(request, conversation_id)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for (expert, request) in self.experts.iter().zip(&requests) {
                results.push(expert.analyze(request, conversation_id).await);
            }
            results
        };

        results.into_iter().map(|r| r.map(|a| (a.domain.clone(), a))).collect()
    }

    async fn execute_pending(&self, state: &mut SystemState) -> Result<Vec<StepOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(step_id) = state.workflow.next_pending().map(|s| s.step_id.clone()) {
            match self.execute_step(state, &step_id, None).await {
                Ok(artifact) => outcomes.push(StepOutcome::Succeeded { step_id, artifact }),
                Err(PipelineError::Generation(e)) => {
                    outcomes.push(StepOutcome::Failed {
                        step_id,
                        kind: e.kind(),
                        message: e.last_error().to_string(),
                        attempts: e.attempts(),
                    });
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    async fn execute_step(
        &self,
        state: &mut SystemState,
        step_id: &str,
        instructions: Option<&str>,
    ) -> Result<ArtifactRef> {
        if let Some(dependency) = state.workflow.unmet_dependency(step_id)? {
            return Err(WorkflowError::DependenciesNotMet { step_id: step_id.to_string(), dependency }.into());
        }

        let conversation_id = state.conversation_id.clone();
        let artifact_type = state
            .workflow
            .step(step_id)
            .map(|s| s.artifact_type)
            .ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))?;
        let accumulated = state.workflow.accumulated_prompt(step_id, &state.analysis_results)?;
        let insights = state.integration_insights();

        let prompt = self
            .prompt_builder
            .build(&StepContext {
                artifact_type,
                query: &state.query,
                accumulated: &accumulated,
                integration: insights.as_deref(),
                instructions,
            })
            .await;
        persist_quietly(self.storage.as_ref(), &keys::step_prompt(step_id, &conversation_id), &prompt);

        let content = prompt.content.clone();
        state.workflow.record_prompt(step_id, prompt, accumulated)?;
        state.status = ConversationStatus::Running;
        state.record_event(stage::STEP_STARTED, step_id);
        self.persist(state);

        let goal = format!("{} for: {}", artifact_type.description(), state.query);
        let output_dir = self.output_dir.join(&conversation_id);
        let request = GenerationRequest {
            step_id,
            artifact_type,
            goal: &goal,
            prompt: &content,
            output_dir: &output_dir,
        };

        match self.generator.generate(&request).await {
            Ok(artifact) => {
                state.workflow.mark_executed(step_id, artifact.clone())?;
                state.generated_artifacts.push(artifact.clone());
                state.record_event(
                    stage::STEP_COMPLETED,
                    format!("{step_id} -> {} ({} attempt(s))", artifact.path.display(), artifact.attempts),
                );
                state.refresh_status();
                self.persist(state);
                tracing::info!(%conversation_id, step_id, path = %artifact.path.display(), "step completed");
                Ok(artifact)
            }
            Err(e) => {
                tracing::error!(%conversation_id, step_id, attempts = e.attempts(), error = %e, "step failed");
                state.workflow.record_failure(
                    step_id,
                    StepFailure {
                        kind: e.kind(),
                        message: e.last_error().to_string(),
                        attempts: e.attempts(),
                        failed_at: Utc::now(),
                    },
                )?;
                state.record_event(stage::STEP_FAILED, e.to_string());
                state.refresh_status();
                self.persist(state);
                Err(e.into())
            }
        }
    }

    fn persist(&self, state: &SystemState) {
        if let Err(e) = state.save(self.storage.as_ref()) {
            tracing::warn!(conversation_id = %state.conversation_id, error = %e, "failed to persist conversation state");
        }
    }
}
