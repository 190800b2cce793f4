//! Pipeline Integration Tests
//!
//! Drives whole conversations through the orchestrator with a scripted model
//! and a fake script executor. The executor understands two directives, one
//! per line:
//!
//! - `save <file>` creates `<file>` in the working directory
//! - `fail <message>` exits non-zero with `<message>` on stderr

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use metaforge::ai::ScriptedModel;
use metaforge::core::{ArtifactExecutor, Config, ExecutionError, ExecutionOutcome};
use metaforge::orchestrator::{ConversationStatus, FailureKind, Orchestrator, PipelineError, StepOutcome};
use metaforge::storage::{FileStore, MemoryStore, Storage, StorageError};
use metaforge::workflow::{ArtifactType, Plan, StepFailureKind, StepStatus};

// ============================================================================
// Fixtures
// ============================================================================

const MECHANICAL: &str = "The chassis carries the full payload.\n\
    Key finding: the frame must resist torsion\n\
    Recommend an aluminium extrusion frame\n\
    Next step: prototype the frame";

const ELECTRICAL: &str = "Power budget is tight.\n\
    - Important: peak motor current is 4 A\n\
    - We recommend a 3S LiPo pack\n\
    - Next, size the motor drivers";

const PROGRAMMING: &str = "Control loop runs at 100 Hz.\n\
    1. Finding: PID is sufficient\n\
    2. Recommendation: use a PID controller with feed-forward\n\
    3. Step: write the sensor driver";

/// Fake interpreter for generated scripts.
#[derive(Default)]
struct DirectiveExecutor {
    runs: Mutex<Vec<String>>,
}

impl DirectiveExecutor {
    fn runs(&self) -> Vec<String> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl ArtifactExecutor for DirectiveExecutor {
    async fn execute(
        &self,
        script: &Path,
        working_dir: &Path,
        _timeout: Duration,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let code = std::fs::read_to_string(script).unwrap();
        self.runs.lock().push(code.clone());

        for line in code.lines() {
            if let Some(file) = line.strip_prefix("save ") {
                std::fs::write(working_dir.join(file.trim()), b"artifact").unwrap();
            } else if let Some(message) = line.strip_prefix("fail ") {
                return Ok(ExecutionOutcome {
                    success: false,
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: message.to_string(),
                    duration: Duration::ZERO,
                });
            }
        }

        Ok(ExecutionOutcome {
            success: true,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        })
    }
}

/// Model that answers every domain expert.
fn analysts() -> ScriptedModel {
    ScriptedModel::new()
        .with_rule("DOMAIN: mechanical", MECHANICAL)
        .with_rule("DOMAIN: electrical", ELECTRICAL)
        .with_rule("DOMAIN: programming", PROGRAMMING)
}

/// Add a rule that makes the step producing `file` save it.
fn saves(model: ScriptedModel, file: &str) -> ScriptedModel {
    model.with_rule(format!("'{file}'"), format!("```python\nsave {file}\n```"))
}

/// Store whose writes always fail and which never holds anything.
struct FailingStore;

impl Storage for FailingStore {
    fn save(&self, key: &str, _value: &serde_json::Value) -> Result<(), StorageError> {
        Err(StorageError::Io {
            key: key.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume"),
        })
    }

    fn load(&self, _key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(None)
    }
}

struct Harness {
    temp: TempDir,
    model: Arc<ScriptedModel>,
    executor: Arc<DirectiveExecutor>,
    storage: Arc<dyn Storage>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new(model: ScriptedModel) -> Self {
        let temp = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        Self::with_storage(temp, model, storage)
    }

    fn on_disk(model: ScriptedModel) -> Self {
        let temp = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(FileStore::new(temp.path().join("state")));
        Self::with_storage(temp, model, storage)
    }

    fn with_storage(temp: TempDir, model: ScriptedModel, storage: Arc<dyn Storage>) -> Self {
        let mut config = Config::default();
        config.storage.data_dir = Some(temp.path().to_path_buf());
        config.storage.output_dir = Some(temp.path().join("out"));
        config.generation.scratch_dir = Some(temp.path().join("scratch"));

        let model = Arc::new(model);
        let executor = Arc::new(DirectiveExecutor::default());
        let orchestrator = Orchestrator::new(&config, model.clone(), executor.clone(), Arc::clone(&storage));
        Self { temp, model, executor, storage, orchestrator }
    }

    fn output_dir(&self, conversation_id: &str) -> PathBuf {
        self.temp.path().join("out").join(conversation_id)
    }
}

// ============================================================================
// Analysis
// ============================================================================

#[tokio::test]
async fn test_one_analysis_per_domain() {
    let harness = Harness::new(saves(analysts(), "step_1_report.pdf"));

    let outcome = harness
        .orchestrator
        .run_with("Design a line-following robot", Plan::Explicit(vec![ArtifactType::Report]), None)
        .await
        .unwrap();

    let domains: Vec<&str> = outcome.domain_outputs.keys().map(String::as_str).collect();
    assert_eq!(domains, ["electrical", "mechanical", "programming"]);
    for result in outcome.domain_outputs.values() {
        assert!(!result.key_findings.is_empty(), "{} has no findings", result.domain);
        assert!(!result.recommendations.is_empty(), "{} has no recommendations", result.domain);
        assert!(!result.next_steps.is_empty(), "{} has no next steps", result.domain);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    }
    assert_eq!(outcome.domain_outputs["electrical"].recommendations, ["We recommend a 3S LiPo pack"]);
    assert_eq!(harness.model.prompts_containing("DOMAIN: ").len(), 3);
}

#[tokio::test]
async fn test_missing_sections_use_placeholders() {
    let model = ScriptedModel::new()
        .with_rule("DOMAIN: mechanical", "Key finding: gears are undersized")
        .with_rule("DOMAIN: electrical", ELECTRICAL)
        .with_rule("DOMAIN: programming", PROGRAMMING);
    let harness = Harness::new(saves(model, "step_1_report.pdf"));

    let outcome = harness
        .orchestrator
        .run_with("Design a gearbox", Plan::Explicit(vec![ArtifactType::Report]), None)
        .await
        .unwrap();

    let mechanical = &outcome.domain_outputs["mechanical"];
    assert_eq!(mechanical.key_findings, ["Key finding: gears are undersized"]);
    assert_eq!(mechanical.recommendations, ["Consider mechanical design constraints"]);
    assert_eq!(mechanical.next_steps, ["Proceed to electrical analysis"]);
    assert!((mechanical.confidence - 1.0 / 3.0).abs() < 1e-9);
}

// ============================================================================
// Planning
// ============================================================================

#[tokio::test]
async fn test_planner_powerpoint_answer_selects_presentation() {
    let model = analysts().with_rule("You are a workflow planner", "A PowerPoint deck suits the stakeholders.");
    let harness = Harness::new(saves(model, "step_1_presentation.pptx"));

    let outcome = harness.orchestrator.run("Pitch a delivery drone to investors").await.unwrap();

    assert_eq!(outcome.chosen_artifact_type, ArtifactType::Presentation);
    assert!(outcome.decision.as_ref().unwrap().fallback.is_none());
    let artifact = outcome.generated_artifact.artifact().unwrap();
    assert_eq!(artifact.path, harness.output_dir(&outcome.conversation_id).join("step_1_presentation.pptx"));
    assert!(artifact.path.exists());
}

#[tokio::test]
async fn test_undecidable_planner_defaults_to_report() {
    let model = analysts().with_rule("You are a workflow planner", "Hard to say.");
    let harness = Harness::new(saves(model, "step_1_report.pdf"));

    let outcome = harness.orchestrator.run("Design a robot arm").await.unwrap();

    assert_eq!(outcome.chosen_artifact_type, ArtifactType::Report);
    assert!(outcome.decision.unwrap().fallback.is_some());
    assert!(outcome.generated_artifact.is_success());
}

// ============================================================================
// Workflow Chains
// ============================================================================

#[tokio::test]
async fn test_three_step_chain() {
    let model = saves(
        saves(saves(analysts(), "step_1_diagram.png"), "step_2_report.pdf"),
        "step_3_presentation.pptx",
    );
    let harness = Harness::new(model);

    let outcome = harness
        .orchestrator
        .run_with(
            "Design a weather station",
            Plan::Explicit(vec![ArtifactType::Diagram, ArtifactType::Report, ArtifactType::Presentation]),
            None,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = outcome.steps.iter().map(StepOutcome::step_id).collect();
    assert_eq!(ids, ["step_1_diagram", "step_2_report", "step_3_presentation"]);
    assert!(outcome.steps.iter().all(StepOutcome::is_success));

    let state = harness.orchestrator.load_conversation(&outcome.conversation_id).unwrap();
    let steps = state.workflow.steps();
    assert!(steps[0].dependencies.is_empty());
    assert_eq!(steps[1].dependencies, ["step_1_diagram"]);
    assert_eq!(steps[2].dependencies, ["step_2_report"]);
    assert_eq!(state.status, ConversationStatus::Completed);
    assert_eq!(state.generated_artifacts.len(), 3);

    // Step 3 was prompted with the prompts of both earlier steps.
    assert!(steps[2].accumulated_prompt.contains("=== DIAGRAM AGENT PROMPT ==="));
    assert!(steps[2].accumulated_prompt.contains("=== REPORT AGENT PROMPT ==="));
    assert!(!steps[1].accumulated_prompt.contains("=== REPORT AGENT PROMPT ==="));
}

#[tokio::test]
async fn test_accumulated_prompt_is_stable_between_calls() {
    let model = saves(saves(analysts(), "step_1_diagram.png"), "step_2_report.pdf");
    let harness = Harness::new(model);

    let outcome = harness
        .orchestrator
        .run_with(
            "Design a weather station",
            Plan::Explicit(vec![ArtifactType::Diagram, ArtifactType::Report]),
            None,
        )
        .await
        .unwrap();

    let state = harness.orchestrator.load_conversation(&outcome.conversation_id).unwrap();
    let first = state.workflow.accumulated_prompt("step_2_report", &state.analysis_results).unwrap();
    let second = state.workflow.accumulated_prompt("step_2_report", &state.analysis_results).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, state.workflow.step("step_2_report").unwrap().accumulated_prompt);
}

#[tokio::test]
async fn test_run_step_respects_dependencies() {
    let model = saves(saves(analysts(), "step_1_diagram.png"), "step_2_report.pdf");
    let harness = Harness::new(model);

    let state = harness
        .orchestrator
        .start("Design a solar charger", Plan::Explicit(vec![ArtifactType::Diagram, ArtifactType::Report]), None)
        .await
        .unwrap();
    let cid = state.conversation_id;

    let err = harness.orchestrator.run_step(&cid, "step_2_report", None).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::State);
    assert!(harness.executor.runs().is_empty());

    let first = harness.orchestrator.run_step(&cid, "step_1_diagram", Some("landscape layout")).await.unwrap();
    assert_eq!(first.path, harness.output_dir(&cid).join("step_1_diagram.png"));
    assert_eq!(harness.model.prompts_containing("SPECIFIC INSTRUCTIONS FOR THIS AGENT:\nlandscape layout").len(), 1);

    harness.orchestrator.run_step(&cid, "step_2_report", None).await.unwrap();
    let status = harness.orchestrator.workflow_status(&cid).unwrap();
    assert_eq!(status.completed_steps, 2);
    assert!(status.steps.iter().all(|s| s.status == StepStatus::Completed && s.has_prompt));
}

#[tokio::test]
async fn test_run_all_executes_planned_workflow() {
    let model = saves(saves(analysts(), "step_1_document.docx"), "step_2_diagram.png");
    let harness = Harness::new(model);

    let state = harness
        .orchestrator
        .start("Design a bike light", Plan::Explicit(vec![ArtifactType::Document, ArtifactType::Diagram]), None)
        .await
        .unwrap();
    assert_eq!(harness.orchestrator.workflow_status(&state.conversation_id).unwrap().completed_steps, 0);

    let outcomes = harness.orchestrator.run_all(&state.conversation_id).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(StepOutcome::is_success));
    assert_eq!(harness.executor.runs().len(), 2);
}

#[tokio::test]
async fn test_modify_step_redoes_later_steps_only() {
    let model = saves(
        saves(
            saves(saves(analysts(), "step_1_diagram.png"), "step_2_report.pdf"),
            "step_3_presentation.pptx",
        ),
        "step_4_document.docx",
    );
    let harness = Harness::new(model);

    let outcome = harness
        .orchestrator
        .run_with(
            "Design an irrigation controller",
            Plan::Explicit(vec![
                ArtifactType::Diagram,
                ArtifactType::Report,
                ArtifactType::Presentation,
                ArtifactType::Document,
            ]),
            None,
        )
        .await
        .unwrap();
    let cid = outcome.conversation_id;
    let before = harness.orchestrator.load_conversation(&cid).unwrap();
    let step_1_before = before.workflow.step("step_1_diagram").unwrap().clone();
    assert_eq!(harness.executor.runs().len(), 4);

    let produced = harness.orchestrator.modify_step(&cid, "step_2_report", "add a bill of materials").await.unwrap();

    let types: Vec<ArtifactType> = produced.keys().copied().collect();
    assert_eq!(types, [ArtifactType::Report, ArtifactType::Presentation, ArtifactType::Document]);

    let runs = harness.executor.runs();
    assert_eq!(runs.len(), 7);
    assert!(runs[4].contains("step_2_report.pdf"));
    assert!(runs[5].contains("step_3_presentation.pptx"));
    assert!(runs[6].contains("step_4_document.docx"));

    let after = harness.orchestrator.load_conversation(&cid).unwrap();
    assert_eq!(after.workflow.step("step_1_diagram").unwrap(), &step_1_before);
    assert_eq!(after.workflow.status().completed_steps, 4);

    let step_2 = after.workflow.step("step_2_report").unwrap();
    assert!(step_2.generated_prompt.as_ref().unwrap().content.contains("add a bill of materials"));
    let step_3 = after.workflow.step("step_3_presentation").unwrap();
    assert!(step_3.accumulated_prompt.contains("add a bill of materials"));
}

#[tokio::test]
async fn test_modify_keeps_regenerated_steps_when_a_later_step_fails() {
    let model = saves(saves(analysts(), "step_1_diagram.png"), "step_2_report.pdf")
        .with_responses(["```python\nsave step_3_presentation.pptx\n```"])
        .with_responses(["fail slide master missing"; 3]);
    let harness = Harness::new(model);

    let outcome = harness
        .orchestrator
        .run_with(
            "Design a bike light",
            Plan::Explicit(vec![ArtifactType::Diagram, ArtifactType::Report, ArtifactType::Presentation]),
            None,
        )
        .await
        .unwrap();
    assert!(outcome.steps.iter().all(StepOutcome::is_success));
    let cid = outcome.conversation_id;

    let err = harness.orchestrator.modify_step(&cid, "step_2_report", "use metric units").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Generation);

    let state = harness.orchestrator.load_conversation(&cid).unwrap();
    let status = state.workflow.status();
    assert_eq!(status.completed_steps, 2);
    assert_eq!(status.steps[1].status, StepStatus::Completed);
    assert_eq!(status.steps[2].status, StepStatus::Failed);
    assert_eq!(status.steps[2].error.as_deref(), Some("slide master missing"));

    let step_2 = state.workflow.step("step_2_report").unwrap();
    assert!(step_2.generated_prompt.as_ref().unwrap().content.contains("use metric units"));
    assert_eq!(state.status, ConversationStatus::Failed);
}

#[tokio::test]
async fn test_modify_unknown_step() {
    let harness = Harness::new(saves(analysts(), "step_1_report.pdf"));
    let outcome = harness
        .orchestrator
        .run_with("Design a kettle", Plan::Explicit(vec![ArtifactType::Report]), None)
        .await
        .unwrap();

    let err = harness.orchestrator.modify_step(&outcome.conversation_id, "step_7_report", "x").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::NotFound);
}

// ============================================================================
// Self-Correction
// ============================================================================

#[tokio::test]
async fn test_always_failing_script_reports_generation_failure() {
    let harness = Harness::new(analysts().with_fallback("fail ImportError: No module named 'reportlab'"));

    let outcome = harness
        .orchestrator
        .run_with("Design a toaster", Plan::Explicit(vec![ArtifactType::Report]), None)
        .await
        .unwrap();

    assert_eq!(harness.executor.runs().len(), 3);
    assert_eq!(outcome.domain_outputs.len(), 3);
    match &outcome.generated_artifact {
        StepOutcome::Failed { step_id, kind, message, attempts } => {
            assert_eq!(step_id, "step_1_report");
            assert_eq!(*kind, StepFailureKind::Generation);
            assert_eq!(*attempts, 3);
            assert_eq!(message, "ImportError: No module named 'reportlab'");
        }
        other => panic!("expected a failed step, got {other:?}"),
    }

    let state = harness.orchestrator.load_conversation(&outcome.conversation_id).unwrap();
    assert_eq!(state.status, ConversationStatus::Failed);
    assert_eq!(state.analysis_results.len(), 3);
    let status = harness.orchestrator.workflow_status(&outcome.conversation_id).unwrap();
    assert_eq!(status.steps[0].status, StepStatus::Failed);
    assert_eq!(status.steps[0].error.as_deref(), Some("ImportError: No module named 'reportlab'"));
}

#[tokio::test]
async fn test_fail_then_succeed_feeds_error_back() {
    let model = analysts().with_responses([
        "fail NameError: name 'canvas' is not defined",
        "save step_1_report.pdf",
    ]);
    let harness = Harness::new(model);

    let outcome = harness
        .orchestrator
        .run_with("Design a lamp", Plan::Explicit(vec![ArtifactType::Report]), None)
        .await
        .unwrap();

    let artifact = outcome.generated_artifact.artifact().expect("step should succeed");
    assert_eq!(artifact.attempts, 2);
    assert!(artifact.path.exists());

    let generation_prompts = harness.model.prompts_containing("'step_1_report.pdf'");
    assert_eq!(generation_prompts.len(), 2);
    assert!(generation_prompts[1].contains("NameError: name 'canvas' is not defined"));
    assert!(generation_prompts[1].contains("--- FAILED CODE ---\nfail NameError"));
}

#[tokio::test]
async fn test_failed_step_can_be_retried() {
    let model = analysts().with_responses(["fail one", "fail two", "fail three", "save step_1_report.pdf"]);
    let harness = Harness::new(model);

    let outcome = harness
        .orchestrator
        .run_with("Design a fan", Plan::Explicit(vec![ArtifactType::Report]), None)
        .await
        .unwrap();
    assert!(!outcome.generated_artifact.is_success());

    let artifact = harness.orchestrator.run_step(&outcome.conversation_id, "step_1_report", None).await.unwrap();
    assert_eq!(artifact.attempts, 1);
    let state = harness.orchestrator.load_conversation(&outcome.conversation_id).unwrap();
    assert_eq!(state.status, ConversationStatus::Completed);
    assert!(state.workflow.step("step_1_report").unwrap().failure.is_none());
}

// ============================================================================
// Blueprints
// ============================================================================

#[tokio::test]
async fn test_blueprint_materializes_nested_files() {
    let model = analysts().with_rule(
        "\"project_name\": a short snake_case",
        r#"{"project_name":"x","files":[{"path":"a/b.txt","content":"hi"}]}"#,
    );
    let harness = Harness::new(model);

    let outcome = harness
        .orchestrator
        .run_with("Write firmware for a thermostat", Plan::Explicit(vec![ArtifactType::CodeProject]), None)
        .await
        .unwrap();

    let project = harness.output_dir(&outcome.conversation_id).join("x");
    assert_eq!(outcome.generated_artifact.artifact().unwrap().path, project);
    assert!(project.join("a").is_dir());
    assert_eq!(std::fs::read_to_string(project.join("a/b.txt")).unwrap(), "hi");
    assert!(harness.executor.runs().is_empty());
}

#[tokio::test]
async fn test_blueprint_parse_failure() {
    let harness = Harness::new(analysts().with_fallback("here is your project!"));

    let outcome = harness
        .orchestrator
        .run_with("Write firmware", Plan::Explicit(vec![ArtifactType::CodeProject]), None)
        .await
        .unwrap();

    match outcome.generated_artifact {
        StepOutcome::Failed { kind, attempts, .. } => {
            assert_eq!(kind, StepFailureKind::Parse);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected a parse failure, got {other:?}"),
    }
    assert_eq!(harness.model.prompts_containing("--- INVALID OUTPUT ---").len(), 2);
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_state_round_trips_through_file_store() {
    let harness = Harness::on_disk(saves(analysts(), "step_1_report.pdf"));

    let outcome = harness
        .orchestrator
        .run_with("Design a smart lock", Plan::Explicit(vec![ArtifactType::Report]), None)
        .await
        .unwrap();

    let loaded = harness.orchestrator.load_conversation(&outcome.conversation_id).unwrap();
    assert_eq!(loaded.analysis_results, outcome.domain_outputs);

    loaded.save(harness.storage.as_ref()).unwrap();
    let reloaded = harness.orchestrator.load_conversation(&outcome.conversation_id).unwrap();
    assert_eq!(reloaded, loaded);

    let state_file = harness.temp.path().join(format!("state/system_state_{}.json", outcome.conversation_id));
    assert!(state_file.exists());
    assert!(harness.temp.path().join(format!("state/mechanical_analysis_{}.json", outcome.conversation_id)).exists());
}

#[tokio::test]
async fn test_failed_writes_do_not_stop_a_run() {
    let temp = TempDir::new().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(FailingStore);
    let harness = Harness::with_storage(temp, saves(analysts(), "step_1_report.pdf"), storage);

    let outcome = harness
        .orchestrator
        .run_with("Design a greenhouse controller", Plan::Explicit(vec![ArtifactType::Report]), None)
        .await
        .unwrap();

    assert_eq!(outcome.domain_outputs.len(), 3);
    assert!(outcome.generated_artifact.is_success());
    assert!(outcome.generated_artifact.artifact().unwrap().path.exists());

    // Nothing was stored, so the conversation cannot be reloaded.
    let err = harness.orchestrator.load_conversation(&outcome.conversation_id).unwrap_err();
    assert_eq!(err.kind(), FailureKind::NotFound);
}

#[tokio::test]
async fn test_analysis_failure_aborts_conversation() {
    let model = ScriptedModel::new()
        .with_rule("DOMAIN: mechanical", MECHANICAL)
        .with_rule("DOMAIN: programming", PROGRAMMING)
        .with_failing_rule("DOMAIN: electrical", metaforge::LlmError::Timeout(Duration::from_secs(60)));
    let harness = Harness::new(model);

    let err = harness.orchestrator.run("Design a drone").await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Analysis);
    assert!(matches!(err, PipelineError::Analysis(_)));
    assert!(err.to_string().contains("electrical"));
    assert!(harness.executor.runs().is_empty());
}
