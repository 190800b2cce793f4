//! Metaforge - multi-domain analysis to generated deliverables.
//!
//! Analyzes a request from several engineering domains, plans a deliverable
//! and generates it through a self-correcting model loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use metaforge::core::Config;
use metaforge::orchestrator::{Orchestrator, RunOutcome, StepOutcome};
use metaforge::workflow::{ArtifactType, Plan};
use metaforge::{FileStore, LanguageModel, ScriptRunner};

/// Multi-domain analysis that ends in a generated deliverable
#[derive(Parser)]
#[command(name = "metaforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default lookup
    #[arg(short, long, global = true, env = "METAFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for conversation state and artifacts
    #[arg(long, global = true, env = "METAFORGE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a request and generate its deliverable
    Run {
        /// What to design or analyze
        query: String,

        /// Comma-separated artifact types to generate in order (skips planning)
        #[arg(short, long, value_delimiter = ',')]
        workflow: Vec<ArtifactType>,

        /// Extra context passed to every domain expert
        #[arg(long)]
        context: Option<String>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute one workflow step of an existing conversation
    Step {
        /// Conversation id
        conversation_id: String,

        /// Step id (for example step_2_report)
        step_id: String,

        /// Extra instructions for this step's agent
        #[arg(short, long)]
        instructions: Option<String>,
    },

    /// Regenerate a step with feedback, then every step after it
    Modify {
        /// Conversation id
        conversation_id: String,

        /// Step id to change
        step_id: String,

        /// What to change
        #[arg(short, long)]
        feedback: String,
    },

    /// Show workflow progress for a conversation
    Status {
        /// Conversation id
        conversation_id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the stored conversation state as JSON
    Show {
        /// Conversation id
        conversation_id: String,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Write the current configuration to the global config file
        #[arg(long, conflicts_with = "path")]
        init: bool,

        /// Overwrite an existing config file (with --init)
        #[arg(long, requires = "init")]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // API keys may live in a local .env file
    let _ = dotenvy::dotenv();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }

    match cli.command {
        Commands::Run { query, workflow, context, json } => cmd_run(&config, &query, workflow, context, json),
        Commands::Step { conversation_id, step_id, instructions } => {
            cmd_step(&config, &conversation_id, &step_id, instructions.as_deref())
        }
        Commands::Modify { conversation_id, step_id, feedback } => {
            cmd_modify(&config, &conversation_id, &step_id, &feedback)
        }
        Commands::Status { conversation_id, json } => cmd_status(&config, &conversation_id, json),
        Commands::Show { conversation_id } => cmd_show(&config, &conversation_id),
        Commands::Config { path, init, force } => {
            if init {
                cmd_config_init(&config, force)
            } else {
                cmd_config(&config, path)
            }
        }
    }
}

/// Orchestrator backed by the configured model and on-disk storage.
fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let model = build_model(config)?;
    tracing::debug!(provider = model.name(), model = %config.llm.model, "using language model");
    Ok(build_with_model(config, model))
}

/// Orchestrator for commands that only read stored state.
fn build_offline(config: &Config) -> Orchestrator {
    build_with_model(config, Arc::new(metaforge::ScriptedModel::new()))
}

fn build_with_model(config: &Config, model: Arc<dyn LanguageModel>) -> Orchestrator {
    let storage = Arc::new(FileStore::new(config.resolved_data_dir().join("state")));
    tracing::debug!(state_dir = %storage.root().display(), "using file store");
    let executor = Arc::new(ScriptRunner::new(&config.generation.interpreter));
    Orchestrator::new(config, model, executor, storage)
}

#[cfg(feature = "providers")]
fn build_model(config: &Config) -> Result<Arc<dyn LanguageModel>> {
    metaforge::ai::provider_from_config(&config.llm)
}

#[cfg(not(feature = "providers"))]
fn build_model(_config: &Config) -> Result<Arc<dyn LanguageModel>> {
    anyhow::bail!("metaforge was built without model providers; rebuild with --features providers")
}

fn cmd_run(
    config: &Config,
    query: &str,
    workflow: Vec<ArtifactType>,
    context: Option<String>,
    json: bool,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let plan = if workflow.is_empty() { Plan::Decide } else { Plan::Explicit(workflow) };

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(orchestrator.run_with(query, plan, context))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_run_outcome(&outcome);
    }

    if !outcome.generated_artifact.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_run_outcome(outcome: &RunOutcome) {
    println!("Conversation: {}", outcome.conversation_id);
    println!();
    println!("Domain analyses:");
    for (domain, result) in &outcome.domain_outputs {
        println!(
            "  {domain:<12} {} finding(s), {} recommendation(s), confidence {:.2}",
            result.key_findings.len(),
            result.recommendations.len(),
            result.confidence
        );
    }
    println!();

    match &outcome.decision {
        Some(decision) if decision.fallback.is_some() => {
            println!("Deliverable: {} (planner default)", outcome.chosen_artifact_type);
        }
        _ => println!("Deliverable: {}", outcome.chosen_artifact_type),
    }

    for step in &outcome.steps {
        match step {
            StepOutcome::Succeeded { step_id, artifact } => {
                println!("  ✓ {step_id} -> {} ({} attempt(s))", artifact.path.display(), artifact.attempts);
            }
            StepOutcome::Failed { step_id, message, attempts, .. } => {
                println!("  ✗ {step_id} failed after {attempts} attempt(s)");
                println!("    {message}");
            }
        }
    }
}

fn cmd_step(config: &Config, conversation_id: &str, step_id: &str, instructions: Option<&str>) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let rt = tokio::runtime::Runtime::new()?;

    let artifact = rt.block_on(orchestrator.run_step(conversation_id, step_id, instructions))?;
    println!("{step_id} -> {}", artifact.path.display());
    Ok(())
}

fn cmd_modify(config: &Config, conversation_id: &str, step_id: &str, feedback: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let rt = tokio::runtime::Runtime::new()?;

    let produced = rt.block_on(orchestrator.modify_step(conversation_id, step_id, feedback))?;
    for (artifact_type, artifact) in &produced {
        println!("{artifact_type:<14} {}", artifact.path.display());
    }
    Ok(())
}

fn cmd_status(config: &Config, conversation_id: &str, json: bool) -> Result<()> {
    let status = build_offline(config).workflow_status(conversation_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", status.to_summary_string());
    }
    Ok(())
}

fn cmd_show(config: &Config, conversation_id: &str) -> Result<()> {
    let state = build_offline(config).load_conversation(conversation_id)?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn cmd_config(config: &Config, show_path: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Config::config_dir() {
            println!("{}", path.display());
        }
    } else {
        let toml = toml::to_string_pretty(config)?;
        println!("{toml}");
    }
    Ok(())
}

fn cmd_config_init(config: &Config, force: bool) -> Result<()> {
    let target = Config::global_config_path().context("Could not determine config directory")?;
    if target.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", target.display());
    }

    let path = config.save()?;
    println!("Wrote {}", path.display());
    Ok(())
}
