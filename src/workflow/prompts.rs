//! Step prompt construction.
//!
//! Each step's agent receives its role, the original request, the accumulated
//! context and any caller instructions. The artifact-specific output contract
//! is appended separately so later steps only accumulate the reasoning part.

use std::sync::Arc;

use chrono::Utc;

use super::{ArtifactType, GeneratedPrompt};
use crate::ai::{complete_bounded, CompletionOptions, LanguageModel};

/// Inputs for one step prompt.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub artifact_type: ArtifactType,
    pub query: &'a str,
    pub accumulated: &'a str,
    pub integration: Option<&'a str>,
    pub instructions: Option<&'a str>,
}

/// Role text for the agent producing a given artifact type.
pub fn agent_instruction(artifact_type: ArtifactType) -> &'static str {
    match artifact_type {
        ArtifactType::Report => {
            "You are a technical report writer. Turn engineering analyses into a \
             well-structured report with an executive summary, detailed sections per \
             domain, and clear recommendations."
        }
        ArtifactType::Diagram => {
            "You are a systems diagram designer. Turn engineering analyses into a clear \
             block or pipeline diagram showing components, interfaces and data or energy flow."
        }
        ArtifactType::Presentation => {
            "You are a presentation designer. Turn engineering analyses into a concise \
             slide deck with one idea per slide, speaker-ready bullet points and a closing \
             recommendations slide."
        }
        ArtifactType::Document => {
            "You are a technical documentation writer. Turn engineering analyses into a \
             formal specification document with numbered sections, requirements and \
             acceptance criteria."
        }
        ArtifactType::CodeProject => {
            "You are a senior software engineer. Turn engineering analyses into a working, \
             well-organized code project with a README, source files and tests."
        }
    }
}

/// Assemble the agent prompt for a step.
pub fn assemble_step_prompt(ctx: &StepContext<'_>) -> String {
    let mut prompt = format!(
        "{}\n\nORIGINAL USER REQUEST:\n{}\n\n",
        agent_instruction(ctx.artifact_type),
        ctx.query.trim()
    );

    if !ctx.accumulated.trim().is_empty() {
        prompt.push_str(ctx.accumulated.trim_end());
        prompt.push_str("\n\n");
    }
    if let Some(insights) = ctx.integration.filter(|i| !i.trim().is_empty()) {
        prompt.push_str(insights.trim_end());
        prompt.push_str("\n\n");
    }
    if let Some(instructions) = ctx.instructions.filter(|i| !i.trim().is_empty()) {
        prompt.push_str(&format!("SPECIFIC INSTRUCTIONS FOR THIS AGENT:\n{}\n\n", instructions.trim()));
    }

    prompt.push_str(&format!(
        "TASK: Produce {} that is consistent with the analyses and with any previous \
         agent prompts above.",
        ctx.artifact_type.description()
    ));
    prompt
}

/// Output rules appended to a step prompt before generation.
///
/// `output_file` is the file name a script must write, relative to its
/// working directory. Blueprint types ignore it.
pub fn output_contract(artifact_type: ArtifactType, output_file: &str) -> String {
    let script_rules = "Your entire output must be ONLY Python code. Do not include \
                        explanations or markdown.";
    match artifact_type {
        ArtifactType::Report => format!(
            "Write a complete, self-contained Python script that uses the reportlab library \
             to build a professional PDF report of the material above: a title, section \
             headings, the key findings and the recommendations. Save the PDF as \
             '{output_file}' in the current working directory.\n{script_rules}"
        ),
        ArtifactType::Diagram => format!(
            "Write a complete, self-contained Python script that uses the graphviz library \
             to draw the diagram described above with labelled nodes and edges. Render it \
             as PNG to exactly '{output_file}' in the current working directory, for \
             example with `dot.render(outfile='{output_file}', cleanup=True)`.\n{script_rules}"
        ),
        ArtifactType::Presentation => format!(
            "Write a complete, self-contained Python script that uses the python-pptx \
             library to build the slide deck described above: a title slide, content \
             slides and a summary slide. Save it as '{output_file}' in the current working \
             directory.\n{script_rules}"
        ),
        ArtifactType::Document => format!(
            "Write a complete, self-contained Python script that uses the python-docx \
             library to build the document described above with headings, paragraphs and \
             bullet lists. Save it as '{output_file}' in the current working \
             directory.\n{script_rules}"
        ),
        ArtifactType::CodeProject => "Respond with a single JSON object and nothing else, \
             with no markdown fences. It must have exactly these keys:\n\
             - \"project_name\": a short snake_case directory name\n\
             - \"files\": an array of objects, each with \"path\" (relative to the project \
             root) and \"content\" (the complete file text)\n\
             Include a requirements.txt entry when the project needs third-party packages."
            .to_string(),
    }
}

/// Builds each step's [`GeneratedPrompt`], optionally letting the model
/// sharpen it first.
pub struct StepPromptBuilder {
    model: Arc<dyn LanguageModel>,
    options: CompletionOptions,
    enhance: bool,
}

impl StepPromptBuilder {
    pub fn new(model: Arc<dyn LanguageModel>, options: CompletionOptions, enhance: bool) -> Self {
        Self { model, options, enhance }
    }

    pub async fn build(&self, ctx: &StepContext<'_>) -> GeneratedPrompt {
        let assembled = assemble_step_prompt(ctx);

        let (content, enhanced) = if self.enhance {
            match self.enhance_prompt(&assembled).await {
                Some(better) => (better, true),
                None => (assembled, false),
            }
        } else {
            (assembled, false)
        };

        GeneratedPrompt { agent: ctx.artifact_type, content, enhanced, created_at: Utc::now() }
    }

    async fn enhance_prompt(&self, assembled: &str) -> Option<String> {
        let request = format!(
            "You are a prompt engineer. Rewrite the agent prompt below so it is more \
             specific and actionable. Keep every technical detail and every section. \
             Return only the rewritten prompt.\n\n--- PROMPT ---\n{assembled}\n--- END PROMPT ---"
        );
        match complete_bounded(self.model.as_ref(), &request, &self.options).await {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "prompt enhancement failed, using assembled prompt");
                None
            }
        }
    }
}
