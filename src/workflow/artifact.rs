//! Deliverable types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a deliverable is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationShape {
    /// The model writes a script that renders the deliverable when executed.
    Script,
    /// The model writes a JSON manifest of files.
    Blueprint,
}

/// Kind of deliverable a workflow step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Report,
    Diagram,
    Presentation,
    Document,
    CodeProject,
}

impl ArtifactType {
    /// All types, in decision precedence order.
    pub const ALL: [Self; 5] =
        [Self::Report, Self::Diagram, Self::Presentation, Self::Document, Self::CodeProject];

    /// Identifier used in step ids and serialized state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Diagram => "diagram",
            Self::Presentation => "presentation",
            Self::Document => "document",
            Self::CodeProject => "code_project",
        }
    }

    /// Words that select this type in a free-text decision.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Report => &["pdf"],
            Self::Diagram => &["diagram", "pipeline", "flowchart"],
            Self::Presentation => &["powerpoint", "presentation", "slide"],
            Self::Document => &["word", "docx", "document"],
            Self::CodeProject => &["code", "project"],
        }
    }

    pub fn shape(self) -> GenerationShape {
        match self {
            Self::CodeProject => GenerationShape::Blueprint,
            _ => GenerationShape::Script,
        }
    }

    /// Extension of the rendered file for script-shaped types.
    pub fn file_extension(self) -> Option<&'static str> {
        match self {
            Self::Report => Some("pdf"),
            Self::Diagram => Some("png"),
            Self::Presentation => Some("pptx"),
            Self::Document => Some("docx"),
            Self::CodeProject => None,
        }
    }

    /// One-line description shown to the planner.
    pub fn description(self) -> &'static str {
        match self {
            Self::Report => "a detailed PDF report",
            Self::Diagram => "a pipeline or architecture diagram",
            Self::Presentation => "a PowerPoint slide deck",
            Self::Document => "a Word document",
            Self::CodeProject => "a multi-file code project",
        }
    }
}

/// Location of a produced deliverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub artifact_type: ArtifactType,

    /// Rendered file, or the project root for blueprints.
    pub path: PathBuf,

    /// Attempts the generator needed.
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "report" | "pdf" | "pdf_report" => Ok(Self::Report),
            "diagram" | "pipeline" | "flowchart" => Ok(Self::Diagram),
            "presentation" | "powerpoint" | "ppt" | "pptx" | "slides" => Ok(Self::Presentation),
            "document" | "word" | "docx" => Ok(Self::Document),
            "code_project" | "code" | "project" => Ok(Self::CodeProject),
            other => Err(format!("unknown artifact type: {other}")),
        }
    }
}
