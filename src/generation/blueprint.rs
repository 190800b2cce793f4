//! Blueprint-shaped generation.
//!
//! The model answers with a JSON manifest of files. A manifest that fails to
//! parse is sent back with the parser's message; a valid one is written out
//! under the conversation's output directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::text::strip_code_fences;
use crate::core::{Rejection, Validator};

/// Project directory used when the manifest does not name one.
pub const DEFAULT_PROJECT_NAME: &str = "generated_project";

fn default_project_name() -> String {
    DEFAULT_PROJECT_NAME.to_string()
}

/// A multi-file project manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default = "default_project_name")]
    pub project_name: String,

    #[serde(default)]
    pub files: Vec<BlueprintFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintFile {
    /// Path relative to the project root
    pub path: String,

    #[serde(default)]
    pub content: String,
}

/// Parse a model response into a blueprint.
///
/// Code fences are stripped first. File paths must be relative and must not
/// climb out of the project root.
pub fn parse_blueprint(response: &str) -> Result<Blueprint, String> {
    let body = strip_code_fences(response);
    let blueprint: Blueprint = serde_json::from_str(&body).map_err(|e| e.to_string())?;

    for file in &blueprint.files {
        check_relative_path(&file.path)?;
    }
    Ok(blueprint)
}

fn check_relative_path(path: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err("file entry has an empty path".to_string());
    }
    let escapes = path.starts_with('/')
        || path.starts_with('\\')
        || Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(format!("file path {path:?} must be relative to the project root"));
    }
    Ok(())
}

/// Directory-safe version of a project name.
pub fn project_dir_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        default_project_name()
    } else {
        cleaned
    }
}

/// Write every file of `blueprint` under `root/<project_name>`.
///
/// Intermediate directories are created. A manifest without files yields an
/// empty project directory and a warning. Returns the project directory.
pub fn materialize(blueprint: &Blueprint, root: &Path) -> std::io::Result<PathBuf> {
    let project_dir = root.join(project_dir_name(&blueprint.project_name));
    fs::create_dir_all(&project_dir)?;

    if blueprint.files.is_empty() {
        tracing::warn!(project = %blueprint.project_name, "blueprint contains no files");
    }

    for file in &blueprint.files {
        let target = project_dir.join(&file.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &file.content)?;
        tracing::debug!(path = %target.display(), "wrote project file");
    }

    Ok(project_dir)
}

/// Parses candidate manifests.
pub struct BlueprintValidator;

#[async_trait]
impl Validator for BlueprintValidator {
    type Output = Blueprint;

    async fn validate(&self, response: &str) -> Result<Blueprint, Rejection> {
        parse_blueprint(response).map_err(|e| Rejection::parse(response, e))
    }

    fn correction_prompt(&self, goal: &str, rejection: &Rejection) -> String {
        format!(
            "The JSON blueprint you generated was invalid.\n\
             Original goal: {goal}\n\n\
             --- INVALID OUTPUT ---\n{}\n--- END INVALID OUTPUT ---\n\n\
             The parser failed with this error: {}\n\n\
             Return a single, valid JSON object with the keys \"project_name\" and \
             \"files\" (each file having \"path\" and \"content\"), with no extra text \
             or markdown.",
            rejection.candidate, rejection.error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_creates_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint =
            parse_blueprint(r#"{"project_name":"x","files":[{"path":"a/b.txt","content":"hi"}]}"#)
                .unwrap();

        let project = materialize(&blueprint, dir.path()).unwrap();

        assert_eq!(project, dir.path().join("x"));
        assert!(dir.path().join("x/a").is_dir());
        assert_eq!(std::fs::read_to_string(dir.path().join("x/a/b.txt")).unwrap(), "hi");
    }

    #[test]
    fn test_empty_manifest_makes_empty_project() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = parse_blueprint(r#"{"project_name":"empty","files":[]}"#).unwrap();

        let project = materialize(&blueprint, dir.path()).unwrap();
        assert!(project.is_dir());
        assert_eq!(std::fs::read_dir(project).unwrap().count(), 0);
    }

    #[test]
    fn test_fenced_json_and_default_name() {
        let blueprint = parse_blueprint("```json\n{\"files\": []}\n```").unwrap();
        assert_eq!(blueprint.project_name, DEFAULT_PROJECT_NAME);
    }

    #[test]
    fn test_fenced_json_with_nested_fence_in_content() {
        let response = "```json\n{\"project_name\":\"bot\",\"files\":[{\"path\":\"README.md\",\
                        \"content\":\"# Bot\\n```bash\\npip install bot\\n```\\n\"}]}\n```";

        let blueprint = parse_blueprint(response).unwrap();
        assert_eq!(blueprint.project_name, "bot");
        assert_eq!(blueprint.files[0].content, "# Bot\n```bash\npip install bot\n```\n");
    }

    #[test]
    fn test_invalid_json_reports_parser_error() {
        let err = parse_blueprint("{\"project_name\": \"x\", files: []}").unwrap_err();
        assert!(err.contains("line 1"));
    }

    #[test]
    fn test_escaping_paths_rejected() {
        assert!(parse_blueprint(r#"{"files":[{"path":"../evil","content":""}]}"#).is_err());
        assert!(parse_blueprint(r#"{"files":[{"path":"/etc/passwd","content":""}]}"#).is_err());
        assert!(parse_blueprint(r#"{"files":[{"path":"","content":""}]}"#).is_err());
    }

    #[test]
    fn test_project_dir_name_sanitized() {
        assert_eq!(project_dir_name("my app/v2"), "my_app_v2");
        assert_eq!(project_dir_name(".."), DEFAULT_PROJECT_NAME);
        assert_eq!(project_dir_name("robot_arm"), "robot_arm");
    }

    #[tokio::test]
    async fn test_validator_rejection_is_parse_kind() {
        let rejection = BlueprintValidator.validate("not json").await.unwrap_err();
        assert_eq!(rejection.kind, crate::core::RejectionKind::Parse);
        assert_eq!(rejection.candidate, "not json");

        let prompt = BlueprintValidator.correction_prompt("robot", &rejection);
        assert!(prompt.contains("--- INVALID OUTPUT ---\nnot json\n--- END INVALID OUTPUT ---"));
        assert!(prompt.contains(&rejection.error));
        assert!(prompt.contains("no extra text or markdown"));
    }
}
