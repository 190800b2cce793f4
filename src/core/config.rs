//! Configuration management for Metaforge.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ai::CompletionOptions;
use crate::analysis::{builtin_profiles, DomainProfile};
use crate::core::RetryConfig;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language model settings
    pub llm: LlmConfig,

    /// Self-correcting generation settings
    pub generation: GenerationConfig,

    /// Domain analysis settings
    pub analysis: AnalysisConfig,

    /// Where state and artifacts are written
    pub storage: StorageConfig,

    /// Domain expert profiles, in fan-out order
    pub domains: Vec<DomainProfile>,
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (ollama, openai, auto)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// API base URL
    pub base_url: String,

    /// Environment variable holding the API key (openai provider)
    pub api_key_env: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

/// Self-correcting generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Attempts per step, including the first
    pub max_attempts: u32,

    /// Wall-clock limit for one script run, in seconds
    pub execution_timeout_secs: u64,

    /// Interpreter used to run generated scripts
    pub interpreter: String,

    /// Directory for scratch scripts (system temp dir when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    /// Require a script to leave its output file behind to count as success
    pub require_output_file: bool,

    /// Let the model rewrite each step prompt before generation
    pub enhance_prompts: bool,
}

/// Domain analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Run domain experts concurrently
    pub parallel: bool,

    /// Produce a cross-domain integration report
    pub integrate: bool,
}

/// Storage locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for persisted JSON records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Directory for generated artifacts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.metaforge.toml` in current directory
    /// 2. `~/.config/metaforge/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".metaforge.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::global_config_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the global config file.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let config_path = Self::global_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Write configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the global config file.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("metaforge"))
    }

    /// Get the default data directory path.
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("metaforge"))
    }

    /// Resolved directory for persisted records.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(Self::data_dir)
            .unwrap_or_else(|| PathBuf::from(".metaforge"))
    }

    /// Resolved directory for generated artifacts.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.storage.output_dir.clone().unwrap_or_else(|| self.resolved_data_dir().join("artifacts"))
    }

    /// Resolved directory for scratch scripts.
    pub fn resolved_scratch_dir(&self) -> PathBuf {
        self.generation.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl LlmConfig {
    /// Completion options derived from these settings.
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl GenerationConfig {
    /// Retry settings for the correction loop.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig { max_attempts: self.max_attempts.max(1) }
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            generation: GenerationConfig::default(),
            analysis: AnalysisConfig::default(),
            storage: StorageConfig::default(),
            domains: builtin_profiles(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            execution_timeout_secs: 120,
            interpreter: "python3".to_string(),
            scratch_dir: None,
            require_output_file: true,
            enhance_prompts: false,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { parallel: true, integrate: false }
    }
}
