//! Configuration loading.
//!
//! Mailvault reads a single human-owned `config.toml`. Every section and
//! field is optional; a missing file means all defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::providers::ollama::DEFAULT_OLLAMA_URL;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "MAILVAULT_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Model selection.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Extraction workflow tuning.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Reasoning and embedding model selection.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Reasoning engine as `provider/model` (e.g. "ollama/qwen3:4b").
    #[serde(default = "default_reasoning_model")]
    pub reasoning: String,

    /// Embedding model name served by Ollama.
    #[serde(default = "default_embedding_model")]
    pub embedding: String,

    /// Output dimensionality of the embedding model.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Ollama server base URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Sampling temperature for the reasoning engine; server default if unset.
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            reasoning: default_reasoning_model(),
            embedding: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            ollama_url: default_ollama_url(),
            temperature: None,
        }
    }
}

/// Confidence model and call limits for the extraction workflow.
///
/// The confidence values are heuristics, not probabilities.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkflowConfig {
    /// Starting confidence of every extraction.
    #[serde(default = "default_base_confidence")]
    pub base_confidence: f64,

    /// Confidence once any data was extracted.
    #[serde(default = "default_extracted_confidence")]
    pub extracted_confidence: f64,

    /// Added (capped at 1.0) when validation passes.
    #[serde(default = "default_validation_bonus")]
    pub validation_bonus: f64,

    /// Classify-stage confidence when the engine reports none.
    #[serde(default = "default_default_confidence")]
    pub default_confidence: f64,

    /// Per-call deadline for the reasoning engine, in seconds.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Response token limit passed to the reasoning engine.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Messages processed at once by the batch driver.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            base_confidence: default_base_confidence(),
            extracted_confidence: default_extracted_confidence(),
            validation_bonus: default_validation_bonus(),
            default_confidence: default_default_confidence(),
            request_timeout_secs: None,
            max_tokens: None,
            concurrency: default_concurrency(),
        }
    }
}

impl WorkflowConfig {
    /// The per-call deadline, if configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

// Default value functions for serde

fn default_reasoning_model() -> String {
    "ollama/qwen3:4b".to_owned()
}
fn default_embedding_model() -> String {
    "all-minilm".to_owned()
}
fn default_embedding_dimensions() -> usize {
    384
}
fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_owned()
}
fn default_base_confidence() -> f64 {
    0.3
}
fn default_extracted_confidence() -> f64 {
    0.7
}
fn default_validation_bonus() -> f64 {
    0.15
}
fn default_default_confidence() -> f64 {
    0.5
}
fn default_concurrency() -> usize {
    4
}

/// Load the config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    Ok(config)
}

/// Load the config from `path`, falling back to defaults if it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file found, using defaults");
        return Ok(Config::default());
    }
    tracing::info!(path = %path.display(), "loading config from file");
    load_config(path)
}

/// Resolve the default config directory (`~/.mailvault/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".mailvault"))
}

/// Resolve the config file path: `$MAILVAULT_CONFIG`, else `~/.mailvault/config.toml`.
///
/// # Errors
///
/// Returns an error if neither source yields a path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    config_path_with(|key| std::env::var(key).ok())
}

/// Resolve the config path using a custom env resolver.
fn config_path_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(path) = env(CONFIG_ENV_VAR).filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join("config.toml"))
}
