use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::jobs::{JobOptions, DEFAULT_MAX_WORKERS, DEFAULT_STALE_AFTER};
use crate::models::ollama::DEFAULT_BASE_URL;
use crate::models::{DEFAULT_PULL_ATTEMPTS, DEFAULT_PULL_INTERVAL};

pub const DEFAULT_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;

pub const ENV_OLLAMA_URL: &str = "VSUM_OLLAMA_URL";
pub const ENV_MODEL: &str = "VSUM_MODEL";

/// `[ollama]` block from config.toml.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct OllamaConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// `[jobs]` block from config.toml.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct JobsConfig {
    pub poll_interval_ms: Option<u64>,
    pub max_workers: Option<usize>,
    pub stale_after_secs: Option<u64>,
}

/// `[models]` block from config.toml.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ModelsConfig {
    pub pull_attempts: Option<u32>,
    pub pull_interval_secs: Option<u64>,
}

/// Top-level vsum config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct VsumConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

impl VsumConfig {
    /// Load config from `path`, or ~/.vsum/config.toml. Returns default if the
    /// file doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        if !path.exists() {
            return Ok(VsumConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Ollama base URL: CLI flag > VSUM_OLLAMA_URL > config > default.
    pub fn ollama_url(&self, cli_flag: Option<&str>) -> String {
        resolve_setting(
            cli_flag,
            ENV_OLLAMA_URL,
            self.ollama.base_url.as_deref(),
            DEFAULT_BASE_URL,
        )
    }

    /// Default model: CLI flag > VSUM_MODEL > config > default.
    pub fn model(&self, cli_flag: Option<&str>) -> String {
        resolve_setting(cli_flag, ENV_MODEL, self.ollama.model.as_deref(), DEFAULT_MODEL)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.jobs.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Worker pool size and liveness bound for the job controller.
    pub fn job_options(&self) -> JobOptions {
        let defaults = JobOptions::default();
        JobOptions {
            max_workers: self.jobs.max_workers.unwrap_or(DEFAULT_MAX_WORKERS).max(1),
            // Several heartbeats must fit in the bound or live jobs get reaped.
            stale_after: self
                .jobs
                .stale_after_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_STALE_AFTER)
                .max(defaults.heartbeat_interval * 3),
            ..defaults
        }
    }

    pub fn pull_attempts(&self) -> u32 {
        self.models.pull_attempts.unwrap_or(DEFAULT_PULL_ATTEMPTS)
    }

    pub fn pull_interval(&self) -> Duration {
        self.models
            .pull_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PULL_INTERVAL)
    }

    /// Effective settings, one `key = value` per line, grouped like the file.
    pub fn display_effective(&self) -> String {
        [
            "[ollama]".to_string(),
            format!("  base_url = \"{}\"", self.ollama_url(None)),
            format!("  model = \"{}\"", self.model(None)),
            "[jobs]".to_string(),
            format!("  poll_interval_ms = {}", self.poll_interval().as_millis()),
            format!("  max_workers = {}", self.job_options().max_workers),
            format!("  stale_after_secs = {}", self.job_options().stale_after.as_secs()),
            "[models]".to_string(),
            format!("  pull_attempts = {}", self.pull_attempts()),
            format!("  pull_interval_secs = {}", self.pull_interval().as_secs()),
        ]
        .join("\n")
    }
}

/// Resolve a setting through the chain: CLI flag > env var > config value > default.
pub fn resolve_setting(
    cli_flag: Option<&str>,
    env_var_name: &str,
    config_value: Option<&str>,
    default: &str,
) -> String {
    // 1. CLI flag
    if let Some(value) = cli_flag.filter(|v| !v.is_empty()) {
        return value.to_string();
    }

    // 2. Environment variable
    if let Ok(value) = std::env::var(env_var_name) {
        if !value.is_empty() {
            return value;
        }
    }

    // 3. Config file
    if let Some(value) = config_value.filter(|v| !v.is_empty()) {
        return value.to_string();
    }

    default.to_string()
}

/// Path to the config file: ~/.vsum/config.toml
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".vsum").join("config.toml"))
}

/// Default config template content.
pub fn default_config_template() -> &'static str {
    r#"# ~/.vsum/config.toml
# Resolution order: CLI flag > env var > this file > built-in default

[ollama]
# base_url = "http://localhost:11434"   # env: VSUM_OLLAMA_URL
# model = "llama3.2:3b"                 # env: VSUM_MODEL

[jobs]
# poll_interval_ms = 1500
# max_workers = 2          # summaries generated at once
# stale_after_secs = 30    # unfinished jobs without a heartbeat this long are failed

[models]
# pull_attempts = 30
# pull_interval_secs = 1
"#
}

/// Create the config file at `path` (or the default location) if it doesn't
/// already exist. Returns the path and whether it was written.
pub fn init_config(path: Option<&Path>) -> Result<(PathBuf, bool)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if path.exists() {
        return Ok((path, false));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, default_config_template())?;
    Ok((path, true))
}
