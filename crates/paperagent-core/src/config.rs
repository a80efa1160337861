use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{require_env, AgentError, SecretValue};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "PAPERAGENT_CONFIG";

/// Top-level configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the configured LLM secret value (from environment only).
    pub fn llm_api_key(&self) -> Result<SecretValue, AgentError> {
        require_env(&self.llm.api_key_env)
    }
}

/// Helper to load configuration with guard rails around secret handling.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `PAPERAGENT_CONFIG` environment variable.
    /// 3. `config.toml` in the current working directory.
    pub fn load(path: Option<PathBuf>) -> Result<Config, AgentError> {
        let candidate = resolve_path(path);
        let raw = fs::read_to_string(&candidate)
            .map_err(|err| AgentError::config_io(candidate.clone(), err))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|err| AgentError::InvalidConfiguration(err.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), AgentError> {
        if config.llm.api_key_env.trim().is_empty() {
            return Err(AgentError::InvalidConfiguration(
                "llm.api_key_env must reference an environment variable".into(),
            ));
        }

        // Ensure environment variable exists at load time to discourage inline secrets.
        require_env(&config.llm.api_key_env)?;

        if config.agent.max_iterations == 0 {
            return Err(AgentError::InvalidConfiguration(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if config.arxiv.max_results == 0 || config.arxiv.max_results > 1000 {
            return Err(AgentError::InvalidConfiguration(
                "arxiv.max_results must be between 1 and 1000".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = path {
        return path;
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return PathBuf::from(from_env);
        }
    }

    Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    #[serde(default = "LlmConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key_env: String,
}

impl LlmConfig {
    fn default_endpoint() -> String {
        "https://api.openai.com".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "AgentConfig::default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "AgentConfig::default_iteration_pause_ms")]
    pub iteration_pause_ms: u64,
    #[serde(default = "AgentConfig::default_max_consecutive_rejections")]
    pub max_consecutive_rejections: u32,
}

impl AgentConfig {
    const fn default_max_iterations() -> u32 {
        10
    }

    const fn default_iteration_pause_ms() -> u64 {
        1_000
    }

    const fn default_max_consecutive_rejections() -> u32 {
        3
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: Self::default_max_iterations(),
            iteration_pause_ms: Self::default_iteration_pause_ms(),
            max_consecutive_rejections: Self::default_max_consecutive_rejections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "ArxivConfig::default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default = "ArxivConfig::default_max_results")]
    pub max_results: u32,
    #[serde(default = "ArxivConfig::default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl ArxivConfig {
    fn default_storage_path() -> PathBuf {
        PathBuf::from("./arxiv_papers")
    }

    const fn default_max_results() -> u32 {
        100
    }

    const fn default_download_timeout_secs() -> u64 {
        300
    }
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            storage_path: Self::default_storage_path(),
            max_results: Self::default_max_results(),
            download_timeout_secs: Self::default_download_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}
