use std::path::PathBuf;

use thiserror::Error;

/// Core error type for paperagent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("planner failure: {0}")]
    Planner(String),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }
}

/// Error raised by tool handlers. The dispatcher folds these into failure
/// envelopes; they never escape a dispatch call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("parse failure: {0}")]
    Parse(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    /// Stable machine-readable kind carried in failure envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidInput(_) => "invalid_input",
            ToolError::Network(_) => "network",
            ToolError::Io(_) => "io",
            ToolError::NotFound(_) => "not_found",
            ToolError::Parse(_) => "parse",
            ToolError::Panicked(_) => "panic",
            ToolError::Internal(_) => "internal",
        }
    }
}
