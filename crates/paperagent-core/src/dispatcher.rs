//! Uniform tool dispatch.
//!
//! `dispatch` never propagates handler failures to its caller: every outcome
//! is folded into a [`ToolOutcome`] envelope. Blocking handlers are wrapped by
//! [`blocking`] so they run on the blocking pool instead of stalling the agent
//! loop's scheduling.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{ToolArgs, ToolCatalog, ToolHandler};
use crate::ToolError;

/// Scheduling metadata supplied by the external execution collaborator.
/// Consumed and echoed into the envelope, never computed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchMetadata {
    pub attempt: u32,
    pub scheduled_at: DateTime<Utc>,
}

impl DispatchMetadata {
    pub fn first_attempt() -> Self {
        Self {
            attempt: 1,
            scheduled_at: Utc::now(),
        }
    }
}

impl Default for DispatchMetadata {
    fn default() -> Self {
        Self::first_attempt()
    }
}

/// Envelope returned by every tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success {
        tool_name: String,
        value: Value,
        metadata: DispatchMetadata,
    },
    Failure {
        tool_name: String,
        kind: String,
        message: String,
        metadata: DispatchMetadata,
    },
}

impl ToolOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    pub fn tool_name(&self) -> &str {
        match self {
            ToolOutcome::Success { tool_name, .. } => tool_name,
            ToolOutcome::Failure { tool_name, .. } => tool_name,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ToolOutcome::Success { value, .. } => Some(value),
            ToolOutcome::Failure { .. } => None,
        }
    }

    /// Failure kind and message, if this outcome is a failure.
    pub fn error(&self) -> Option<(&str, &str)> {
        match self {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { kind, message, .. } => Some((kind, message)),
        }
    }
}

struct BlockingTool {
    f: Arc<dyn Fn(ToolArgs) -> Result<Value, ToolError> + Send + Sync>,
}

#[async_trait]
impl ToolHandler for BlockingTool {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let f = self.f.clone();
        tokio::task::spawn_blocking(move || f(args))
            .await
            .map_err(|err| ToolError::Panicked(err.to_string()))?
    }
}

/// Adapt a blocking function into a [`ToolHandler`] that runs on the blocking
/// pool. Panics inside the function surface as failures of kind `panic`.
pub fn blocking<F>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolArgs) -> Result<Value, ToolError> + Send + Sync + 'static,
{
    Arc::new(BlockingTool { f: Arc::new(f) })
}

/// Resolve `tool_name` in the catalog and invoke it with `args`.
pub async fn dispatch(
    catalog: &ToolCatalog,
    tool_name: &str,
    args: ToolArgs,
    metadata: DispatchMetadata,
) -> ToolOutcome {
    let Some(handler) = catalog.handler(tool_name) else {
        warn!(tool = tool_name, "dispatch requested for unknown tool");
        return ToolOutcome::Failure {
            tool_name: tool_name.to_string(),
            kind: "not_found".to_string(),
            message: format!("tool '{tool_name}' is not registered in the catalog"),
            metadata,
        };
    };

    debug!(tool = tool_name, attempt = metadata.attempt, "dispatching tool");

    match handler.call(args).await {
        Ok(value) => {
            info!(tool = tool_name, "tool completed");
            ToolOutcome::Success {
                tool_name: tool_name.to_string(),
                value,
                metadata,
            }
        }
        Err(err) => {
            warn!(tool = tool_name, error = %err, "tool failed");
            ToolOutcome::Failure {
                tool_name: tool_name.to_string(),
                kind: err.kind().to_string(),
                message: err.to_string(),
                metadata,
            }
        }
    }
}
