//! Core abstractions for the paperagent research loop.
//!
//! This crate provides the agent loop, planner seam, tool catalog, and the
//! validation/dispatch machinery that connects them. Concrete tools live in
//! `paperagent-tools`; this crate only knows the [`catalog::ToolHandler`]
//! contract.

mod agent;
mod catalog;
mod config;
mod context;
mod dispatcher;
mod error;
mod llm;
mod planner;
mod runlog;
mod security;
mod validator;

pub use agent::{AgentSettings, ResearchAgent, RunOutcome, RunRequest};
pub use catalog::{ToolArgs, ToolCatalog, ToolDescriptor, ToolHandler};
pub use config::{AgentConfig, ArxivConfig, Config, ConfigLoader, LlmConfig, LoggingConfig};
pub use context::{ExtractedContent, ResearchContext, RunStatus, ToolInvocation};
pub use dispatcher::{blocking, dispatch, DispatchMetadata, ToolOutcome};
pub use error::{AgentError, ToolError};
pub use llm::{ChatCompletion, ChatRequest, OpenAiChatClient};
pub use planner::{
    LlmPlanner, PlanOutcome, Planner, ResearchPlan, ResearchSummary, SummaryStats,
    ToolCallProposal,
};
pub use runlog::log_run_completion;
pub use security::{require_env, SecretValue};
pub use validator::{validate, Validation};
