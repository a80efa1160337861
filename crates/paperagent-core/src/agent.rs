//! The research agent loop.
//!
//! One `run` drives the full lifecycle: plan, a bounded number of
//! analyze/validate/dispatch iterations, then summarize. The loop never
//! aborts on tool failure; failed outcomes are folded into the context and
//! the planner sees them on the next iteration. Only planning errors and
//! internal invariant violations terminate a run early, and even then the
//! partial context is preserved in the outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::catalog::{ToolCatalog, ToolDescriptor};
use crate::context::{ResearchContext, RunStatus};
use crate::dispatcher::{dispatch, DispatchMetadata};
use crate::planner::{Planner, ResearchSummary, ToolCallProposal};
use crate::validator::{validate, Validation};
use crate::AgentError;

/// Knobs for a research run.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: u32,
    pub iteration_pause: Duration,
    /// Consecutive validation rejections tolerated before the run is cut
    /// short and summarized with whatever was gathered.
    pub max_consecutive_rejections: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            iteration_pause: Duration::from_secs(1),
            max_consecutive_rejections: 3,
        }
    }
}

impl AgentSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_iteration_pause(mut self, pause: Duration) -> Self {
        self.iteration_pause = pause;
        self
    }

    pub fn with_max_consecutive_rejections(mut self, limit: u32) -> Self {
        self.max_consecutive_rejections = limit;
        self
    }
}

/// A single research request.
#[derive(Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub query: String,
    pub user_id: String,
    pub document_id: Option<String>,
    /// Cooperative cancellation: when set, the loop stops before the next
    /// planner call or dispatch and proceeds to summarization.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            user_id: user_id.into(),
            document_id: None,
            cancel: None,
        }
    }

    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Final result of a run, successful or not. The full context is always
/// returned so callers can inspect partial progress after failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    pub papers_discovered: usize,
    pub analysis_count: usize,
    pub final_summary: Option<ResearchSummary>,
    pub error: Option<String>,
    pub context: ResearchContext,
}

/// The agent: a catalog of tools and a planner deciding how to use them.
pub struct ResearchAgent {
    catalog: ToolCatalog,
    planner: Arc<dyn Planner>,
    settings: AgentSettings,
}

impl ResearchAgent {
    pub fn new(catalog: ToolCatalog, planner: Arc<dyn Planner>) -> Self {
        Self {
            catalog,
            planner,
            settings: AgentSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Execute a full research run.
    #[instrument(skip(self, request), fields(run_id = %request.run_id, query = %request.query, user_id = %request.user_id))]
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        let mut context = ResearchContext::new(
            request.query.clone(),
            request.user_id.clone(),
            request.document_id.clone(),
        );

        match self.drive(&mut context, request.cancel.as_deref()).await {
            Ok(summary) => {
                info!(
                    papers = context.papers_discovered(),
                    iterations = context.iteration,
                    "research run completed"
                );
                RunOutcome {
                    success: true,
                    papers_discovered: context.papers_discovered(),
                    analysis_count: context.analysis_count(),
                    final_summary: Some(summary),
                    error: None,
                    context,
                }
            }
            Err(err) => {
                warn!(error = %err, "research run failed");
                context.record_failure(err.to_string());
                RunOutcome {
                    success: false,
                    papers_discovered: context.papers_discovered(),
                    analysis_count: context.analysis_count(),
                    final_summary: None,
                    error: Some(err.to_string()),
                    context,
                }
            }
        }
    }

    async fn drive(
        &self,
        context: &mut ResearchContext,
        cancel: Option<&AtomicBool>,
    ) -> Result<ResearchSummary, AgentError> {
        let cancelled = || cancel.is_some_and(|flag| flag.load(Ordering::Relaxed));

        let plan_outcome = self.planner.plan(&context.query).await?;
        if !plan_outcome.success {
            warn!("using fallback research plan");
        }
        context.plan = Some(plan_outcome.plan);
        context.advance(RunStatus::PlanningComplete)?;

        let descriptors: Vec<ToolDescriptor> =
            self.catalog.descriptors().cloned().collect();
        let mut consecutive_rejections = 0u32;

        for iteration in 0..self.settings.max_iterations {
            if cancelled() {
                info!(iteration, "run cancelled, moving to summary");
                break;
            }

            context.advance(RunStatus::Iteration(iteration))?;
            context.iteration = iteration;

            let proposal = self.planner.next_action(context, &descriptors).await;
            match proposal {
                ToolCallProposal::Complete { reason, error } => {
                    if error {
                        warn!(iteration, reason = %reason, "planner terminated with error");
                    } else {
                        info!(iteration, reason = %reason, "planner declared research complete");
                    }
                    break;
                }
                ToolCallProposal::UseTool {
                    tool_name,
                    tool_args,
                    reason,
                } => {
                    info!(iteration, tool = %tool_name, reason = %reason, "planner proposed tool");

                    match validate(&self.catalog, &tool_name, &tool_args) {
                        Validation::Valid { validated_args } => {
                            consecutive_rejections = 0;
                            if cancelled() {
                                info!(iteration, "run cancelled before dispatch");
                                break;
                            }
                            let outcome = dispatch(
                                &self.catalog,
                                &tool_name,
                                validated_args,
                                DispatchMetadata::first_attempt(),
                            )
                            .await;
                            context.absorb(&outcome);
                        }
                        Validation::Invalid {
                            reason,
                            available_tools,
                        } => {
                            consecutive_rejections += 1;
                            warn!(
                                iteration,
                                tool = %tool_name,
                                reason = %reason,
                                available = ?available_tools,
                                rejections = consecutive_rejections,
                                "proposed tool call rejected"
                            );
                            if consecutive_rejections >= self.settings.max_consecutive_rejections {
                                warn!("too many consecutive rejections, moving to summary");
                                break;
                            }
                        }
                    }
                }
            }

            if !self.settings.iteration_pause.is_zero() {
                tokio::time::sleep(self.settings.iteration_pause).await;
            }
        }

        context.advance(RunStatus::Summarizing)?;
        let summary = self.planner.summarize(context).await;
        context.summary = Some(summary.clone());
        context.advance(RunStatus::Completed)?;

        Ok(summary)
    }
}
