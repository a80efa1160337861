//! End-to-end agent loop behavior with scripted planners and stub tools.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use paperagent_core::{
    AgentError, AgentSettings, PlanOutcome, Planner, ResearchAgent, ResearchContext, ResearchPlan,
    ResearchSummary, RunRequest, RunStatus, SummaryStats, ToolArgs, ToolCallProposal, ToolCatalog,
    ToolDescriptor, ToolError, ToolHandler,
};
use serde_json::{json, Value};

/// Planner that emits a fixed proposal every iteration.
struct FixedPlanner {
    proposal: ToolCallProposal,
}

#[async_trait]
impl Planner for FixedPlanner {
    async fn plan(&self, query: &str) -> Result<PlanOutcome, AgentError> {
        Ok(PlanOutcome {
            success: true,
            plan: ResearchPlan::fallback(query),
        })
    }

    async fn next_action(
        &self,
        _context: &ResearchContext,
        _tools: &[ToolDescriptor],
    ) -> ToolCallProposal {
        self.proposal.clone()
    }

    async fn summarize(&self, context: &ResearchContext) -> ResearchSummary {
        ResearchSummary {
            success: true,
            summary: format!("summary after {} tool calls", context.tool_results.len()),
            stats: SummaryStats {
                papers_analyzed: context.tool_results.len(),
                iterations_completed: context.iteration,
                tools_used: context.distinct_tools_used(),
            },
        }
    }
}

struct CountingSearchTool {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ToolHandler for CountingSearchTool {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(json!({
            "papers": [
                {"paper_id": "2301.00001", "title": query, "is_downloaded": false},
                {"paper_id": "2301.00002", "title": query, "is_downloaded": true},
            ]
        }))
    }
}

struct AlwaysFailingTool;

#[async_trait]
impl ToolHandler for AlwaysFailingTool {
    async fn call(&self, _args: ToolArgs) -> Result<Value, ToolError> {
        Err(ToolError::Network("upstream unreachable".to_string()))
    }
}

fn search_proposal() -> ToolCallProposal {
    ToolCallProposal::UseTool {
        tool_name: "arxiv_search_papers".to_string(),
        tool_args: {
            let mut args = ToolArgs::new();
            args.insert("query".into(), json!("sparse attention"));
            args
        },
        reason: "gather candidate papers".to_string(),
    }
}

fn fast_settings() -> AgentSettings {
    AgentSettings::new().with_iteration_pause(Duration::ZERO)
}

#[tokio::test]
async fn immediate_completion_produces_summary_without_tool_calls() {
    let planner = FixedPlanner {
        proposal: ToolCallProposal::Complete {
            reason: "query already well understood".to_string(),
            error: false,
        },
    };
    let agent = ResearchAgent::new(ToolCatalog::new(), Arc::new(planner))
        .with_settings(fast_settings());

    let outcome = agent.run(RunRequest::new("q", "user-1")).await;

    assert!(outcome.success);
    assert_eq!(outcome.context.iteration, 0);
    assert!(outcome.context.tool_results.is_empty());
    assert_eq!(outcome.context.status, RunStatus::Completed);
    assert!(outcome.final_summary.is_some());
    assert!(outcome.context.plan.is_some());
}

#[tokio::test]
async fn iteration_cap_bounds_the_number_of_dispatches() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut catalog = ToolCatalog::new();
    catalog.register(
        ToolDescriptor::new("arxiv_search_papers", "search").with_required(&["query"]),
        Arc::new(CountingSearchTool {
            calls: calls.clone(),
        }),
    );

    let planner = FixedPlanner {
        proposal: search_proposal(),
    };
    let agent = ResearchAgent::new(catalog, Arc::new(planner))
        .with_settings(fast_settings().with_max_iterations(10));

    let outcome = agent.run(RunRequest::new("sparse attention", "user-1")).await;

    assert!(outcome.success);
    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert_eq!(outcome.context.tool_results.len(), 10);
    // Two papers per search, one of them already downloaded.
    assert_eq!(outcome.papers_discovered, 20);
    assert_eq!(outcome.context.papers_already_downloaded, 10);
    assert_eq!(outcome.context.iteration, 9);
    assert_eq!(outcome.context.status, RunStatus::Completed);
}

#[tokio::test]
async fn consecutive_rejections_cut_the_run_short() {
    let planner = FixedPlanner {
        proposal: ToolCallProposal::UseTool {
            tool_name: "no_such_tool".to_string(),
            tool_args: ToolArgs::new(),
            reason: "hallucinated".to_string(),
        },
    };
    let agent = ResearchAgent::new(ToolCatalog::new(), Arc::new(planner)).with_settings(
        fast_settings()
            .with_max_iterations(10)
            .with_max_consecutive_rejections(3),
    );

    let outcome = agent.run(RunRequest::new("q", "user-1")).await;

    assert!(outcome.success);
    // Rejections never dispatch, so nothing lands in tool_results.
    assert!(outcome.context.tool_results.is_empty());
    assert_eq!(outcome.context.iteration, 2);
    assert_eq!(outcome.context.status, RunStatus::Completed);
    assert!(outcome.final_summary.is_some());
}

#[tokio::test]
async fn tool_failures_are_absorbed_and_the_run_continues() {
    let mut catalog = ToolCatalog::new();
    catalog.register(
        ToolDescriptor::new("arxiv_search_papers", "search").with_required(&["query"]),
        Arc::new(AlwaysFailingTool),
    );

    let planner = FixedPlanner {
        proposal: search_proposal(),
    };
    let agent = ResearchAgent::new(catalog, Arc::new(planner))
        .with_settings(fast_settings().with_max_iterations(4));

    let outcome = agent.run(RunRequest::new("q", "user-1")).await;

    assert!(outcome.success);
    assert_eq!(outcome.context.tool_results.len(), 4);
    for entry in &outcome.context.tool_results {
        let (kind, message) = entry.result.error().expect("failure envelope");
        assert_eq!(kind, "network");
        assert!(message.contains("unreachable"));
    }
    assert!(outcome.context.discovered_papers.is_empty());
    assert_eq!(outcome.context.status, RunStatus::Completed);
}

#[tokio::test]
async fn cancellation_moves_straight_to_summary() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut catalog = ToolCatalog::new();
    catalog.register(
        ToolDescriptor::new("arxiv_search_papers", "search").with_required(&["query"]),
        Arc::new(CountingSearchTool {
            calls: calls.clone(),
        }),
    );

    let cancel = Arc::new(AtomicBool::new(true));
    let planner = FixedPlanner {
        proposal: search_proposal(),
    };
    let agent = ResearchAgent::new(catalog, Arc::new(planner)).with_settings(fast_settings());

    let outcome = agent
        .run(RunRequest::new("q", "user-1").with_cancel(cancel))
        .await;

    assert!(outcome.success);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(outcome.context.tool_results.is_empty());
    assert_eq!(outcome.context.status, RunStatus::Completed);
    assert!(outcome.final_summary.is_some());
}

#[tokio::test]
async fn planner_error_complete_still_summarizes() {
    let planner = FixedPlanner {
        proposal: ToolCallProposal::Complete {
            reason: "Analysis failed: model unavailable".to_string(),
            error: true,
        },
    };
    let agent =
        ResearchAgent::new(ToolCatalog::new(), Arc::new(planner)).with_settings(fast_settings());

    let outcome = agent.run(RunRequest::new("q", "user-1")).await;

    // An error-flagged completion terminates the loop but the run still
    // summarizes whatever was gathered.
    assert!(outcome.success);
    assert!(outcome.final_summary.is_some());
    assert_eq!(outcome.context.status, RunStatus::Completed);
}
