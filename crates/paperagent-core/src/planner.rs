//! Planner interface and the LLM-backed implementation.
//!
//! The planner owns the three reasoning calls a run makes: an upfront plan,
//! a per-iteration next-action decision, and a final summary. `next_action`
//! and `summarize` are deliberately infallible; any reasoning failure is
//! converted into a terminating proposal or a fallback summary so the agent
//! loop never has to handle a planner error mid-run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::catalog::{ToolArgs, ToolDescriptor};
use crate::context::ResearchContext;
use crate::llm::{ChatCompletion, ChatRequest};
use crate::AgentError;

/// Research strategy produced before the iteration loop starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub key_concepts: Vec<String>,
    pub search_terms: Vec<String>,
    pub strategy: String,
    /// Free-form remainder of the model's plan, kept for the summary prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ResearchPlan {
    /// Degenerate plan used when planning fails: search for the query as-is.
    pub fn fallback(query: &str) -> Self {
        Self {
            key_concepts: vec![query.to_string()],
            search_terms: vec![query.to_string()],
            strategy: "basic_search".to_string(),
            detail: None,
        }
    }
}

/// Result of the planning call, recording whether the model plan or the
/// fallback was used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub success: bool,
    pub plan: ResearchPlan,
}

/// What the planner wants the loop to do next.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToolCallProposal {
    Complete {
        reason: String,
        #[serde(default)]
        error: bool,
    },
    UseTool {
        tool_name: String,
        #[serde(default)]
        tool_args: ToolArgs,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStats {
    pub papers_analyzed: usize,
    pub iterations_completed: u32,
    pub tools_used: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSummary {
    pub success: bool,
    pub summary: String,
    pub stats: SummaryStats,
}

/// Reasoning seam between the agent loop and whatever model drives it.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce the upfront research plan for `query`.
    async fn plan(&self, query: &str) -> Result<PlanOutcome, AgentError>;

    /// Decide the next action given the accumulated context and the tools
    /// currently in the catalog. Never fails: reasoning errors surface as a
    /// `Complete` proposal with `error` set.
    async fn next_action(
        &self,
        context: &ResearchContext,
        tools: &[ToolDescriptor],
    ) -> ToolCallProposal;

    /// Summarize the run. Never fails: a reasoning error yields a fallback
    /// summary with `success: false`.
    async fn summarize(&self, context: &ResearchContext) -> ResearchSummary;
}

/// Planner backed by a chat-completion model.
pub struct LlmPlanner<C> {
    client: C,
}

impl<C: ChatCompletion> LlmPlanner<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    async fn request_plan(&self, query: &str) -> Result<ResearchPlan, AgentError> {
        let system = "You are a research planning assistant. Given a research query, \
            create a comprehensive research plan.\n\n\
            Your plan should include:\n\
            1. Key concepts to explore\n\
            2. Potential search terms for academic papers\n\
            3. Expected types of papers to find (theoretical, empirical, review, etc.)\n\
            4. Citation analysis strategy\n\
            5. Validation approach for ideas\n\n\
            Respond with a JSON object containing at minimum the keys \
            \"key_concepts\" (array of strings), \"search_terms\" (array of strings) \
            and \"strategy\" (string)."
            .to_string();

        let user = format!(
            "Research Query: {query}\n\n\
             Create a detailed research plan for this query. Focus on academic \
             paper discovery and analysis."
        );

        let raw = self
            .client
            .complete(ChatRequest {
                system,
                user,
                json_output: true,
                temperature: 0.1,
                max_tokens: 1500,
            })
            .await?;

        parse_plan(&raw)
            .ok_or_else(|| AgentError::Planner(format!("unparseable plan response: {raw}")))
    }

    async fn request_next_action(
        &self,
        context: &ResearchContext,
        tools: &[ToolDescriptor],
    ) -> Result<ToolCallProposal, AgentError> {
        let tool_names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        let contracts = tools
            .iter()
            .map(describe_contract)
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are a research agent analyzer. Based on the current research \
             context and available tools, decide the next best action.\n\n\
             Available tools: {}\n\n\
             Your response must be a JSON object with either:\n\
             1. {{\"action\": \"complete\", \"reason\": \"why research is complete\"}}\n\
             2. {{\"action\": \"use_tool\", \"tool_name\": \"tool_name\", \
             \"tool_args\": {{\"arg\": \"value\"}}, \"reason\": \"why this tool\"}}\n\n\
             Tool argument contracts:\n{}\n\n\
             Consider:\n\
             - What information is missing\n\
             - Which tools would provide the most value\n\
             - Whether enough research has been conducted\n\
             - Quality and relevance of current findings\n\
             - Ensure you provide all required arguments for chosen tools",
            tool_names.join(", "),
            contracts,
        );

        let context_json = serde_json::to_string_pretty(context)
            .map_err(|err| AgentError::Planner(format!("context serialization failed: {err}")))?;

        let user = format!(
            "Current Research Context:\n{context_json}\n\n\
             Based on this context, what should be the next action?\n\n\
             If recommending a tool, provide specific tool arguments. Use the \
             ACTUAL research query \"{}\" from the context above in your search \
             terms, not generic examples.",
            context.query,
        );

        let raw = self
            .client
            .complete(ChatRequest {
                system,
                user,
                json_output: true,
                temperature: 0.1,
                max_tokens: 800,
            })
            .await?;

        serde_json::from_str(&raw)
            .map_err(|err| AgentError::Planner(format!("unparseable action response: {err}")))
    }

    async fn request_summary(&self, context: &ResearchContext) -> Result<String, AgentError> {
        let system = "You are a research summarizer. Create a comprehensive summary \
            of the research conducted.\n\n\
            Your summary should include:\n\
            1. Research question and approach\n\
            2. Key papers discovered and their relevance\n\
            3. Important findings and insights\n\
            4. Citation networks and relationships\n\
            5. Gaps or limitations in current research\n\
            6. Recommendations for further investigation\n\n\
            Provide a well-structured, academic-style summary."
            .to_string();

        let context_json = serde_json::to_string_pretty(context)
            .map_err(|err| AgentError::Planner(format!("context serialization failed: {err}")))?;

        let user = format!(
            "Research Context:\n{context_json}\n\n\
             Generate a comprehensive research summary based on all the work conducted."
        );

        self.client
            .complete(ChatRequest {
                system,
                user,
                json_output: false,
                temperature: 0.2,
                max_tokens: 2000,
            })
            .await
    }
}

#[async_trait]
impl<C: ChatCompletion> Planner for LlmPlanner<C> {
    async fn plan(&self, query: &str) -> Result<PlanOutcome, AgentError> {
        info!(query = %query, "planning research");
        match self.request_plan(query).await {
            Ok(plan) => Ok(PlanOutcome {
                success: true,
                plan,
            }),
            Err(err) => {
                warn!(error = %err, "planning failed, using fallback plan");
                Ok(PlanOutcome {
                    success: false,
                    plan: ResearchPlan::fallback(query),
                })
            }
        }
    }

    async fn next_action(
        &self,
        context: &ResearchContext,
        tools: &[ToolDescriptor],
    ) -> ToolCallProposal {
        match self.request_next_action(context, tools).await {
            Ok(proposal) => proposal,
            Err(err) => {
                warn!(error = %err, "next-action analysis failed");
                ToolCallProposal::Complete {
                    reason: format!("Analysis failed: {err}"),
                    error: true,
                }
            }
        }
    }

    async fn summarize(&self, context: &ResearchContext) -> ResearchSummary {
        let stats = SummaryStats {
            papers_analyzed: context.tool_results.len(),
            iterations_completed: context.iteration,
            tools_used: context.distinct_tools_used(),
        };
        match self.request_summary(context).await {
            Ok(summary) => ResearchSummary {
                success: true,
                summary,
                stats,
            },
            Err(err) => {
                warn!(error = %err, "summary generation failed");
                ResearchSummary {
                    success: false,
                    summary: "Research summary could not be generated due to technical issues."
                        .to_string(),
                    stats,
                }
            }
        }
    }
}

fn describe_contract(descriptor: &ToolDescriptor) -> String {
    let mut parts = Vec::new();
    if !descriptor.required_args.is_empty() {
        parts.push(format!("requires {}", descriptor.required_args.join(", ")));
    }
    for group in &descriptor.any_of {
        parts.push(format!("requires one of {}", group.join(" | ")));
    }
    if !descriptor.optional_args.is_empty() {
        parts.push(format!("optional {}", descriptor.optional_args.join(", ")));
    }
    if parts.is_empty() {
        parts.push("no arguments".to_string());
    }
    format!("- {}: {}", descriptor.name, parts.join("; "))
}

/// Tolerant plan extraction: key_concepts/search_terms/strategy when present,
/// with the full object kept as detail.
fn parse_plan(raw: &str) -> Option<ResearchPlan> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;

    let string_list = |key: &str| -> Vec<String> {
        object
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    Some(ResearchPlan {
        key_concepts: string_list("key_concepts"),
        search_terms: string_list("search_terms"),
        strategy: object
            .get("strategy")
            .and_then(Value::as_str)
            .unwrap_or("llm_plan")
            .to_string(),
        detail: Some(value.clone()),
    })
}
