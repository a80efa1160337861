//! Research context: the accumulating state threaded through a single run.
//!
//! The context has a single owner (the agent loop) and is never mutated
//! concurrently. All accumulators are append-only; `citation_network` is the
//! one overwrite-on-arrival slot, matching the merge rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::dispatcher::ToolOutcome;
use crate::planner::{ResearchPlan, ResearchSummary};
use crate::AgentError;

/// Lifecycle status of a research run. Transitions are monotonic; `Failed`
/// is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RunStatus {
    Initializing,
    PlanningComplete,
    Iteration(u32),
    Summarizing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    fn rank(self) -> (u8, u32) {
        match self {
            RunStatus::Initializing => (0, 0),
            RunStatus::PlanningComplete => (1, 0),
            RunStatus::Iteration(i) => (2, i),
            RunStatus::Summarizing => (3, 0),
            RunStatus::Completed => (4, 0),
            RunStatus::Failed => (4, 0),
        }
    }

    pub fn can_advance_to(self, next: RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == RunStatus::Failed {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Initializing => write!(f, "initializing"),
            RunStatus::PlanningComplete => write!(f, "planning_complete"),
            RunStatus::Iteration(i) => write!(f, "iteration_{i}"),
            RunStatus::Summarizing => write!(f, "summarizing"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for RunStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "initializing" => Ok(RunStatus::Initializing),
            "planning_complete" => Ok(RunStatus::PlanningComplete),
            "summarizing" => Ok(RunStatus::Summarizing),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => other
                .strip_prefix("iteration_")
                .and_then(|n| n.parse::<u32>().ok())
                .map(RunStatus::Iteration)
                .ok_or_else(|| format!("unknown run status '{other}'")),
        }
    }
}

/// One entry in the run's full invocation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub result: ToolOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Extraction bookkeeping for a paper whose content was read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub paper_id: String,
    pub sections_found: usize,
}

/// Mutable accumulator for a single research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchContext {
    pub query: String,
    pub user_id: String,
    pub document_id: Option<String>,
    pub iteration: u32,
    pub status: RunStatus,
    pub plan: Option<ResearchPlan>,
    pub tool_results: Vec<ToolInvocation>,
    pub discovered_papers: Vec<Value>,
    pub downloaded_papers: Vec<String>,
    pub read_papers: Vec<String>,
    pub citations: Vec<Value>,
    pub citation_network: Option<Value>,
    pub similar_papers: Vec<Value>,
    pub similarity_scores: Vec<Value>,
    pub extracted_content: Vec<ExtractedContent>,
    pub analysis_results: Vec<Value>,
    pub papers_already_downloaded: u32,
    pub error: Option<String>,
    pub summary: Option<ResearchSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolCategory {
    PaperSearch,
    PaperDownload,
    PaperRead,
    CitationAnalysis,
    PdfProcessing,
    Similarity,
    Other,
}

fn categorize(tool_name: &str) -> ToolCategory {
    match tool_name {
        "arxiv_search_papers" | "arxiv_search" => ToolCategory::PaperSearch,
        "arxiv_download_paper" => ToolCategory::PaperDownload,
        "arxiv_read_paper" => ToolCategory::PaperRead,
        "extract_citations" | "analyze_citation_network" => ToolCategory::CitationAnalysis,
        "process_pdf" | "extract_sections" => ToolCategory::PdfProcessing,
        "find_similar_papers" | "calculate_similarity" => ToolCategory::Similarity,
        _ => ToolCategory::Other,
    }
}

impl ResearchContext {
    pub fn new(
        query: impl Into<String>,
        user_id: impl Into<String>,
        document_id: Option<String>,
    ) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            document_id,
            iteration: 0,
            status: RunStatus::Initializing,
            plan: None,
            tool_results: Vec::new(),
            discovered_papers: Vec::new(),
            downloaded_papers: Vec::new(),
            read_papers: Vec::new(),
            citations: Vec::new(),
            citation_network: None,
            similar_papers: Vec::new(),
            similarity_scores: Vec::new(),
            extracted_content: Vec::new(),
            analysis_results: Vec::new(),
            papers_already_downloaded: 0,
            error: None,
            summary: None,
        }
    }

    /// Advance the status, enforcing monotonic transitions.
    pub fn advance(&mut self, next: RunStatus) -> Result<(), AgentError> {
        if !self.status.can_advance_to(next) {
            return Err(AgentError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.status, to = %next, "run status transition");
        self.status = next;
        Ok(())
    }

    /// Fold a tool outcome into the context using the per-category merge
    /// rules. Every invocation, failed or not, is appended to `tool_results`.
    pub fn absorb(&mut self, outcome: &ToolOutcome) {
        let tool_name = outcome.tool_name().to_string();
        match categorize(&tool_name) {
            ToolCategory::PaperSearch => {
                if let Some(papers) = field(outcome, "papers").and_then(Value::as_array) {
                    self.papers_already_downloaded += papers
                        .iter()
                        .filter(|paper| {
                            paper
                                .get("is_downloaded")
                                .and_then(Value::as_bool)
                                .unwrap_or(false)
                        })
                        .count() as u32;
                    self.discovered_papers.extend(papers.iter().cloned());
                }
            }
            ToolCategory::PaperDownload => {
                if outcome.succeeded() {
                    if let Some(paper_id) = field(outcome, "paper_id").and_then(Value::as_str) {
                        self.downloaded_papers.push(paper_id.to_string());
                    }
                }
            }
            ToolCategory::PaperRead => {
                if outcome.succeeded() {
                    if let Some(paper_id) = field(outcome, "paper_id").and_then(Value::as_str) {
                        self.read_papers.push(paper_id.to_string());
                        if let Some(content) = field(outcome, "content") {
                            let sections_found = content
                                .get("sections")
                                .and_then(Value::as_object)
                                .map(|sections| sections.len())
                                .unwrap_or(0);
                            self.extracted_content.push(ExtractedContent {
                                paper_id: paper_id.to_string(),
                                sections_found,
                            });
                        }
                    }
                }
            }
            ToolCategory::CitationAnalysis => {
                if let Some(citations) = field(outcome, "citations").and_then(Value::as_array) {
                    self.citations.extend(citations.iter().cloned());
                }
                if let Some(network) = field(outcome, "network") {
                    self.citation_network = Some(network.clone());
                }
            }
            ToolCategory::PdfProcessing => {
                if let Some(content) = field(outcome, "content") {
                    self.analysis_results.push(content.clone());
                }
            }
            ToolCategory::Similarity => {
                if let Some(similar) = field(outcome, "similar_papers").and_then(Value::as_array) {
                    self.similar_papers.extend(similar.iter().cloned());
                }
                if let Some(similarity) = field(outcome, "similarity") {
                    self.similarity_scores.push(similarity.clone());
                }
            }
            ToolCategory::Other => {}
        }

        self.tool_results.push(ToolInvocation {
            tool: tool_name,
            result: outcome.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Mark the run failed with a diagnostic message.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        // Failed is reachable from any non-terminal state.
        let _ = self.advance(RunStatus::Failed);
    }

    pub fn papers_discovered(&self) -> usize {
        self.discovered_papers.len()
    }

    pub fn analysis_count(&self) -> usize {
        self.analysis_results.len()
    }

    /// Number of distinct tools invoked across the run.
    pub fn distinct_tools_used(&self) -> usize {
        let mut names: Vec<&str> = self
            .tool_results
            .iter()
            .map(|entry| entry.tool.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }
}

fn field<'a>(outcome: &'a ToolOutcome, key: &str) -> Option<&'a Value> {
    outcome.value().and_then(|value| value.get(key))
}
