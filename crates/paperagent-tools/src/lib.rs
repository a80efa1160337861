//! Concrete research tools for paperagent and the default catalog wiring
//! them together.
//!
//! Tools come in two flavors: async handlers holding shared clients (the
//! arXiv tools, the PDF processor) and pure functions over their arguments
//! (citations, sections, similarity) registered through
//! [`paperagent_core::blocking`].

mod arxiv;
mod citations;
mod pdf;
mod similarity;

pub use arxiv::{
    ArxivClient, DeepAnalysisTool, DownloadPaperTool, GetMetadataTool, ListPapersTool,
    PaperStore, ReadPaperTool, SearchPapersTool,
};
pub use citations::{analyze_citation_network, citations_from_text, extract_citations};
pub use pdf::{extract_sections, pdf_text_from_bytes, split_sections, PdfProcessor};
pub use similarity::{calculate_similarity, find_similar_papers, key_terms};

use std::sync::Arc;
use std::time::Duration;

use paperagent_core::{blocking, ArxivConfig, ToolCatalog, ToolDescriptor, ToolError};

/// Build the standard catalog of research tools against the given arXiv
/// configuration. Registration order is the order tools are presented to
/// the planner.
pub fn default_catalog(config: &ArxivConfig) -> Result<ToolCatalog, ToolError> {
    let store = Arc::new(PaperStore::open(config.storage_path.clone())?);
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.download_timeout_secs))
        .build()
        .map_err(|err| ToolError::Internal(format!("HTTP client construction failed: {err}")))?;
    let client = Arc::new(ArxivClient::new(http.clone()));

    let mut catalog = ToolCatalog::new();

    catalog.register(
        ToolDescriptor::new(
            "arxiv_search_papers",
            "Search for academic papers on arXiv by query, with optional \
             category and date filters",
        )
        .with_required(&["query"])
        .with_optional(&["max_results", "categories", "date_from", "date_to", "sort_by"])
        .with_returns("list of papers with metadata and download status"),
        Arc::new(SearchPapersTool::new(
            client.clone(),
            store.clone(),
            config.max_results,
        )),
    );

    catalog.register(
        ToolDescriptor::new(
            "arxiv_download_paper",
            "Download a paper PDF from arXiv to local storage",
        )
        .with_required(&["paper_id"])
        .with_optional(&["force_download"])
        .with_returns("download status, local path, and paper metadata"),
        Arc::new(DownloadPaperTool::new(client.clone(), store.clone())),
    );

    catalog.register(
        ToolDescriptor::new(
            "arxiv_list_papers",
            "List papers already downloaded to local storage",
        )
        .with_optional(&["category_filter", "limit"])
        .with_returns("list of locally stored papers"),
        Arc::new(ListPapersTool::new(store.clone())),
    );

    catalog.register(
        ToolDescriptor::new(
            "arxiv_read_paper",
            "Read the full text of a downloaded paper, optionally split into \
             sections",
        )
        .with_required(&["paper_id"])
        .with_optional(&["include_metadata", "extract_sections"])
        .with_returns("paper text content and optional sections"),
        Arc::new(ReadPaperTool::new(store.clone())),
    );

    catalog.register(
        ToolDescriptor::new(
            "arxiv_get_metadata",
            "Get detailed metadata for a paper, from local storage or the \
             arXiv API",
        )
        .with_required(&["paper_id"])
        .with_optional(&["include_citations", "force_refresh"])
        .with_returns("paper metadata with local storage information"),
        Arc::new(GetMetadataTool::new(client.clone(), store.clone())),
    );

    catalog.register(
        ToolDescriptor::new(
            "arxiv_deep_analysis",
            "Run a full local analysis of a downloaded paper: sections, \
             citations, and key terms",
        )
        .with_required(&["paper_id"])
        .with_returns("structured analysis of the paper content"),
        Arc::new(DeepAnalysisTool::new(store.clone())),
    );

    catalog.register(
        ToolDescriptor::new(
            "extract_citations",
            "Extract citations from paper text in common academic formats",
        )
        .with_any_of(&["paper_text", "paper_url"])
        .with_optional(&["format"])
        .with_returns("list of extracted citations with type metadata"),
        blocking(extract_citations),
    );

    catalog.register(
        ToolDescriptor::new(
            "analyze_citation_network",
            "Build a citation network around papers and compute its metrics",
        )
        .with_required(&["paper_ids"])
        .with_optional(&["depth", "include_co_citations"])
        .with_returns("citation network nodes, edges, and metrics"),
        blocking(analyze_citation_network),
    );

    catalog.register(
        ToolDescriptor::new(
            "process_pdf",
            "Extract text and sections from a PDF given a URL or local path",
        )
        .with_any_of(&["pdf_url", "pdf_path"])
        .with_optional(&["sections", "strict_matching"])
        .with_returns("full text and detected sections"),
        Arc::new(PdfProcessor::new(http)),
    );

    catalog.register(
        ToolDescriptor::new(
            "extract_sections",
            "Split raw paper text into named academic sections",
        )
        .with_required(&["paper_text"])
        .with_optional(&["sections", "strict_matching"])
        .with_returns("mapping of section name to content and statistics"),
        blocking(extract_sections),
    );

    catalog.register(
        ToolDescriptor::new(
            "find_similar_papers",
            "Rank corpus papers by textual similarity to a reference paper",
        )
        .with_required(&["reference_paper"])
        .with_optional(&["search_corpus", "similarity_threshold", "max_results"])
        .with_returns("ranked list of similar papers with scores"),
        blocking(find_similar_papers),
    );

    catalog.register(
        ToolDescriptor::new(
            "calculate_similarity",
            "Compute a similarity score between two texts",
        )
        .with_required(&["paper1_text", "paper2_text"])
        .with_optional(&["method"])
        .with_returns("similarity score with comparison metadata"),
        blocking(calculate_similarity),
    );

    Ok(catalog)
}
