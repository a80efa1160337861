//! arXiv search client and local paper store, plus the six catalog tools
//! built on them.
//!
//! The client speaks the arXiv Atom export API. The store keeps downloaded
//! PDFs and their metadata under one directory with a `papers_index.json`
//! tracking file; index writes are best effort, the PDFs on disk remain the
//! source of truth for `is_downloaded`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use paperagent_core::{ToolArgs, ToolError, ToolHandler};

use crate::citations::citations_from_text;
use crate::pdf::{pdf_text_from_bytes, split_sections};
use crate::similarity::key_terms;

const DEFAULT_API_URL: &str = "http://export.arxiv.org/api/query";

/// Client for the arXiv Atom export API.
pub struct ArxivClient {
    http: reqwest::Client,
    api_url: String,
}

impl ArxivClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_api_url(http, DEFAULT_API_URL.to_string())
    }

    pub fn with_api_url(http: reqwest::Client, api_url: String) -> Self {
        Self { http, api_url }
    }

    /// Search for papers. Results are parsed into the catalog paper shape.
    pub async fn search(
        &self,
        query: &str,
        max_results: u64,
        categories: &[String],
        date_from: Option<&str>,
        date_to: Option<&str>,
        sort_by: &str,
    ) -> Result<Vec<Value>, ToolError> {
        let search_query = build_search_query(query, categories, date_from, date_to);
        let sort = match sort_by {
            "date" | "submitted" => "submittedDate",
            "updated" => "lastUpdatedDate",
            _ => "relevance",
        };
        debug!(search_query = %search_query, sort, "querying arXiv API");

        let max_results = max_results.to_string();
        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", sort),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .map_err(|err| ToolError::Network(format!("arXiv API request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Network(format!(
                "arXiv API returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| ToolError::Network(format!("arXiv API body read failed: {err}")))?;
        parse_atom_feed(&body)
    }

    /// Fetch metadata for one paper by its id.
    pub async fn fetch_by_id(&self, paper_id: &str) -> Result<Option<Value>, ToolError> {
        let response = self
            .http
            .get(&self.api_url)
            .query(&[("id_list", paper_id), ("max_results", "1")])
            .send()
            .await
            .map_err(|err| ToolError::Network(format!("arXiv API request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Network(format!(
                "arXiv API returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| ToolError::Network(format!("arXiv API body read failed: {err}")))?;
        Ok(parse_atom_feed(&body)?.into_iter().next())
    }

    /// Download a PDF by URL.
    pub async fn download_pdf(&self, pdf_url: &str) -> Result<Vec<u8>, ToolError> {
        let response = self
            .http
            .get(pdf_url)
            .send()
            .await
            .map_err(|err| ToolError::Network(format!("PDF download failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ToolError::Network(format!(
                "PDF download returned HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ToolError::Network(format!("PDF body read failed: {err}")))?;
        Ok(bytes.to_vec())
    }
}

/// Build an arXiv `search_query` string from parameters.
fn build_search_query(
    query: &str,
    categories: &[String],
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    let clean = query.trim();
    if !clean.is_empty() {
        // Queries with operator characters are quoted for exact matching.
        if clean.contains([':', '[', ']', '(', ')', '+', '-']) {
            parts.push(format!("all:\"{clean}\""));
        } else {
            parts.push(format!("all:{clean}"));
        }
    }

    for category in categories {
        let category = category.trim();
        if !category.is_empty() {
            parts.push(format!("cat:{category}"));
        }
    }

    if date_from.is_some() || date_to.is_some() {
        let from = date_from.map(compact_date).unwrap_or_else(|| "19910101".to_string());
        let to = date_to.map(compact_date).unwrap_or_else(|| "20991231".to_string());
        parts.push(format!("submittedDate:[{from}0000 TO {to}2359]"));
    }

    if parts.is_empty() {
        "all:*".to_string()
    } else {
        parts.join(" AND ")
    }
}

fn compact_date(date: &str) -> String {
    date.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strip the version suffix from an arXiv id (`1706.03762v7` -> `1706.03762`).
fn base_paper_id(raw: &str) -> String {
    let segment = raw.rsplit('/').next().unwrap_or(raw);
    if let Some(pos) = segment.rfind('v') {
        if pos > 0 && segment[pos + 1..].chars().all(|c| c.is_ascii_digit())
            && !segment[pos + 1..].is_empty()
        {
            return segment[..pos].to_string();
        }
    }
    segment.to_string()
}

/// Parse an arXiv Atom feed into paper objects.
fn parse_atom_feed(xml: &str) -> Result<Vec<Value>, ToolError> {
    let document = roxmltree::Document::parse(xml)
        .map_err(|err| ToolError::Parse(format!("invalid Atom feed: {err}")))?;

    let mut papers = Vec::new();
    for entry in document
        .root_element()
        .children()
        .filter(|node| node.has_tag_name_local("entry"))
    {
        let text_of = |name: &str| -> String {
            entry
                .children()
                .find(|node| node.has_tag_name_local(name))
                .and_then(|node| node.text())
                .unwrap_or_default()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        };

        let entry_id = text_of("id");
        let paper_id = base_paper_id(&entry_id);

        let authors: Vec<String> = entry
            .children()
            .filter(|node| node.has_tag_name_local("author"))
            .filter_map(|author| {
                author
                    .children()
                    .find(|node| node.has_tag_name_local("name"))
                    .and_then(|node| node.text())
                    .map(str::to_string)
            })
            .collect();

        let categories: Vec<String> = entry
            .children()
            .filter(|node| node.has_tag_name_local("category"))
            .filter_map(|node| node.attribute("term").map(str::to_string))
            .collect();

        let primary_category = entry
            .children()
            .find(|node| node.has_tag_name_local("primary_category"))
            .and_then(|node| node.attribute("term"))
            .map(str::to_string)
            .or_else(|| categories.first().cloned())
            .unwrap_or_default();

        let pdf_url = entry
            .children()
            .filter(|node| node.has_tag_name_local("link"))
            .find(|node| node.attribute("title") == Some("pdf"))
            .and_then(|node| node.attribute("href"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{paper_id}"));

        papers.push(json!({
            "id": paper_id,
            "title": text_of("title"),
            "authors": authors,
            "abstract": text_of("summary"),
            "categories": categories,
            "primary_category": primary_category,
            "published": date_part(&text_of("published")),
            "updated": date_part(&text_of("updated")),
            "arxiv_url": entry_id,
            "pdf_url": pdf_url,
        }));
    }

    Ok(papers)
}

fn date_part(timestamp: &str) -> String {
    timestamp.chars().take(10).collect()
}

trait LocalName {
    fn has_tag_name_local(&self, name: &str) -> bool;
}

impl LocalName for roxmltree::Node<'_, '_> {
    fn has_tag_name_local(&self, name: &str) -> bool {
        self.is_element() && self.tag_name().name() == name
    }
}

/// Local storage for downloaded papers.
pub struct PaperStore {
    storage_path: PathBuf,
    index_file: PathBuf,
    index: Mutex<Map<String, Value>>,
}

impl PaperStore {
    /// Open (or create) a store rooted at `storage_path`. A corrupted index
    /// file is replaced with a fresh one.
    pub fn open(storage_path: impl Into<PathBuf>) -> Result<Self, ToolError> {
        let storage_path = storage_path.into();
        std::fs::create_dir_all(&storage_path)?;
        let index_file = storage_path.join("papers_index.json");

        let index = if index_file.exists() {
            match std::fs::read_to_string(&index_file)
                .ok()
                .and_then(|raw| serde_json::from_str::<Map<String, Value>>(&raw).ok())
            {
                Some(index) => index,
                None => {
                    warn!(path = %index_file.display(), "papers index corrupted, starting fresh");
                    Map::new()
                }
            }
        } else {
            Map::new()
        };

        let store = Self {
            storage_path,
            index_file,
            index: Mutex::new(index),
        };
        store.save_index();
        Ok(store)
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn paper_file(&self, paper_id: &str) -> PathBuf {
        self.storage_path.join(format!("{paper_id}.pdf"))
    }

    pub fn metadata_file(&self, paper_id: &str) -> PathBuf {
        self.storage_path.join(format!("{paper_id}_metadata.json"))
    }

    pub fn is_downloaded(&self, paper_id: &str) -> bool {
        self.paper_file(paper_id).exists()
    }

    pub fn total_downloaded(&self) -> usize {
        self.index.lock().expect("index lock poisoned").len()
    }

    /// Persist a downloaded paper with its metadata and update the index.
    pub fn save_paper(
        &self,
        paper_id: &str,
        pdf_bytes: &[u8],
        metadata: &Value,
    ) -> Result<u64, ToolError> {
        std::fs::write(self.paper_file(paper_id), pdf_bytes)?;
        std::fs::write(
            self.metadata_file(paper_id),
            serde_json::to_string_pretty(metadata)
                .map_err(|err| ToolError::Internal(err.to_string()))?,
        )?;

        let file_size = pdf_bytes.len() as u64;
        {
            let mut index = self.index.lock().expect("index lock poisoned");
            index.insert(
                paper_id.to_string(),
                json!({
                    "title": metadata.get("title").cloned().unwrap_or(Value::Null),
                    "categories": metadata.get("categories").cloned().unwrap_or(json!([])),
                    "download_date": Utc::now().to_rfc3339(),
                    "file_size": file_size,
                }),
            );
        }
        self.save_index();
        Ok(file_size)
    }

    /// Stored metadata for a paper, if any.
    pub fn metadata(&self, paper_id: &str) -> Option<Value> {
        let raw = std::fs::read_to_string(self.metadata_file(paper_id)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn read_pdf_bytes(&self, paper_id: &str) -> Result<Vec<u8>, ToolError> {
        let path = self.paper_file(paper_id);
        if !path.exists() {
            return Err(ToolError::NotFound(format!(
                "paper {paper_id} not found locally"
            )));
        }
        Ok(std::fs::read(path)?)
    }

    /// All indexed papers as list entries.
    pub fn list(&self) -> Vec<Value> {
        let index = self.index.lock().expect("index lock poisoned");
        index
            .iter()
            .map(|(paper_id, data)| {
                json!({
                    "id": paper_id,
                    "title": data.get("title").cloned().unwrap_or(Value::Null),
                    "download_date": data.get("download_date").cloned().unwrap_or(Value::Null),
                    "file_size": data.get("file_size").cloned().unwrap_or(json!(0)),
                    "categories": data.get("categories").cloned().unwrap_or(json!([])),
                    "local_path": self.paper_file(paper_id).display().to_string(),
                    "metadata_available": self.metadata_file(paper_id).exists(),
                })
            })
            .collect()
    }

    fn save_index(&self) {
        let index = self.index.lock().expect("index lock poisoned");
        match serde_json::to_string_pretty(&*index) {
            Ok(raw) => {
                if let Err(err) = std::fs::write(&self.index_file, raw) {
                    warn!(error = %err, "failed to persist papers index");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize papers index"),
        }
    }
}

fn str_arg<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn require_paper_id(args: &ToolArgs) -> Result<String, ToolError> {
    str_arg(args, "paper_id")
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidInput("paper ID is required".to_string()))
}

/// `arxiv_search_papers`
pub struct SearchPapersTool {
    client: Arc<ArxivClient>,
    store: Arc<PaperStore>,
    max_results_cap: u64,
}

impl SearchPapersTool {
    pub fn new(client: Arc<ArxivClient>, store: Arc<PaperStore>, max_results_cap: u32) -> Self {
        Self {
            client,
            store,
            max_results_cap: u64::from(max_results_cap.max(1)),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchPapersTool {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let query = str_arg(&args, "query")
            .ok_or_else(|| ToolError::InvalidInput("search query is required".to_string()))?
            .to_string();

        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(10)
            .clamp(1, self.max_results_cap);

        // Accept both a single category and a list.
        let categories: Vec<String> = match args.get("categories").or_else(|| args.get("category"))
        {
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(one)) => vec![one.clone()],
            _ => Vec::new(),
        };
        let date_from = str_arg(&args, "date_from");
        let date_to = str_arg(&args, "date_to");
        let sort_by = str_arg(&args, "sort_by").unwrap_or("relevance").to_string();

        let mut papers = self
            .client
            .search(&query, max_results, &categories, date_from, date_to, &sort_by)
            .await?;

        for paper in &mut papers {
            let downloaded = paper
                .get("id")
                .and_then(Value::as_str)
                .map(|id| self.store.is_downloaded(id))
                .unwrap_or(false);
            paper["is_downloaded"] = json!(downloaded);
        }

        info!(query = %query, count = papers.len(), "arXiv search completed");

        Ok(json!({
            "query": query,
            "count": papers.len(),
            "papers": papers,
            "search_metadata": {
                "category_filter": categories,
                "date_from": date_from,
                "date_to": date_to,
                "sort_by": sort_by,
                "max_requested": max_results,
                "storage_path": self.store.storage_path().display().to_string(),
            }
        }))
    }
}

/// `arxiv_download_paper`
pub struct DownloadPaperTool {
    client: Arc<ArxivClient>,
    store: Arc<PaperStore>,
}

impl DownloadPaperTool {
    pub fn new(client: Arc<ArxivClient>, store: Arc<PaperStore>) -> Self {
        Self { client, store }
    }
}

#[async_trait]
impl ToolHandler for DownloadPaperTool {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let paper_id = require_paper_id(&args)?;
        let force_download = args
            .get("force_download")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if self.store.is_downloaded(&paper_id) && !force_download {
            let paper_file = self.store.paper_file(&paper_id);
            let file_size = std::fs::metadata(&paper_file).map(|m| m.len()).unwrap_or(0);
            return Ok(json!({
                "paper_id": paper_id,
                "status": "already_downloaded",
                "local_path": paper_file.display().to_string(),
                "metadata_path": self.store.metadata_file(&paper_id).display().to_string(),
                "file_size": file_size,
                "metadata": self.store.metadata(&paper_id).unwrap_or(json!({})),
            }));
        }

        let metadata = self
            .client
            .fetch_by_id(&paper_id)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("paper {paper_id} not found on arXiv")))?;
        let pdf_url = metadata
            .get("pdf_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{paper_id}"));

        let pdf_bytes = self.client.download_pdf(&pdf_url).await?;
        let file_size = self.store.save_paper(&paper_id, &pdf_bytes, &metadata)?;

        info!(paper_id = %paper_id, file_size, "paper downloaded");

        Ok(json!({
            "paper_id": paper_id,
            "status": "downloaded",
            "local_path": self.store.paper_file(&paper_id).display().to_string(),
            "metadata_path": self.store.metadata_file(&paper_id).display().to_string(),
            "file_size": file_size,
            "metadata": metadata,
        }))
    }
}

/// `arxiv_list_papers`
pub struct ListPapersTool {
    store: Arc<PaperStore>,
}

impl ListPapersTool {
    pub fn new(store: Arc<PaperStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for ListPapersTool {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let category_filter = str_arg(&args, "category_filter").map(str::to_string);
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;

        let mut papers = self.store.list();
        if let Some(category) = &category_filter {
            papers.retain(|paper| {
                paper["categories"]
                    .as_array()
                    .map(|cats| cats.iter().any(|c| c.as_str() == Some(category)))
                    .unwrap_or(false)
            });
        }
        papers.truncate(limit);

        Ok(json!({
            "papers": papers,
            "count": papers.len(),
            "total_downloaded": self.store.total_downloaded(),
            "filters_applied": {
                "category_filter": category_filter,
                "limit": limit,
            }
        }))
    }
}

/// `arxiv_read_paper`
pub struct ReadPaperTool {
    store: Arc<PaperStore>,
}

impl ReadPaperTool {
    pub fn new(store: Arc<PaperStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for ReadPaperTool {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let paper_id = require_paper_id(&args)?;
        let include_metadata = args
            .get("include_metadata")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let extract_sections = args
            .get("extract_sections")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let pdf_bytes = self.store.read_pdf_bytes(&paper_id)?;
        let file_size = pdf_bytes.len();
        let text = pdf_text_from_bytes(pdf_bytes).await?;

        let sections = if extract_sections {
            let targets: Vec<String> = ["abstract", "introduction", "methodology", "results", "conclusion", "references"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            split_sections(&text, &targets, false)
        } else {
            Map::new()
        };

        let mut response = json!({
            "paper_id": paper_id,
            "content": {
                "text": text,
                "sections": sections,
            },
            "format": "text",
            "local_path": self.store.paper_file(&paper_id).display().to_string(),
            "file_size": file_size,
        });
        if include_metadata {
            response["metadata"] = self.store.metadata(&paper_id).unwrap_or(json!({}));
        }
        Ok(response)
    }
}

/// `arxiv_get_metadata`
pub struct GetMetadataTool {
    client: Arc<ArxivClient>,
    store: Arc<PaperStore>,
}

impl GetMetadataTool {
    pub fn new(client: Arc<ArxivClient>, store: Arc<PaperStore>) -> Self {
        Self { client, store }
    }
}

#[async_trait]
impl ToolHandler for GetMetadataTool {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let paper_id = require_paper_id(&args)?;
        let include_citations = args
            .get("include_citations")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let force_refresh = args
            .get("force_refresh")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut metadata = if force_refresh {
            None
        } else {
            self.store.metadata(&paper_id)
        };
        if metadata.is_none() {
            metadata = self.client.fetch_by_id(&paper_id).await?;
        }
        let mut metadata = metadata
            .ok_or_else(|| ToolError::NotFound(format!("paper {paper_id} not found")))?;

        // Normalize the id so versioned entries compare equal to the request.
        if let Some(id) = metadata.get("id").and_then(Value::as_str) {
            metadata["id"] = json!(base_paper_id(id));
        }

        if include_citations {
            let abstract_text = metadata
                .get("abstract")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let citations = citations_from_text(abstract_text);
            metadata["citation_count"] = json!(citations.len());
            metadata["citations_in_abstract"] = json!(citations);
        }

        let paper_file = self.store.paper_file(&paper_id);
        let is_downloaded = paper_file.exists();
        metadata["local_storage"] = json!({
            "is_downloaded": is_downloaded,
            "local_path": is_downloaded.then(|| paper_file.display().to_string()),
            "file_size": std::fs::metadata(&paper_file).ok().map(|m| m.len()),
        });

        Ok(json!({
            "paper_id": paper_id,
            "metadata": metadata,
        }))
    }
}

/// `arxiv_deep_analysis`: composed locally from the stored paper text.
pub struct DeepAnalysisTool {
    store: Arc<PaperStore>,
}

impl DeepAnalysisTool {
    pub fn new(store: Arc<PaperStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for DeepAnalysisTool {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let paper_id = require_paper_id(&args)?;

        let pdf_bytes = self.store.read_pdf_bytes(&paper_id)?;
        let text = pdf_text_from_bytes(pdf_bytes).await?;

        let targets: Vec<String> = ["abstract", "introduction", "methodology", "results", "conclusion", "references"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let sections = split_sections(&text, &targets, false);
        let citations = citations_from_text(&text);
        let terms = key_terms(&text, 10);

        Ok(json!({
            "paper_id": paper_id,
            "analysis": {
                "metadata": self.store.metadata(&paper_id).unwrap_or(json!({})),
                "sections_found": sections.keys().cloned().collect::<Vec<String>>(),
                "sections": sections,
                "citation_count": citations.len(),
                "citations": citations,
                "key_terms": terms,
                "text_length": text.len(),
            }
        }))
    }
}
