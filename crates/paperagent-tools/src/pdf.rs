//! PDF content extraction and academic section splitting.

use std::path::Path;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

use paperagent_core::{ToolArgs, ToolError, ToolHandler};

const COMMON_SECTIONS: &[&str] = &[
    "abstract",
    "introduction",
    "methodology",
    "results",
    "conclusion",
    "references",
];

static TRIPLE_NEWLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n\s*\n").expect("invalid regex"));
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("invalid regex"));

fn section_pattern(section: &str, strict: bool) -> (String, String) {
    let section_lower = section.to_lowercase();
    if strict {
        let pattern = format!(r"(?im)^{}\s*$", regex::escape(section));
        return (section_lower, pattern);
    }

    // Flexible header variants: optional numbering, common synonyms.
    let (name, body) = match section_lower.as_str() {
        "abstract" => ("abstract", r"(?:abstract|summary)".to_string()),
        "introduction" => (
            "introduction",
            r"(?:\d+\.?\s*)?(?:introduction|background)".to_string(),
        ),
        "methodology" | "methods" => (
            "methodology",
            r"(?:\d+\.?\s*)?(?:methodology|methods|approach)".to_string(),
        ),
        "results" => (
            "results",
            r"(?:\d+\.?\s*)?(?:results|findings|experiments)".to_string(),
        ),
        "conclusion" => (
            "conclusion",
            r"(?:\d+\.?\s*)?(?:conclusion|conclusions|discussion)".to_string(),
        ),
        "references" => (
            "references",
            r"(?:references|bibliography|works?\s+cited)".to_string(),
        ),
        other => {
            let escaped = regex::escape(other);
            return (
                other.to_string(),
                format!(r"(?im)(?:^|\n)\s*(?:\d+\.?\s*)?{escaped}\s*(?:\n|$)"),
            );
        }
    };
    (
        name.to_string(),
        format!(r"(?im)(?:^|\n)\s*{body}\s*(?:\n|$)"),
    )
}

struct SectionPosition {
    name: String,
    start: usize,
    header_start: usize,
    header_text: String,
}

/// Split paper text into named sections using header pattern matching.
/// Content runs from each header to the next recognized header.
pub fn split_sections(text: &str, targets: &[String], strict: bool) -> Map<String, Value> {
    let mut positions: Vec<SectionPosition> = Vec::new();

    for target in targets {
        let (name, pattern) = section_pattern(target, strict);
        let Ok(regex) = Regex::new(&pattern) else {
            continue;
        };
        for found in regex.find_iter(text) {
            positions.push(SectionPosition {
                name: name.clone(),
                start: found.end(),
                header_start: found.start(),
                header_text: found.as_str().trim().to_string(),
            });
        }
    }

    positions.sort_by_key(|position| position.start);

    let mut sections = Map::new();
    for (i, position) in positions.iter().enumerate() {
        let end = positions
            .get(i + 1)
            .map(|next| next.header_start)
            .unwrap_or(text.len());
        let raw = text[position.start..end].trim();
        let content = TRIPLE_NEWLINE.replace_all(raw, "\n\n");
        let content = INLINE_SPACE.replace_all(&content, " ").to_string();

        if !content.is_empty() {
            sections.insert(
                position.name.clone(),
                json!({
                    "content": content,
                    "header": position.header_text,
                    "word_count": content.split_whitespace().count(),
                    "char_count": content.len(),
                }),
            );
        }
    }

    sections
}

fn requested_sections(args: &ToolArgs) -> Vec<String> {
    args.get("sections")
        .and_then(Value::as_array)
        .map(|sections| {
            sections
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Tool entry point: extract named sections from raw paper text.
pub fn extract_sections(args: ToolArgs) -> Result<Value, ToolError> {
    let paper_text = args
        .get("paper_text")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let strict_matching = args
        .get("strict_matching")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if paper_text.trim().is_empty() {
        return Err(ToolError::InvalidInput(
            "paper text is required".to_string(),
        ));
    }

    let targets = requested_sections(&args);
    let effective: Vec<String> = if targets.is_empty() {
        COMMON_SECTIONS.iter().map(|s| s.to_string()).collect()
    } else {
        targets.clone()
    };

    let sections = split_sections(paper_text, &effective, strict_matching);

    Ok(json!({
        "sections": sections,
        "extraction_metadata": {
            "text_length": paper_text.len(),
            "sections_requested": targets.len(),
            "sections_found": sections.len(),
            "strict_matching": strict_matching,
        }
    }))
}

/// Extract text from PDF bytes on the blocking pool.
pub async fn pdf_text_from_bytes(bytes: Vec<u8>) -> Result<String, ToolError> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|err| ToolError::Parse(format!("PDF text extraction failed: {err}")))
    })
    .await
    .map_err(|err| ToolError::Panicked(err.to_string()))?
}

/// `process_pdf` handler: fetch a PDF by URL or read a stored local path,
/// extract its text, and split it into sections.
pub struct PdfProcessor {
    http: reqwest::Client,
}

impl PdfProcessor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ToolError> {
        debug!(url, "fetching PDF");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ToolError::Network(format!("PDF fetch failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ToolError::Network(format!(
                "PDF fetch returned HTTP {}",
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

#[async_trait]
impl ToolHandler for PdfProcessor {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
        let pdf_url = args
            .get("pdf_url")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let pdf_path = args
            .get("pdf_path")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let (source, bytes) = if !pdf_url.trim().is_empty() {
            (pdf_url.to_string(), self.fetch(pdf_url).await?)
        } else if !pdf_path.trim().is_empty() {
            let bytes = tokio::fs::read(Path::new(pdf_path)).await?;
            (pdf_path.to_string(), bytes)
        } else {
            return Err(ToolError::InvalidInput(
                "either pdf_url or pdf_path is required".to_string(),
            ));
        };

        let file_size = bytes.len();
        let full_text = pdf_text_from_bytes(bytes).await?;

        let strict_matching = args
            .get("strict_matching")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let targets = requested_sections(&args);
        let effective: Vec<String> = if targets.is_empty() {
            COMMON_SECTIONS.iter().map(|s| s.to_string()).collect()
        } else {
            targets
        };
        let sections = split_sections(&full_text, &effective, strict_matching);
        let sections_found = sections.len();

        Ok(json!({
            "content": {
                "full_text": full_text,
                "sections": sections,
            },
            "processing_metadata": {
                "source": source,
                "file_size": file_size,
                "sections_found": sections_found,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER: &str = "\
Attention Is All You Need

Abstract
We propose a new architecture based solely on attention.

1. Introduction
Recurrent models process sequences step by step.

2. Methods
We use multi-head self attention throughout.

Results
Our model achieves state of the art BLEU scores.

Conclusion
Attention mechanisms suffice for sequence transduction.

References
[1] Prior work.
";

    #[test]
    fn flexible_matching_finds_common_sections() {
        let targets: Vec<String> = COMMON_SECTIONS.iter().map(|s| s.to_string()).collect();
        let sections = split_sections(PAPER, &targets, false);

        for name in ["abstract", "introduction", "methodology", "results", "conclusion"] {
            assert!(sections.contains_key(name), "missing section {name}");
        }
        let abstract_section = &sections["abstract"];
        assert!(abstract_section["content"]
            .as_str()
            .unwrap()
            .contains("attention"));
        assert!(abstract_section["word_count"].as_u64().unwrap() > 0);
    }

    #[test]
    fn numbered_headers_match_flexible_patterns() {
        let targets = vec!["introduction".to_string(), "methodology".to_string()];
        let sections = split_sections(PAPER, &targets, false);
        assert_eq!(sections["introduction"]["header"].as_str().unwrap(), "1. Introduction");
        assert_eq!(sections["methodology"]["header"].as_str().unwrap(), "2. Methods");
    }

    #[test]
    fn section_content_stops_at_next_header() {
        let targets = vec!["results".to_string(), "conclusion".to_string()];
        let sections = split_sections(PAPER, &targets, false);
        let results = sections["results"]["content"].as_str().unwrap();
        assert!(results.contains("BLEU"));
        assert!(!results.contains("suffice"));
    }

    #[test]
    fn strict_matching_requires_exact_headers() {
        let targets = vec!["Summary".to_string()];
        let sections = split_sections("Summary\nShort text here.\n", &targets, true);
        assert!(sections.contains_key("summary"));

        let none = split_sections("1. Summary\nNumbered header.\n", &targets, true);
        assert!(none.is_empty());
    }

    #[test]
    fn extract_sections_defaults_to_common_set() {
        let mut args = ToolArgs::new();
        args.insert("paper_text".into(), json!(PAPER));
        let result = extract_sections(args).unwrap();

        assert_eq!(result["extraction_metadata"]["sections_requested"], 0);
        assert!(result["extraction_metadata"]["sections_found"].as_u64().unwrap() >= 5);
        assert!(result["sections"].get("abstract").is_some());
    }

    #[test]
    fn extract_sections_requires_text() {
        let err = extract_sections(ToolArgs::new()).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn processor_rejects_missing_source() {
        let processor = PdfProcessor::new(reqwest::Client::new());
        let err = processor.call(ToolArgs::new()).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(err.to_string().contains("pdf_url"));
    }

    #[tokio::test]
    async fn processor_reports_io_error_for_missing_path() {
        let processor = PdfProcessor::new(reqwest::Client::new());
        let mut args = ToolArgs::new();
        args.insert("pdf_path".into(), json!("/nonexistent/paper.pdf"));
        let err = processor.call(args).await.unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}
