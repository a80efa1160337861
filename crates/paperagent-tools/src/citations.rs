//! Citation extraction and citation network analysis.
//!
//! Extraction is regex-based over four citation styles (author-year,
//! numbered, DOI, arXiv id). Network construction derives cited/citing
//! neighbors deterministically from the paper id; a real citation database
//! would slot in behind the same payload shape.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use paperagent_core::{ToolArgs, ToolError};

static AUTHOR_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Z][a-z]+(?:\s+et\s+al\.?)?)\s*\((\d{4})\)").expect("invalid regex")
});
static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("invalid regex"));
static DOI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)doi:?\s*(10\.\d+/[^\s]+)").expect("invalid regex"));
static ARXIV_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"arXiv:(\d{4}\.\d{4,5})").expect("invalid regex"));

/// Extract citations from free paper text. Shared with the metadata tool,
/// which runs it over abstracts.
pub fn citations_from_text(paper_text: &str) -> Vec<Value> {
    let mut citations = Vec::new();

    for caps in AUTHOR_YEAR.captures_iter(paper_text) {
        citations.push(json!({
            "type": "author_year",
            "author": &caps[1],
            "year": &caps[2],
            "format": "apa_style",
        }));
    }
    for caps in NUMBERED.captures_iter(paper_text) {
        citations.push(json!({
            "type": "numbered",
            "reference_number": &caps[1],
            "format": "ieee_style",
        }));
    }
    for caps in DOI.captures_iter(paper_text) {
        citations.push(json!({
            "type": "doi",
            "doi": &caps[1],
            "format": "doi_reference",
        }));
    }
    for caps in ARXIV_ID.captures_iter(paper_text) {
        citations.push(json!({
            "type": "arxiv",
            "arxiv_id": &caps[1],
            "format": "arxiv_reference",
        }));
    }

    // De-duplicate on the identifying fields per type.
    let mut seen = HashSet::new();
    citations.retain(|citation| {
        let key = format!(
            "{}_{}{}{}{}",
            citation["type"].as_str().unwrap_or_default(),
            citation.get("author").and_then(Value::as_str).unwrap_or(""),
            citation.get("year").and_then(Value::as_str).unwrap_or(""),
            citation.get("doi").and_then(Value::as_str).unwrap_or(""),
            citation
                .get("arxiv_id")
                .and_then(Value::as_str)
                .unwrap_or(""),
        );
        seen.insert(key)
    });

    citations
}

/// Tool entry point: citations from `paper_text` or a `paper_url` placeholder.
pub fn extract_citations(args: ToolArgs) -> Result<Value, ToolError> {
    let paper_text = args
        .get("paper_text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let paper_url = args
        .get("paper_url")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let citation_format = args
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("mixed");

    if paper_text.trim().is_empty() && paper_url.trim().is_empty() {
        return Err(ToolError::InvalidInput(
            "either paper_text or paper_url is required".to_string(),
        ));
    }

    // URL-only input: callers should run process_pdf first to obtain text.
    let text = if paper_text.trim().is_empty() {
        format!("Content from {paper_url} would be extracted here")
    } else {
        paper_text
    };

    let citations = citations_from_text(&text);

    Ok(json!({
        "citations": citations,
        "count": citations.len(),
        "extraction_metadata": {
            "text_length": text.len(),
            "patterns_used": ["author_year", "numbered", "doi", "arxiv"],
            "format": citation_format,
        }
    }))
}

fn stable_hash(paper_id: &str) -> u64 {
    paper_id
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |acc, byte| {
            (acc ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
        })
}

fn simulated_cited_papers(paper_id: &str, depth: u64) -> Vec<String> {
    let base = stable_hash(paper_id) % 100;
    (0..(depth * 2).min(5))
        .map(|i| format!("cited_{}", base + i))
        .collect()
}

fn simulated_citing_papers(paper_id: &str, depth: u64) -> Vec<String> {
    let base = stable_hash(paper_id) % 100;
    (0..depth.min(3))
        .map(|i| format!("citing_{}", base + i))
        .collect()
}

fn network_density(node_count: usize, edge_count: usize) -> f64 {
    if node_count < 2 {
        return 0.0;
    }
    let possible = (node_count * (node_count - 1)) as f64;
    edge_count as f64 / possible
}

fn central_papers(edges: &[Value]) -> Vec<Value> {
    let mut citation_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for edge in edges {
        if let Some(target) = edge["target"].as_str() {
            *citation_counts.entry(target).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(&str, usize)> = citation_counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));

    sorted
        .into_iter()
        .take(5)
        .enumerate()
        .map(|(idx, (paper_id, count))| {
            json!({
                "paper_id": paper_id,
                "citation_count": count,
                "centrality_rank": idx + 1,
            })
        })
        .collect()
}

fn co_citation_analysis(edges: &[Value]) -> Value {
    // Group citing papers by the paper they cite.
    let mut citing_by_target: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in edges {
        if let (Some(source), Some(target)) = (edge["source"].as_str(), edge["target"].as_str()) {
            citing_by_target.entry(target).or_default().push(source);
        }
    }

    let mut pairs: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for (cited, citing) in &citing_by_target {
        if citing.len() < 2 {
            continue;
        }
        for (i, first) in citing.iter().enumerate() {
            for second in &citing[i + 1..] {
                let mut pair = [first.to_string(), second.to_string()];
                pair.sort();
                pairs
                    .entry((pair[0].clone(), pair[1].clone()))
                    .or_default()
                    .push(cited.to_string());
            }
        }
    }

    let mut strongest: Vec<(&(String, String), &Vec<String>)> = pairs.iter().collect();
    strongest.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    json!({
        "co_citation_pairs": pairs.len(),
        "strongest_co_citations": strongest
            .into_iter()
            .take(5)
            .map(|(pair, shared)| json!({
                "papers": [pair.0, pair.1],
                "shared_citations": shared.len(),
                "shared_papers": shared,
            }))
            .collect::<Vec<Value>>(),
    })
}

/// Build and analyze a citation network over the given paper ids.
pub fn analyze_citation_network(args: ToolArgs) -> Result<Value, ToolError> {
    let paper_ids: Vec<String> = args
        .get("paper_ids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let depth = args.get("depth").and_then(Value::as_u64).unwrap_or(2);
    let include_co_citations = args
        .get("include_co_citations")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    if paper_ids.is_empty() {
        return Err(ToolError::InvalidInput(
            "at least one paper ID is required".to_string(),
        ));
    }

    let mut nodes: Vec<Value> = Vec::new();
    let mut edges: Vec<Value> = Vec::new();
    let mut node_ids: HashSet<String> = HashSet::new();

    for paper_id in &paper_ids {
        if node_ids.insert(paper_id.clone()) {
            nodes.push(json!({
                "id": paper_id,
                "type": "paper",
                "properties": {
                    "paper_id": paper_id,
                    "citation_count": 0,
                    "reference_count": 0,
                }
            }));
        }

        for cited_id in simulated_cited_papers(paper_id, depth) {
            if node_ids.insert(cited_id.clone()) {
                nodes.push(json!({
                    "id": cited_id,
                    "type": "cited_paper",
                    "properties": {
                        "paper_id": cited_id,
                        "relationship_type": "direct_citation",
                    }
                }));
            }
            edges.push(json!({
                "source": paper_id,
                "target": cited_id,
                "type": "cites",
                "properties": {"relationship": "direct_citation", "depth": 1},
            }));
        }

        for citing_id in simulated_citing_papers(paper_id, depth) {
            if node_ids.insert(citing_id.clone()) {
                nodes.push(json!({
                    "id": citing_id,
                    "type": "citing_paper",
                    "properties": {
                        "paper_id": citing_id,
                        "relationship_type": "direct_citation",
                    }
                }));
            }
            edges.push(json!({
                "source": citing_id,
                "target": paper_id,
                "type": "cites",
                "properties": {"relationship": "direct_citation", "depth": 1},
            }));
        }
    }

    let metrics = json!({
        "total_nodes": node_ids.len(),
        "total_edges": edges.len(),
        "average_citations": edges.len() as f64 / paper_ids.len() as f64,
        "network_density": network_density(node_ids.len(), edges.len()),
        "central_papers": central_papers(&edges),
    });
    let co_citations = include_co_citations.then(|| co_citation_analysis(&edges));

    let mut network = json!({
        "nodes": nodes,
        "edges": edges,
        "metrics": metrics,
    });
    if let Some(co_citations) = co_citations {
        network["co_citations"] = co_citations;
    }

    Ok(json!({
        "network": network,
        "analysis_metadata": {
            "papers_analyzed": paper_ids.len(),
            "depth": depth,
            "include_co_citations": include_co_citations,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn extracts_all_four_citation_styles() {
        let text = "As shown by Vaswani et al. (2017) and earlier work [12], \
                    see doi:10.1000/example.123 and arXiv:1706.03762 for details.";
        let citations = citations_from_text(text);

        let types: Vec<&str> = citations
            .iter()
            .filter_map(|c| c["type"].as_str())
            .collect();
        assert!(types.contains(&"author_year"));
        assert!(types.contains(&"numbered"));
        assert!(types.contains(&"doi"));
        assert!(types.contains(&"arxiv"));

        let arxiv = citations.iter().find(|c| c["type"] == "arxiv").unwrap();
        assert_eq!(arxiv["arxiv_id"], "1706.03762");
    }

    #[test]
    fn duplicate_citations_are_collapsed() {
        let text = "Smith (2020) argued X. Later Smith (2020) showed Y. See [3] and [3].";
        let citations = citations_from_text(text);

        let author_year: Vec<&Value> = citations
            .iter()
            .filter(|c| c["type"] == "author_year")
            .collect();
        assert_eq!(author_year.len(), 1);
        // Numbered citations share a single dedup key.
        let numbered: Vec<&Value> = citations
            .iter()
            .filter(|c| c["type"] == "numbered")
            .collect();
        assert_eq!(numbered.len(), 1);
    }

    #[test]
    fn extraction_requires_text_or_url() {
        let err = extract_citations(ToolArgs::new()).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(err.to_string().contains("paper_text"));
    }

    #[test]
    fn extraction_reports_metadata() {
        let result = extract_citations(args(&[(
            "paper_text",
            Value::String("Brown (2019) and [4]".to_string()),
        )]))
        .unwrap();

        assert_eq!(result["count"], 2);
        assert_eq!(result["extraction_metadata"]["format"], "mixed");
        assert!(result["extraction_metadata"]["text_length"].as_u64().unwrap() > 0);
    }

    #[test]
    fn network_requires_paper_ids() {
        let err = analyze_citation_network(ToolArgs::new()).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn network_contains_nodes_edges_and_metrics() {
        let result = analyze_citation_network(args(&[(
            "paper_ids",
            serde_json::json!(["1706.03762", "1810.04805"]),
        )]))
        .unwrap();

        let network = &result["network"];
        let nodes = network["nodes"].as_array().unwrap();
        let edges = network["edges"].as_array().unwrap();
        assert!(nodes.len() >= 2);
        assert!(!edges.is_empty());

        let metrics = &network["metrics"];
        assert_eq!(metrics["total_nodes"], nodes.len());
        assert_eq!(metrics["total_edges"], edges.len());
        let density = metrics["network_density"].as_f64().unwrap();
        assert!(density > 0.0 && density <= 1.0);
        assert!(!metrics["central_papers"].as_array().unwrap().is_empty());

        assert!(network.get("co_citations").is_some());
        assert_eq!(result["analysis_metadata"]["papers_analyzed"], 2);
    }

    #[test]
    fn network_is_deterministic_for_a_given_id() {
        let input = args(&[("paper_ids", serde_json::json!(["2301.00001"]))]);
        let first = analyze_citation_network(input.clone()).unwrap();
        let second = analyze_citation_network(input).unwrap();
        assert_eq!(first, second);
    }
}
