//! Semantic similarity over paper text.
//!
//! TF-IDF here is self-contained: unigrams and bigrams over preprocessed
//! text, smoothed inverse document frequency, l2-normalized vectors, cosine
//! between them. Good enough for ranking a handful of abstracts; not a
//! vector-database replacement.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use paperagent_core::{ToolArgs, ToolError};

static NON_ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z\s]").expect("invalid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("invalid regex"));
static PAPER_ARTIFACTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:fig|figure|table|equation|eq|section|sec)\s*\d+\b").expect("invalid regex")
});

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "for", "from",
        "had", "has", "have", "in", "is", "it", "its", "of", "on", "or", "such", "that", "the",
        "their", "them", "then", "there", "these", "they", "this", "to", "was", "we", "were",
        "which", "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Normalize text for similarity analysis: strip paper artifacts like
/// "Figure 3", drop everything non-alphabetic, collapse whitespace.
pub fn preprocess_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let without_artifacts = PAPER_ARTIFACTS.replace_all(&lowered, " ");
    let alpha_only = NON_ALPHA.replace_all(&without_artifacts, " ");
    WHITESPACE.replace_all(&alpha_only, " ").trim().to_string()
}

fn tokens(text: &str) -> Vec<String> {
    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(word))
        .collect();

    let mut terms: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    for pair in words.windows(2) {
        terms.push(format!("{} {}", pair[0], pair[1]));
    }
    terms
}

/// Sparse l2-normalized TF-IDF vectors for a set of documents.
fn tfidf_vectors(documents: &[String]) -> Vec<HashMap<String, f64>> {
    let token_lists: Vec<Vec<String>> = documents.iter().map(|doc| tokens(doc)).collect();

    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for list in &token_lists {
        let unique: HashSet<&str> = list.iter().map(String::as_str).collect();
        for term in unique {
            *document_frequency.entry(term).or_insert(0) += 1;
        }
    }

    let n = documents.len() as f64;
    token_lists
        .iter()
        .map(|list| {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for term in list {
                *counts.entry(term).or_insert(0) += 1;
            }

            let mut vector: HashMap<String, f64> = counts
                .into_iter()
                .map(|(term, count)| {
                    let df = document_frequency[term] as f64;
                    let idf = ((1.0 + n) / (1.0 + df)).ln() + 1.0;
                    (term.to_string(), count as f64 * idf)
                })
                .collect();

            let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for weight in vector.values_mut() {
                    *weight /= norm;
                }
            }
            vector
        })
        .collect()
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, weight)| large.get(term).map(|other| weight * other))
        .sum()
}

fn top_terms(vector: &HashMap<String, f64>, limit: usize) -> Vec<(String, f64)> {
    let mut terms: Vec<(String, f64)> = vector
        .iter()
        .map(|(term, weight)| (term.clone(), *weight))
        .collect();
    terms.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    terms.truncate(limit);
    terms
}

fn terms_to_json(terms: &[(String, f64)]) -> Value {
    Value::Array(
        terms
            .iter()
            .map(|(term, weight)| json!([term, weight]))
            .collect(),
    )
}

/// Highest-weighted terms of a single text, used by the deep analysis tool.
pub fn key_terms(text: &str, limit: usize) -> Vec<String> {
    let processed = preprocess_text(text);
    let vectors = tfidf_vectors(&[processed]);
    top_terms(&vectors[0], limit)
        .into_iter()
        .map(|(term, _)| term)
        .collect()
}

fn string_arg(args: &ToolArgs, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Find papers similar to a reference text within a corpus.
pub fn find_similar_papers(args: ToolArgs) -> Result<Value, ToolError> {
    let reference_paper = string_arg(&args, "reference_paper");
    if reference_paper.trim().is_empty() {
        return Err(ToolError::InvalidInput(
            "reference paper text is required".to_string(),
        ));
    }

    let search_corpus: Vec<Value> = match args.get("search_corpus").and_then(Value::as_array) {
        Some(corpus) if !corpus.is_empty() => corpus.clone(),
        _ => sample_corpus(),
    };
    let max_results = args
        .get("max_results")
        .and_then(Value::as_u64)
        .unwrap_or(10) as usize;
    let similarity_threshold = args
        .get("similarity_threshold")
        .and_then(Value::as_f64)
        .unwrap_or(0.1);

    let reference_text = preprocess_text(&reference_paper);
    let mut documents = vec![reference_text.clone()];
    documents.extend(search_corpus.iter().map(|paper| {
        preprocess_text(paper.get("text").and_then(Value::as_str).unwrap_or_default())
    }));

    let vectors = tfidf_vectors(&documents);
    let mut scored: Vec<(f64, &Value)> = vectors[1..]
        .iter()
        .zip(search_corpus.iter())
        .filter_map(|(vector, paper)| {
            let score = cosine(&vectors[0], vector);
            (score >= similarity_threshold).then_some((score, paper))
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(max_results);

    let similar_papers: Vec<Value> = scored
        .iter()
        .enumerate()
        .map(|(rank, (score, paper))| {
            let mut entry = paper.as_object().cloned().unwrap_or_default();
            entry.insert("similarity_score".to_string(), json!(score));
            entry.insert("similarity_rank".to_string(), json!(rank + 1));
            Value::Object(entry)
        })
        .collect();

    Ok(json!({
        "similar_papers": similar_papers,
        "search_metadata": {
            "reference_text_length": reference_text.len(),
            "corpus_size": search_corpus.len(),
            "similarity_threshold": similarity_threshold,
            "max_results": max_results,
            "results_found": similar_papers.len(),
        }
    }))
}

/// Pairwise similarity between two texts with a selectable method.
pub fn calculate_similarity(args: ToolArgs) -> Result<Value, ToolError> {
    let paper1_text = string_arg(&args, "paper1_text");
    let paper2_text = string_arg(&args, "paper2_text");
    if paper1_text.trim().is_empty() || paper2_text.trim().is_empty() {
        return Err(ToolError::InvalidInput(
            "both paper texts are required".to_string(),
        ));
    }
    let method = args
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("tfidf_cosine")
        .to_string();

    let text1 = preprocess_text(&paper1_text);
    let text2 = preprocess_text(&paper2_text);

    let mut similarity = match method.as_str() {
        "jaccard" => jaccard_similarity(&text1, &text2),
        "word_overlap" => word_overlap_similarity(&text1, &text2),
        _ => tfidf_similarity(&text1, &text2),
    };

    similarity.insert(
        "comparison_metadata".to_string(),
        json!({
            "paper1_length": text1.len(),
            "paper2_length": text2.len(),
            "method": method,
            "paper1_words": text1.split_whitespace().count(),
            "paper2_words": text2.split_whitespace().count(),
        }),
    );

    Ok(json!({ "similarity": Value::Object(similarity) }))
}

fn tfidf_similarity(text1: &str, text2: &str) -> Map<String, Value> {
    let vectors = tfidf_vectors(&[text1.to_string(), text2.to_string()]);
    let score = cosine(&vectors[0], &vectors[1]);

    let top1 = top_terms(&vectors[0], 10);
    let top2 = top_terms(&vectors[1], 10);

    let mut common: Vec<Value> = Vec::new();
    for (term1, score1) in &top1 {
        for (term2, score2) in &top2 {
            if term1 == term2 {
                common.push(json!({
                    "term": term1,
                    "score1": score1,
                    "score2": score2,
                    "avg_score": (score1 + score2) / 2.0,
                }));
            }
        }
    }
    common.sort_by(|a, b| {
        let avg = |v: &Value| v["avg_score"].as_f64().unwrap_or(0.0);
        avg(b).partial_cmp(&avg(a)).unwrap_or(std::cmp::Ordering::Equal)
    });
    common.truncate(5);

    let mut result = Map::new();
    result.insert("method".to_string(), json!("tfidf_cosine"));
    result.insert("similarity_score".to_string(), json!(score));
    result.insert("top_terms_paper1".to_string(), terms_to_json(&top1[..top1.len().min(5)]));
    result.insert("top_terms_paper2".to_string(), terms_to_json(&top2[..top2.len().min(5)]));
    result.insert("common_important_terms".to_string(), Value::Array(common));
    result
}

fn jaccard_similarity(text1: &str, text2: &str) -> Map<String, Value> {
    let words1: HashSet<&str> = text1.split_whitespace().collect();
    let words2: HashSet<&str> = text2.split_whitespace().collect();

    let intersection: Vec<&&str> = words1.intersection(&words2).collect();
    let union_size = words1.union(&words2).count();
    let score = if union_size > 0 {
        intersection.len() as f64 / union_size as f64
    } else {
        0.0
    };

    let mut sample: Vec<&str> = intersection.iter().map(|w| **w).collect();
    sample.sort_unstable();
    sample.truncate(10);

    let mut result = Map::new();
    result.insert("method".to_string(), json!("jaccard"));
    result.insert("similarity_score".to_string(), json!(score));
    result.insert("common_words".to_string(), json!(intersection.len()));
    result.insert("total_unique_words".to_string(), json!(union_size));
    result.insert("words_paper1".to_string(), json!(words1.len()));
    result.insert("words_paper2".to_string(), json!(words2.len()));
    result.insert("sample_common_words".to_string(), json!(sample));
    result
}

fn word_overlap_similarity(text1: &str, text2: &str) -> Map<String, Value> {
    let mut freq1: HashMap<&str, usize> = HashMap::new();
    let mut freq2: HashMap<&str, usize> = HashMap::new();
    let words1: Vec<&str> = text1.split_whitespace().collect();
    let words2: Vec<&str> = text2.split_whitespace().collect();
    for word in &words1 {
        *freq1.entry(word).or_insert(0) += 1;
    }
    for word in &words2 {
        *freq2.entry(word).or_insert(0) += 1;
    }

    let common: Vec<&str> = freq1
        .keys()
        .filter(|word| freq2.contains_key(*word))
        .copied()
        .collect();
    let overlap_count: usize = common
        .iter()
        .map(|word| freq1[word].min(freq2[word]))
        .sum();

    let total_words = words1.len() + words2.len();
    let ratio = if total_words > 0 {
        (2 * overlap_count) as f64 / total_words as f64
    } else {
        0.0
    };

    let mut result = Map::new();
    result.insert("method".to_string(), json!("word_overlap"));
    result.insert("similarity_score".to_string(), json!(ratio));
    result.insert("overlap_count".to_string(), json!(overlap_count));
    result.insert("common_unique_words".to_string(), json!(common.len()));
    result.insert("total_words".to_string(), json!(total_words));
    result.insert("overlap_percentage".to_string(), json!(ratio * 100.0));
    result
}

fn sample_corpus() -> Vec<Value> {
    vec![
        json!({
            "id": "sample_1",
            "title": "Machine Learning in Healthcare",
            "text": "Machine learning algorithms are increasingly being applied to healthcare data to improve patient outcomes and reduce costs."
        }),
        json!({
            "id": "sample_2",
            "title": "Deep Learning for Natural Language Processing",
            "text": "Deep neural networks have revolutionized natural language processing tasks including translation, summarization, and sentiment analysis."
        }),
        json!({
            "id": "sample_3",
            "title": "Computer Vision Applications",
            "text": "Computer vision techniques using convolutional neural networks enable automated image analysis and object recognition."
        }),
    ]
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
    fn preprocessing_strips_artifacts_and_noise() {
        let text = "See Figure 3 and Table 12: Results, 95.4% accuracy!";
        let processed = preprocess_text(text);
        assert_eq!(processed, "see and results accuracy");
    }

    #[test]
    fn identical_texts_have_cosine_one() {
        let text = "transformers use self attention for sequence modeling".to_string();
        let vectors = tfidf_vectors(&[text.clone(), text]);
        let score = cosine(&vectors[0], &vectors[1]);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_texts_have_cosine_zero() {
        let vectors = tfidf_vectors(&[
            "quantum chromodynamics lattice".to_string(),
            "protein folding dynamics".to_string(),
        ]);
        assert_eq!(cosine(&vectors[0], &vectors[1]), 0.0);
    }

    #[test]
    fn calculate_similarity_defaults_to_tfidf_cosine() {
        let result = calculate_similarity(args(&[
            ("paper1_text", json!("neural networks learn representations")),
            ("paper2_text", json!("neural networks learn hierarchical representations")),
        ]))
        .unwrap();

        let similarity = &result["similarity"];
        assert_eq!(similarity["method"], "tfidf_cosine");
        let score = similarity["similarity_score"].as_f64().unwrap();
        assert!(score > 0.3 && score <= 1.0);
        assert_eq!(similarity["comparison_metadata"]["method"], "tfidf_cosine");
    }

    #[test]
    fn jaccard_and_word_overlap_methods_are_selectable() {
        let base = args(&[
            ("paper1_text", json!("alpha beta gamma")),
            ("paper2_text", json!("beta gamma delta")),
        ]);

        let mut jaccard_args = base.clone();
        jaccard_args.insert("method".into(), json!("jaccard"));
        let jaccard = calculate_similarity(jaccard_args).unwrap();
        assert_eq!(jaccard["similarity"]["method"], "jaccard");
        assert_eq!(jaccard["similarity"]["common_words"], 2);
        assert_eq!(jaccard["similarity"]["total_unique_words"], 4);

        let mut overlap_args = base;
        overlap_args.insert("method".into(), json!("word_overlap"));
        let overlap = calculate_similarity(overlap_args).unwrap();
        assert_eq!(overlap["similarity"]["method"], "word_overlap");
        assert_eq!(overlap["similarity"]["overlap_count"], 2);
    }

    #[test]
    fn missing_text_is_invalid_input() {
        let err = calculate_similarity(args(&[("paper1_text", json!("only one"))])).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn find_similar_papers_ranks_by_score() {
        let corpus = json!([
            {"id": "a", "text": "deep learning with neural networks for language"},
            {"id": "b", "text": "gardening tips for tomato plants in spring"},
            {"id": "c", "text": "neural networks and deep learning architectures"},
        ]);
        let result = find_similar_papers(args(&[
            ("reference_paper", json!("neural networks deep learning")),
            ("search_corpus", corpus),
            ("similarity_threshold", json!(0.05)),
        ]))
        .unwrap();

        let papers = result["similar_papers"].as_array().unwrap();
        assert!(!papers.is_empty());
        assert_eq!(papers[0]["similarity_rank"], 1);
        let first = papers[0]["similarity_score"].as_f64().unwrap();
        for paper in papers.iter().skip(1) {
            assert!(paper["similarity_score"].as_f64().unwrap() <= first);
        }
        // The gardening paper shares no terms with the reference.
        assert!(papers.iter().all(|p| p["id"] != "b"));
    }

    #[test]
    fn find_similar_papers_uses_sample_corpus_when_none_given() {
        let result = find_similar_papers(args(&[(
            "reference_paper",
            json!("machine learning for healthcare patient outcomes"),
        )]))
        .unwrap();

        assert_eq!(result["search_metadata"]["corpus_size"], 3);
        let papers = result["similar_papers"].as_array().unwrap();
        assert_eq!(papers[0]["id"], "sample_1");
    }

    #[test]
    fn missing_reference_is_invalid_input() {
        let err = find_similar_papers(ToolArgs::new()).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn key_terms_surface_repeated_content_words() {
        let terms = key_terms(
            "attention attention attention mechanism improves translation quality",
            3,
        );
        assert!(terms.iter().any(|t| t.contains("attention")));
    }
}
