use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::agent::RunOutcome;

const LOG_DIR_ENV: &str = "PAPERAGENT_LOG_DIR";
const DEFAULT_LOG_DIR: &str = "data/logs";

static REDACTION_PATTERNS: Lazy<Vec<(String, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key".to_string(),
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret".to_string(),
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer".to_string(),
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "sk_token".to_string(),
            Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
        ),
    ]
});

#[derive(Serialize)]
struct RunLogRecord {
    timestamp: String,
    run_id: String,
    user_id: String,
    query: String,
    status: String,
    iterations: u32,
    papers_discovered: usize,
    tools_invoked: usize,
    summary: Option<String>,
    error: Option<String>,
    redactions: Vec<String>,
}

fn log_base_dir() -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR))
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let line = serde_json::to_string(value)?;
    writeln!(writer, "{}", line)
        .with_context(|| format!("failed to append log entry to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn sanitize_text(input: &str, redactions: &mut HashSet<String>) -> String {
    let mut output = input.to_string();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 1 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        if matched {
            redactions.insert(name.clone());
        }
    }
    output
}

/// Append a run-completion record to the month-partitioned JSONL log.
pub fn log_run_completion(run_id: &str, outcome: &RunOutcome) -> Result<()> {
    let timestamp = Utc::now();
    let mut redactions = HashSet::new();

    let query = sanitize_text(&outcome.context.query, &mut redactions);
    let summary = outcome
        .final_summary
        .as_ref()
        .map(|summary| sanitize_text(&summary.summary, &mut redactions));
    let error = outcome
        .error
        .as_deref()
        .map(|error| sanitize_text(error, &mut redactions));

    let record = RunLogRecord {
        timestamp: timestamp.to_rfc3339(),
        run_id: run_id.to_string(),
        user_id: outcome.context.user_id.clone(),
        query,
        status: outcome.context.status.to_string(),
        iterations: outcome.context.iteration,
        papers_discovered: outcome.papers_discovered,
        tools_invoked: outcome.context.tool_results.len(),
        summary,
        error,
        redactions: redactions.iter().cloned().collect(),
    };

    let month_dir = log_base_dir()
        .join(format!("{:04}", timestamp.year()))
        .join(format!("{:02}", timestamp.month()));
    let run_log_path = month_dir.join("runs.jsonl");
    append_json_line(&run_log_path, &record)?;

    if !record.redactions.is_empty() {
        warn!(
            run_id = %run_id,
            fields = ?record.redactions,
            "redacted potential secrets from run log"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResearchContext;
    use serde_json::Value;
    use tempfile::TempDir;

    #[test]
    fn run_logging_sanitizes_and_persists() -> Result<()> {
        let temp = TempDir::new().expect("temp dir");
        unsafe { std::env::set_var(LOG_DIR_ENV, temp.path()) };

        let mut context = ResearchContext::new(
            "Find papers, api_key=abcd1234",
            "user-7",
            None,
        );
        context.iteration = 3;
        let outcome = RunOutcome {
            success: false,
            papers_discovered: 0,
            analysis_count: 0,
            final_summary: None,
            error: Some("bearer XYZ rejected".to_string()),
            context,
        };

        log_run_completion("run-test", &outcome)?;

        let year_dir = temp.path().read_dir()?.next().unwrap()?.path();
        let month_dir = year_dir.read_dir()?.next().unwrap()?.path();
        let run_log = month_dir.join("runs.jsonl");
        assert!(run_log.exists());

        let line = std::fs::read_to_string(&run_log)?;
        let record: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(record["run_id"], "run-test");
        assert_eq!(record["iterations"], 3);
        assert!(record["query"].as_str().unwrap().contains("[REDACTED]"));
        assert!(record["error"].as_str().unwrap().contains("[REDACTED]"));
        assert!(!record["redactions"].as_array().unwrap().is_empty());

        Ok(())
    }
}
