//! Schema validation for proposed tool calls.
//!
//! Pure function of catalog state and input: no side effects, no dispatch.
//! The validator is deliberately permissive about extra keys so that novel
//! LLM-proposed parameters pass through to the tool untouched.

use serde_json::Value;

use crate::catalog::{ToolArgs, ToolCatalog};

/// Result of validating a proposed tool call.
#[derive(Debug, Clone)]
pub enum Validation {
    Valid { validated_args: ToolArgs },
    Invalid {
        reason: String,
        available_tools: Vec<String>,
    },
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Validation::Valid { .. } => None,
            Validation::Invalid { reason, .. } => Some(reason),
        }
    }
}

/// A required key counts as absent when it is missing, `null`, an empty
/// string, or an empty array/object. Numbers and booleans always count as
/// present.
fn is_present(args: &ToolArgs, key: &str) -> bool {
    match args.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

/// Validate `args` against the catalog contract for `tool_name`.
pub fn validate(catalog: &ToolCatalog, tool_name: &str, args: &ToolArgs) -> Validation {
    let descriptor = match catalog.describe(tool_name) {
        Ok(descriptor) => descriptor,
        Err(_) => {
            return Validation::Invalid {
                reason: format!("tool '{tool_name}' is not registered in the catalog"),
                available_tools: catalog.list_tool_names(),
            };
        }
    };

    // Disjunctive groups override the generic required-args check for their
    // members: at least one member of each group must be present.
    for group in &descriptor.any_of {
        if !group.iter().any(|key| is_present(args, key)) {
            return Validation::Invalid {
                reason: format!(
                    "{tool_name} requires at least one of: {}",
                    group.join(", ")
                ),
                available_tools: Vec::new(),
            };
        }
    }

    let covered: Vec<&String> = descriptor.any_of.iter().flatten().collect();
    let missing: Vec<&str> = descriptor
        .required_args
        .iter()
        .filter(|key| !covered.contains(key))
        .filter(|key| !is_present(args, key))
        .map(|key| key.as_str())
        .collect();

    if !missing.is_empty() {
        return Validation::Invalid {
            reason: format!("missing required arguments: {}", missing.join(", ")),
            available_tools: Vec::new(),
        };
    }

    Validation::Valid {
        validated_args: args.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ToolDescriptor, ToolHandler};
    use crate::ToolError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct NoopTool;

    #[async_trait]
    impl ToolHandler for NoopTool {
        async fn call(&self, _args: ToolArgs) -> Result<Value, ToolError> {
            Ok(Value::Null)
        }
    }

    fn catalog() -> ToolCatalog {
        let mut catalog = ToolCatalog::new();
        catalog.register(
            ToolDescriptor::new("search", "search papers")
                .with_required(&["query"])
                .with_optional(&["max_results", "category"]),
            Arc::new(NoopTool),
        );
        catalog.register(
            ToolDescriptor::new("extract_citations", "extract citations")
                .with_any_of(&["paper_text", "paper_url"])
                .with_optional(&["format"]),
            Arc::new(NoopTool),
        );
        catalog
    }

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn unknown_tool_is_invalid_and_lists_known_names() {
        let catalog = catalog();
        let result = validate(&catalog, "teleport", &ToolArgs::new());
        match result {
            Validation::Invalid {
                reason,
                available_tools,
            } => {
                assert!(reason.contains("teleport"));
                assert!(reason.contains("not registered"));
                assert_eq!(available_tools, catalog.list_tool_names());
            }
            Validation::Valid { .. } => panic!("expected invalid"),
        }
    }

    #[test]
    fn missing_required_key_is_invalid() {
        let catalog = catalog();
        let result = validate(&catalog, "search", &ToolArgs::new());
        assert!(!result.is_valid());
        assert!(result.reason().unwrap().contains("query"));
    }

    #[test]
    fn falsy_required_values_count_as_missing() {
        let catalog = catalog();
        for falsy in [json!(null), json!(""), json!("   "), json!([]), json!({})] {
            let result = validate(&catalog, "search", &args(&[("query", falsy.clone())]));
            assert!(!result.is_valid(), "expected {falsy} to count as missing");
        }
    }

    #[test]
    fn numbers_and_booleans_count_as_present() {
        let mut catalog = ToolCatalog::new();
        catalog.register(
            ToolDescriptor::new("depth_tool", "test").with_required(&["depth", "flag"]),
            Arc::new(NoopTool),
        );
        let result = validate(
            &catalog,
            "depth_tool",
            &args(&[("depth", json!(0)), ("flag", json!(false))]),
        );
        assert!(result.is_valid());
    }

    #[test]
    fn optional_keys_never_block_validation() {
        let catalog = catalog();
        let result = validate(&catalog, "search", &args(&[("query", json!("bert"))]));
        assert!(result.is_valid());

        let result = validate(
            &catalog,
            "search",
            &args(&[("query", json!("bert")), ("max_results", json!(5))]),
        );
        assert!(result.is_valid());
    }

    #[test]
    fn disjunctive_group_requires_one_truthy_member() {
        let catalog = catalog();

        let result = validate(&catalog, "extract_citations", &ToolArgs::new());
        let reason = result.reason().unwrap().to_string();
        assert!(reason.contains("paper_text"));
        assert!(reason.contains("paper_url"));

        let result = validate(
            &catalog,
            "extract_citations",
            &args(&[("paper_text", json!("")), ("paper_url", json!(null))]),
        );
        assert!(!result.is_valid());

        let result = validate(
            &catalog,
            "extract_citations",
            &args(&[("paper_url", json!("https://arxiv.org/pdf/1706.03762"))]),
        );
        assert!(result.is_valid());
    }

    #[test]
    fn extra_keys_pass_through_unchanged() {
        let catalog = catalog();
        let input = args(&[("query", json!("gnn")), ("novel_knob", json!(42))]);
        match validate(&catalog, "search", &input) {
            Validation::Valid { validated_args } => {
                assert_eq!(validated_args, input);
                assert_eq!(validated_args["novel_knob"], 42);
            }
            Validation::Invalid { .. } => panic!("expected valid"),
        }
    }
}
