//! Tool catalog: the single source of truth mapping a tool name to its
//! handler and argument contract.
//!
//! The catalog is an explicitly constructed value injected into the validator
//! and dispatcher; there is no process-global registry. Registration and
//! removal are startup-time or test-time operations, not hot-path ones.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ToolError;

/// Argument mapping passed to every tool invocation.
pub type ToolArgs = serde_json::Map<String, Value>;

/// Uniform interface every tool implements. Blocking implementations should
/// be wrapped with [`crate::dispatcher::blocking`] so they never stall the
/// agent loop's scheduling.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArgs) -> Result<Value, ToolError>;
}

/// Immutable description of a tool's argument contract, defined at
/// catalog-construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub returns: String,
    #[serde(default)]
    pub required_args: Vec<String>,
    #[serde(default)]
    pub optional_args: Vec<String>,
    /// Cross-field requirements not expressible as required/optional: each
    /// group is satisfied when at least one member is present and non-empty.
    /// Members of a group are exempt from the generic required-args check.
    #[serde(default)]
    pub any_of: Vec<Vec<String>>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            returns: String::new(),
            required_args: Vec::new(),
            optional_args: Vec::new(),
            any_of: Vec::new(),
        }
    }

    pub fn with_required(mut self, args: &[&str]) -> Self {
        self.required_args
            .extend(args.iter().map(|a| a.to_string()));
        self
    }

    pub fn with_optional(mut self, args: &[&str]) -> Self {
        self.optional_args
            .extend(args.iter().map(|a| a.to_string()));
        self
    }

    pub fn with_any_of(mut self, group: &[&str]) -> Self {
        self.any_of
            .push(group.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn with_returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = returns.into();
        self
    }
}

struct CatalogEntry {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// Registry of available tools, order-stable by registration.
#[derive(Default)]
pub struct ToolCatalog {
    entries: Vec<CatalogEntry>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any existing entry with the same name.
    pub fn register(&mut self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|entry| entry.descriptor.name == descriptor.name)
        {
            existing.descriptor = descriptor;
            existing.handler = handler;
        } else {
            self.entries.push(CatalogEntry {
                descriptor,
                handler,
            });
        }
    }

    /// Remove a tool by name. Returns whether an entry was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.descriptor.name != name);
        self.entries.len() != before
    }

    /// All registered tool names in registration order.
    pub fn list_tool_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.descriptor.name.clone())
            .collect()
    }

    pub fn describe(&self, name: &str) -> Result<&ToolDescriptor, ToolError> {
        self.entries
            .iter()
            .map(|entry| &entry.descriptor)
            .find(|descriptor| descriptor.name == name)
            .ok_or_else(|| ToolError::NotFound(format!("tool '{name}' is not registered")))
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.name == name)
            .map(|entry| entry.handler.clone())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn call(&self, args: ToolArgs) -> Result<Value, ToolError> {
            Ok(Value::Object(args))
        }
    }

    #[test]
    fn registration_order_is_stable() {
        let mut catalog = ToolCatalog::new();
        for name in ["zeta", "alpha", "mid"] {
            catalog.register(ToolDescriptor::new(name, "test"), Arc::new(EchoTool));
        }
        assert_eq!(catalog.list_tool_names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn register_replaces_existing_entry() {
        let mut catalog = ToolCatalog::new();
        catalog.register(ToolDescriptor::new("t", "first"), Arc::new(EchoTool));
        catalog.register(
            ToolDescriptor::new("t", "second").with_required(&["query"]),
            Arc::new(EchoTool),
        );
        assert_eq!(catalog.len(), 1);
        let descriptor = catalog.describe("t").unwrap();
        assert_eq!(descriptor.description, "second");
        assert_eq!(descriptor.required_args, vec!["query"]);
    }

    #[test]
    fn unregister_removes_entry() {
        let mut catalog = ToolCatalog::new();
        catalog.register(ToolDescriptor::new("t", "test"), Arc::new(EchoTool));
        assert!(catalog.unregister("t"));
        assert!(!catalog.unregister("t"));
        assert!(catalog.describe("t").is_err());
        assert!(catalog.handler("t").is_none());
    }

    #[tokio::test]
    async fn handler_is_invocable_through_catalog() {
        let mut catalog = ToolCatalog::new();
        catalog.register(ToolDescriptor::new("echo", "test"), Arc::new(EchoTool));

        let mut args = ToolArgs::new();
        args.insert("query".into(), json!("transformers"));

        let handler = catalog.handler("echo").unwrap();
        let value = handler.call(args).await.unwrap();
        assert_eq!(value["query"], "transformers");
    }
}
