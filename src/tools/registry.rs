// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool registry and handler trait.
//!
//! This module defines the core abstractions for server-side tools:
//! - [`ToolHandler`] trait that all tools must implement
//! - [`ToolSpec`] pairing a handler with its advertised definition
//! - [`ToolRegistry`] for managing registered tools

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info_span, Instrument};

use crate::error::ToolError;

/// Type tag for a single tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Parameter name to type tag.
pub type ParameterSchema = BTreeMap<String, ParamType>;

/// Advertised shape of a tool, as returned by `list_tools`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameter_schema: ParameterSchema,
}

impl ToolDefinition {
    /// Create a definition with no parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: ParameterSchema::new(),
        }
    }

    /// Add a parameter to the schema.
    pub fn with_param(mut self, name: impl Into<String>, kind: ParamType) -> Self {
        self.parameter_schema.insert(name.into(), kind);
        self
    }
}

/// Trait that all tool handlers must implement.
///
/// Handlers take named arguments as a JSON object and return any
/// JSON-serializable value. Errors are wrapped by the server into an error
/// payload; a handler may also panic without taking the server down.
///
/// # Example
///
/// ```rust,ignore
/// use agentlink::tools::{ToolHandler, ToolError};
///
/// struct Echo;
///
/// #[async_trait]
/// impl ToolHandler for Echo {
///     async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
///         Ok(args["text"].clone())
///     }
/// }
/// ```
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the given arguments.
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
{
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        (self.func)(args).await
    }
}

/// Wrap an async closure as a shareable tool handler.
pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn ToolHandler>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
{
    Arc::new(FnHandler { func })
}

/// A registered tool: its definition plus the handler that runs it.
#[derive(Clone)]
pub struct ToolSpec {
    pub definition: ToolDefinition,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    pub fn new(definition: ToolDefinition, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            definition,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Run the handler on the current task inside a `tool_execute` span.
    pub async fn run(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let name = self.name();
        debug!(tool = %name, "Executing tool");
        let start = Instant::now();
        let result = self
            .handler
            .execute(args)
            .instrument(info_span!("tool_execute", tool = %name))
            .await;

        debug!(
            tool = %name,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            success = result.is_ok(),
            "Tool execution finished"
        );
        result
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Registry of available tools, maps names to specs.
///
/// Names are unique. [`ToolRegistry::register`] rejects a duplicate name;
/// [`ToolRegistry::replace`] is the explicit override. Definitions are
/// listed in registration order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    order: Vec<String>,
    specs: HashMap<String, ToolSpec>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool from its parts.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: ParameterSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolError> {
        let definition = ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameter_schema,
        };
        self.register_spec(ToolSpec::new(definition, handler))
    }

    /// Register a prepared spec. Fails if the name is taken.
    pub fn register_spec(&mut self, spec: ToolSpec) -> Result<(), ToolError> {
        let name = spec.name().to_string();
        if name.trim().is_empty() {
            return Err(ToolError::InvalidInput("tool name must not be empty".to_string()));
        }
        if self.specs.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        debug!(tool = %name, "Registered tool");
        self.order.push(name.clone());
        self.specs.insert(name, spec);
        Ok(())
    }

    /// Insert or overwrite a tool, keeping its original position when it
    /// already existed. Returns the previous spec.
    pub fn replace(&mut self, spec: ToolSpec) -> Option<ToolSpec> {
        let name = spec.name().to_string();
        let previous = self.specs.insert(name.clone(), spec);
        if previous.is_none() {
            self.order.push(name);
        }
        previous
    }

    /// Get a spec by tool name.
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.get(name)
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.specs.get(name))
            .map(|spec| spec.definition.clone())
            .collect()
    }

    /// All tool names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Arc<dyn ToolHandler> {
        handler_fn(|args| async move { Ok(args["text"].clone()) })
    }

    fn schema(params: &[(&str, ParamType)]) -> ParameterSchema {
        params
            .iter()
            .map(|(name, kind)| (name.to_string(), *kind))
            .collect()
    }

    #[test]
    fn test_definitions_follow_registration_order() {
        let mut registry = ToolRegistry::new();
        registry
            .register("zeta", "last letter", ParameterSchema::new(), echo())
            .unwrap();
        registry
            .register(
                "alpha",
                "first letter",
                schema(&[("text", ParamType::String)]),
                echo(),
            )
            .unwrap();

        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "zeta");
        assert_eq!(defs[1].name, "alpha");
        assert_eq!(defs[1].description, "first letter");
        assert_eq!(defs[1].parameter_schema["text"], ParamType::String);
        assert_eq!(registry.names(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register("echo", "first", ParameterSchema::new(), echo())
            .unwrap();

        let err = registry
            .register("echo", "second", ParameterSchema::new(), echo())
            .unwrap_err();
        assert!(matches!(err, ToolError::AlreadyRegistered(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().definition.description, "first");
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = ToolRegistry::new();
        let result = registry.register("  ", "blank", ParameterSchema::new(), echo());
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut registry = ToolRegistry::new();
        registry
            .register("a", "one", ParameterSchema::new(), echo())
            .unwrap();
        registry
            .register("b", "two", ParameterSchema::new(), echo())
            .unwrap();

        let previous = registry.replace(ToolSpec::new(ToolDefinition::new("a", "uno"), echo()));
        assert!(previous.is_some());
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().definition.description, "uno");

        assert!(registry
            .replace(ToolSpec::new(ToolDefinition::new("c", "three"), echo()))
            .is_none());
        assert_eq!(registry.names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_spec_run_echo() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                "echo",
                "Echo text back",
                schema(&[("text", ParamType::String)]),
                echo(),
            )
            .unwrap();

        let spec = registry.get("echo").unwrap();
        let result = spec.run(json!({"text": "hi"})).await.unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[tokio::test]
    async fn test_spec_run_passes_handler_error_through() {
        let spec = ToolSpec::new(
            ToolDefinition::new("fail", "Always fails"),
            handler_fn(|_| async { Err(ToolError::ExecutionFailed("nope".to_string())) }),
        );

        let err = spec.run(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(message) if message == "nope"));
    }

    #[test]
    fn test_definition_serializes_schema() {
        let def = ToolDefinition::new("search", "Search things")
            .with_param("query", ParamType::String)
            .with_param("limit", ParamType::Integer);
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["parameter_schema"]["limit"], "integer");
        assert_eq!(value["parameter_schema"]["query"], "string");
    }
}
