// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool system for context-protocol servers.
//!
//! - [`ToolHandler`] trait - Core abstraction for tool implementations
//! - [`ToolRegistry`] - Maps tool names to specs in registration order
//! - [`handler_fn`] - Wrap an async closure as a handler
//!
//! # Example
//!
//! ```rust,ignore
//! use agentlink::tools::{handler_fn, ParamType, ToolRegistry};
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(
//!     "echo",
//!     "Echo the text argument",
//!     [("text".to_string(), ParamType::String)].into(),
//!     handler_fn(|args| async move { Ok(args["text"].clone()) }),
//! )?;
//!
//! let output = registry.get("echo").unwrap().run(json!({"text": "hi"})).await?;
//! ```

pub mod registry;

pub use registry::{
    handler_fn, FnHandler, ParamType, ParameterSchema, ToolDefinition, ToolHandler, ToolRegistry,
    ToolSpec,
};

use serde::Deserialize;
use crate::error::ToolError;

/// Parse JSON arguments into a typed struct.
///
/// This is a helper function for tool handlers to deserialize their input.
pub fn parse_arguments<T>(arguments: &serde_json::Value) -> Result<T, ToolError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(arguments.clone())
        .map_err(|err| ToolError::InvalidInput(format!("Failed to parse arguments: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct SearchArgs {
        query: String,
        #[serde(default)]
        limit: Option<usize>,
    }

    #[test]
    fn test_parse_arguments() {
        let args: SearchArgs =
            parse_arguments(&serde_json::json!({"query": "tokio", "limit": 2})).unwrap();
        assert_eq!(args.query, "tokio");
        assert_eq!(args.limit, Some(2));
    }

    #[test]
    fn test_parse_arguments_missing_field() {
        let result: Result<SearchArgs, _> = parse_arguments(&serde_json::json!({"limit": 2}));
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    }
}
