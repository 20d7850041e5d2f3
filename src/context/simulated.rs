// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory context-protocol session with canned tools and context.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::SessionState;
use crate::error::{ConfigError, ProtocolError};
use crate::protocol::{Capabilities, InvokeRequest, Protocol, ProtocolConfig, ProtocolType};

/// Tools every simulated session offers unless configured otherwise.
pub const DEFAULT_SIMULATED_TOOLS: [&str; 4] =
    ["search", "github_search", "file_reader", "code_analyzer"];

/// Canned tool results and context strings. No I/O.
#[derive(Debug, Clone)]
pub struct SimulatedSession {
    endpoint: String,
    tools: Vec<String>,
}

impl SimulatedSession {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_tools(endpoint, DEFAULT_SIMULATED_TOOLS)
    }

    pub fn with_tools<I, S>(endpoint: impl Into<String>, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoint: endpoint.into(),
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn list_tools(&self) -> &[String] {
        &self.tools
    }

    /// Keyword-matched context for a request.
    pub fn get_context(&self, request: &str) -> String {
        let lower = request.to_lowercase();
        if lower.contains("pr details") {
            "PR #123: Add OAuth2 authentication flow. Replaces session cookies in the login \
             handler with token-based authentication and adds refresh handling."
                .to_string()
        } else if lower.contains("file changes") {
            "Modified files: auth/oauth.py, auth/tokens.py, tests/test_oauth.py".to_string()
        } else {
            format!("Context for '{}' from {}", request, self.endpoint)
        }
    }

    /// Canned result for a tool. Unknown names are an error value, not a panic.
    pub fn execute_tool(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value, ProtocolError> {
        if !self.tools.iter().any(|t| t == name) {
            return Err(ProtocolError::UnknownTool(name.to_string()));
        }

        let result = match name {
            "github_search" | "search" => {
                let query = args.get("query").and_then(|q| q.as_str()).unwrap_or("*");
                format!("Found 3 related PRs for '{query}'")
            }
            "file_reader" => {
                let path = args.get("path").and_then(|p| p.as_str()).unwrap_or("auth/oauth.py");
                format!("{path}: OAuth2 implementation with token refresh")
            }
            "code_analyzer" => "Code quality: Good. No critical issues found.".to_string(),
            other => format!("Executed {other}"),
        };
        Ok(json!(result))
    }
}

/// Context-protocol client over a [`SimulatedSession`].
#[derive(Debug)]
pub struct SimulatedContextClient {
    config: ProtocolConfig,
    session: SimulatedSession,
    connected: AtomicBool,
}

impl SimulatedContextClient {
    /// Create a client for an endpoint with the default tool set.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_config(ProtocolConfig::new(ProtocolType::ContextSharing, endpoint))
    }

    pub fn with_config(config: ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate_for(ProtocolType::ContextSharing)?;
        let session = SimulatedSession::new(config.endpoint.clone());
        Ok(Self {
            config,
            session,
            connected: AtomicBool::new(false),
        })
    }

    /// Replace the canned tool list.
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session = SimulatedSession::with_tools(self.config.endpoint.clone(), tools);
        self
    }

    pub fn session(&self) -> &SimulatedSession {
        &self.session
    }

    /// Current session snapshot. Empty while disconnected.
    pub fn session_state(&self) -> SessionState {
        let available_tools = if self.is_connected() {
            self.session.list_tools().iter().cloned().collect()
        } else {
            Default::default()
        };
        SessionState {
            endpoint: self.config.endpoint.clone(),
            available_tools,
            pending_correlation_ids: Default::default(),
        }
    }
}

#[async_trait]
impl Protocol for SimulatedContextClient {
    fn protocol_type(&self) -> ProtocolType {
        self.config.protocol_type
    }

    fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> bool {
        if !self.connected.swap(true, Ordering::SeqCst) {
            info!(
                endpoint = %self.config.endpoint,
                tools = self.session.list_tools().len(),
                "Simulated context session connected"
            );
        }
        true
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!(endpoint = %self.config.endpoint, "Simulated context session closed");
        }
    }

    async fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::new("context_sharing", "1.0")
            .with_tools(self.session.list_tools().iter().cloned());
        caps.context_sharing = Some(true);
        caps.session_management = Some(true);
        caps
    }

    async fn discover_peers(&self) -> Vec<String> {
        Vec::new()
    }

    #[instrument(skip(self, request), fields(endpoint = %self.config.endpoint, tool = ?request.tool))]
    async fn handle_request(
        &self,
        request: InvokeRequest,
    ) -> Result<serde_json::Value, ProtocolError> {
        let context_data = self.session.get_context(&request.query);

        let (tool_result, tools_used) = match request.tool.as_deref() {
            Some(name) => {
                let result = self.session.execute_tool(name, &request.args)?;
                (Some(result), vec![name.to_string()])
            }
            None => (None, Vec::new()),
        };

        Ok(json!({
            "context_data": context_data,
            "tool_result": tool_result,
            "tools_used": tools_used,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FailureKind;

    #[test]
    fn test_session_context_keywords() {
        let session = SimulatedSession::new("mcp://test:8080");
        let pr = session.get_context("Get PR details for the auth change");
        assert!(pr.contains("PR #123"));
        assert!(pr.contains("authentication"));

        let files = session.get_context("show file changes");
        assert!(files.contains("Modified files"));
        assert!(files.contains("oauth.py"));

        let other = session.get_context("weather");
        assert!(other.contains("weather"));
    }

    #[test]
    fn test_session_execute_tool() {
        let session = SimulatedSession::new("mcp://test:8080");
        let result = session
            .execute_tool("github_search", &json!({"query": "oauth"}))
            .unwrap();
        assert!(result.as_str().unwrap().contains("Found 3 related PRs"));

        let result = session.execute_tool("file_reader", &json!({})).unwrap();
        assert!(result.as_str().unwrap().contains("OAuth2 implementation"));

        let err = session.execute_tool("nope", &json!({})).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownTool("nope".to_string()));
    }

    #[test]
    fn test_empty_endpoint_is_fatal() {
        assert!(SimulatedContextClient::new("").is_err());
    }

    #[test]
    fn test_peer_config_rejected() {
        let config = ProtocolConfig::new(ProtocolType::PeerToPeer, "mcp://test:8080");
        assert!(matches!(
            SimulatedContextClient::with_config(config),
            Err(ConfigError::InvalidValue { field, .. }) if field == "protocol_type"
        ));
    }

    #[tokio::test]
    async fn test_default_tools_include_search() {
        let client = SimulatedContextClient::new("mcp://test:8080").unwrap();
        let response = client
            .invoke(InvokeRequest::new("find oauth").with_tool("search", json!({"query": "oauth"})))
            .await;

        assert!(response.is_success(), "{}", response.summary());
        assert_eq!(response.data().unwrap()["tool_result"], "Found 3 related PRs for 'oauth'");
        assert!(client.session().list_tools().contains(&"search".to_string()));
    }

    #[tokio::test]
    async fn test_capabilities_shape() {
        let client = SimulatedContextClient::new("mcp://test:8080").unwrap();
        let caps = client.capabilities().await;

        assert_eq!(caps.protocol, "context_sharing");
        assert_eq!(caps.version, "1.0");
        assert!(caps.supports("context_sharing"));
        assert!(caps.supports("session_management"));
        assert!(caps.tools.unwrap().contains(&"code_analyzer".to_string()));
    }

    #[tokio::test]
    async fn test_invoke_with_tool() {
        let client = SimulatedContextClient::new("mcp://test:8080").unwrap();
        let response = client
            .invoke(InvokeRequest::new("Get PR details").with_tool("code_analyzer", json!({})))
            .await;

        assert!(client.is_connected());
        let data = response.data().unwrap();
        assert!(data["context_data"].as_str().unwrap().contains("PR #123"));
        assert_eq!(data["tool_result"], "Code quality: Good. No critical issues found.");
        assert_eq!(data["tools_used"], json!(["code_analyzer"]));
        assert_eq!(response.protocol, ProtocolType::ContextSharing);
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_is_structured_error() {
        let client = SimulatedContextClient::new("mcp://test:8080").unwrap();
        let response = client
            .invoke(InvokeRequest::new("x").with_tool("does_not_exist", json!({})))
            .await;

        let error = response.error().unwrap();
        assert_eq!(error.kind, FailureKind::UnknownTool);
        assert!(error.message.contains("does_not_exist"));
    }

    #[tokio::test]
    async fn test_session_state_tracks_connection() {
        let client = SimulatedContextClient::new("mcp://test:8080")
            .unwrap()
            .with_tools(["search"]);
        assert!(client.session_state().available_tools.is_empty());

        client.connect().await;
        let state = client.session_state();
        assert_eq!(state.endpoint, "mcp://test:8080");
        assert!(state.available_tools.contains("search"));

        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());
        assert!(client.session_state().available_tools.is_empty());
    }
}
