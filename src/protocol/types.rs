// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared data model for protocol instances.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProtocolError};

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// Protocol Type
// ============================================================================

/// Identifies the kind of a protocol instance for routing lookups.
///
/// The declaration order is significant: it is the order used for
/// deterministic fallback when a routing decision names an absent type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    /// Context-sharing protocol (tool/context providers).
    ContextSharing,
    /// Peer-to-peer agent messaging.
    PeerToPeer,
    /// Anything else plugged in by the caller.
    Custom,
}

impl ProtocolType {
    /// Get the wire/display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextSharing => "context_sharing",
            Self::PeerToPeer => "peer_to_peer",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "context_sharing" | "context" | "mcp" => Ok(Self::ContextSharing),
            "peer_to_peer" | "peer" | "a2a" | "agent2agent" => Ok(Self::PeerToPeer),
            "custom" => Ok(Self::Custom),
            other => Err(ConfigError::invalid("type", format!("unknown protocol type '{other}'"))),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Opaque credential token passed through to the remote side.
///
/// Never printed: both `Debug` and serialization redact the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Access the raw token.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

impl Serialize for Credentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("<redacted>")
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self)
    }
}

/// Configuration owned by a protocol instance. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Protocol type tag.
    #[serde(rename = "type")]
    pub protocol_type: ProtocolType,

    /// Remote endpoint (URL, address, or a label for subprocess servers).
    pub endpoint: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Optional opaque credential token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl ProtocolConfig {
    /// Create a configuration with the default timeout and no credentials.
    pub fn new(protocol_type: ProtocolType, endpoint: impl Into<String>) -> Self {
        Self {
            protocol_type,
            endpoint: endpoint.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            credentials: None,
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Attach a credential token.
    pub fn with_credentials(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(token));
        self
    }

    /// Per-request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate required fields. Malformed configuration is the only fatal
    /// construction-time failure in the crate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("endpoint".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }

    /// Validate, and reject a config meant for a different protocol type.
    pub fn validate_for(&self, expected: ProtocolType) -> Result<(), ConfigError> {
        self.validate()?;
        if self.protocol_type != expected {
            return Err(ConfigError::invalid(
                "protocol_type",
                format!("expected {expected}, got {}", self.protocol_type),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Capability descriptor returned by `Protocol::capabilities`.
///
/// Known flags are explicit optional fields; anything else a remote reports
/// lands in `extra` so new flags survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Protocol name.
    pub protocol: String,

    /// Protocol version.
    pub version: String,

    /// Tool names exposed by the remote, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_sharing: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_management: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_communication: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_server: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_routing: Option<bool>,

    /// Local agent identity for peer protocols.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Additional capabilities as key-value pairs.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Capabilities {
    /// Create a descriptor with only protocol and version set.
    pub fn new(protocol: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Set the tool list.
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Check whether a boolean feature flag is set.
    pub fn supports(&self, flag: &str) -> bool {
        match flag {
            "context_sharing" => self.context_sharing.unwrap_or(false),
            "session_management" => self.session_management.unwrap_or(false),
            "peer_communication" => self.peer_communication.unwrap_or(false),
            "background_server" => self.background_server.unwrap_or(false),
            "message_routing" => self.message_routing.unwrap_or(false),
            other => self
                .extra
                .get(other)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }

    /// One-line summary handed to the reasoning component.
    pub fn summary(&self) -> String {
        let mut flags: Vec<&str> = [
            "context_sharing",
            "session_management",
            "peer_communication",
            "background_server",
            "message_routing",
        ]
        .into_iter()
        .filter(|flag| self.supports(flag))
        .collect();
        flags.sort_unstable();

        let mut summary = format!("{} v{}", self.protocol, self.version);
        if !flags.is_empty() {
            summary.push_str(&format!(" [{}]", flags.join(", ")));
        }
        if let Some(tools) = &self.tools {
            summary.push_str(&format!(" tools: {}", tools.join(", ")));
        }
        summary
    }
}

// ============================================================================
// Requests and Responses
// ============================================================================

/// Parameters for `Protocol::invoke`.
///
/// One closed shape covers every protocol: context protocols read `query`,
/// `tool` and `args`; peer protocols read `query` as the message body and
/// `target` as the recipient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Free-form request text.
    pub query: String,

    /// Tool to run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Tool arguments (a JSON object).
    #[serde(default)]
    pub args: serde_json::Value,

    /// Target peer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl InvokeRequest {
    /// Create a request carrying only query text.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            tool: None,
            args: serde_json::Value::Object(Default::default()),
            target: None,
        }
    }

    /// Ask for a tool to be run with the given arguments.
    pub fn with_tool(mut self, tool: impl Into<String>, args: serde_json::Value) -> Self {
        self.tool = Some(tool.into());
        self.args = args;
        self
    }

    /// Address a specific peer.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

impl From<&str> for InvokeRequest {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

impl From<String> for InvokeRequest {
    fn from(query: String) -> Self {
        Self::new(query)
    }
}

/// Classification of a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connection,
    Timeout,
    UnknownTool,
    Handler,
    Transport,
    InvalidResponse,
    Remote,
    NotConnected,
}

/// Serializable error payload carried inside structured results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ProtocolError> for ResponseError {
    fn from(err: &ProtocolError) -> Self {
        let kind = match err {
            ProtocolError::ConnectionFailure { .. } => FailureKind::Connection,
            ProtocolError::Timeout { .. } => FailureKind::Timeout,
            ProtocolError::UnknownTool(_) => FailureKind::UnknownTool,
            ProtocolError::HandlerFault { .. } => FailureKind::Handler,
            ProtocolError::Transport(_) => FailureKind::Transport,
            ProtocolError::InvalidResponse(_) => FailureKind::InvalidResponse,
            ProtocolError::Remote(_) => FailureKind::Remote,
            ProtocolError::NotConnected(_) => FailureKind::NotConnected,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<ProtocolError> for ResponseError {
    fn from(err: ProtocolError) -> Self {
        Self::from(&err)
    }
}

/// Outcome of a single invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { data: serde_json::Value },
    Error { error: ResponseError },
}

/// Structured result of `Protocol::invoke`.
///
/// Always carries the protocol tag, endpoint and a capabilities snapshot so
/// callers can reason about provenance without holding the instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolResponse {
    pub protocol: ProtocolType,
    pub endpoint: String,
    pub capabilities: Capabilities,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ProtocolResponse {
    /// Create a successful response.
    pub fn success(
        protocol: ProtocolType,
        endpoint: impl Into<String>,
        capabilities: Capabilities,
        data: serde_json::Value,
    ) -> Self {
        Self {
            protocol,
            endpoint: endpoint.into(),
            capabilities,
            outcome: Outcome::Success { data },
        }
    }

    /// Create a failed response.
    pub fn failure(
        protocol: ProtocolType,
        endpoint: impl Into<String>,
        capabilities: Capabilities,
        error: impl Into<ResponseError>,
    ) -> Self {
        Self {
            protocol,
            endpoint: endpoint.into(),
            capabilities,
            outcome: Outcome::Error {
                error: error.into(),
            },
        }
    }

    /// Check if the invocation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Get the payload of a successful invocation.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            Outcome::Success { data } => Some(data),
            Outcome::Error { .. } => None,
        }
    }

    /// Get the error of a failed invocation.
    pub fn error(&self) -> Option<&ResponseError> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Error { error } => Some(error),
        }
    }

    /// Provenance tag, e.g. `context_sharing@mcp://github:8080`.
    pub fn provenance(&self) -> String {
        format!("{}@{}", self.protocol, self.endpoint)
    }

    /// Text rendering of the outcome for the reasoning component.
    pub fn summary(&self) -> String {
        match &self.outcome {
            Outcome::Success { data } => match data {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            Outcome::Error { error } => format!("error: {}", error.message),
        }
    }
}

/// Snapshot of a protocol instance, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    #[serde(rename = "type")]
    pub protocol_type: ProtocolType,
    pub connected: bool,
    pub capabilities: Capabilities,
    pub config: ProtocolConfig,
}
