// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The protocol contract shared by every transport.
//!
//! A [`Protocol`] is one connected or disconnected handle to a remote tool,
//! context provider or peer network. Implementations differ in transport
//! (in-memory simulation, supervised subprocess, peer messaging) but expose
//! the same lifecycle:
//!
//! ```text
//!   Disconnected ──connect()──► Connected
//!        ▲                          │
//!        └──────disconnect()────────┘
//! ```
//!
//! # Auto-connect
//!
//! [`Protocol::invoke`] is the single generic entry point. Its first step is
//! explicit: if the instance is not connected it calls [`Protocol::connect`]
//! exactly once before running the protocol-specific handler. If that
//! connect fails, `invoke` returns a structured connection error instead of
//! raising. This lets a router treat every protocol as fire-and-forget; the
//! cost is that the first call pays the connection latency.
//!
//! # Example
//!
//! ```rust,ignore
//! use agentlink::context::SimulatedContextClient;
//! use agentlink::protocol::{InvokeRequest, Protocol};
//!
//! let client = SimulatedContextClient::new("mcp://github:8080")?;
//! let response = client
//!     .invoke(InvokeRequest::new("Get PR details").with_tool("github_search", json!({})))
//!     .await;
//! assert!(response.is_success());
//! ```

pub mod types;

pub use types::{
    Capabilities, Credentials, FailureKind, InvokeRequest, Outcome, ProtocolConfig, ProtocolInfo,
    ProtocolResponse, ProtocolType, ResponseError, DEFAULT_TIMEOUT_MS,
};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ProtocolError;

/// Capability set every protocol variant implements.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Protocol type tag. Immutable for the life of the instance.
    fn protocol_type(&self) -> ProtocolType;

    /// Configuration this instance was built with.
    fn config(&self) -> &ProtocolConfig;

    /// Whether the transport is currently established.
    fn is_connected(&self) -> bool;

    /// Last connection or transport error, if one was recorded.
    fn last_error(&self) -> Option<String> {
        None
    }

    /// Establish the underlying transport.
    ///
    /// Idempotent: returns `true` without side effects when already
    /// connected. Ordinary transport failures return `false` and leave the
    /// instance disconnected.
    async fn connect(&self) -> bool;

    /// Release transport resources. Idempotent and infallible.
    async fn disconnect(&self);

    /// Protocol and version metadata plus feature flags.
    ///
    /// While disconnected this returns static defaults without contacting
    /// the remote side.
    async fn capabilities(&self) -> Capabilities;

    /// Known peer or endpoint identifiers. Empty for non-peer protocols.
    async fn discover_peers(&self) -> Vec<String>;

    /// Protocol-specific request handling. Called by [`Protocol::invoke`]
    /// once the instance is connected.
    async fn handle_request(
        &self,
        request: InvokeRequest,
    ) -> Result<serde_json::Value, ProtocolError>;

    /// Generic invocation entry point.
    ///
    /// 1. If not connected, call [`Protocol::connect`] once. On failure,
    ///    return a connection error result.
    /// 2. Delegate to [`Protocol::handle_request`].
    /// 3. Wrap the outcome with the protocol tag and a capabilities snapshot.
    async fn invoke(&self, request: InvokeRequest) -> ProtocolResponse {
        let protocol = self.protocol_type();
        let endpoint = self.config().endpoint.clone();

        if !self.is_connected() {
            debug!(%protocol, %endpoint, "Auto-connecting before invoke");
            if !self.connect().await {
                let reason = self
                    .last_error()
                    .unwrap_or_else(|| "auto-connect failed".to_string());
                warn!(%protocol, %endpoint, error = %reason, "Auto-connect failed");
                let capabilities = self.capabilities().await;
                return ProtocolResponse::failure(
                    protocol,
                    endpoint.clone(),
                    capabilities,
                    ProtocolError::connection(endpoint, reason),
                );
            }
        }

        let outcome = self.handle_request(request).await;
        let capabilities = self.capabilities().await;

        match outcome {
            Ok(data) => ProtocolResponse::success(protocol, endpoint, capabilities, data),
            Err(err) => {
                debug!(%protocol, error = %err, "Invocation returned an error");
                ProtocolResponse::failure(protocol, endpoint, capabilities, err)
            }
        }
    }

    /// Snapshot of type, connection state, capabilities and config.
    async fn info(&self) -> ProtocolInfo {
        ProtocolInfo {
            protocol_type: self.protocol_type(),
            connected: self.is_connected(),
            capabilities: self.capabilities().await,
            config: self.config().clone(),
        }
    }
}
