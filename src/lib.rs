// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! agentlink - a multi-protocol agent layer.
//!
//! One request interface over several agent communication protocols, with a
//! router that picks a protocol per request or fans out to all of them.
//!
//! # Architecture
//!
//! - [`protocol`] - The `Protocol` contract, configuration, capabilities and
//!   structured results
//! - [`tools`] - Tool definitions and the ordered tool registry
//! - [`server`] - Context-protocol server, NDJSON envelope, GitHub tool set,
//!   background server launcher and manager
//! - [`context`] - Context-protocol clients: simulated and subprocess-backed
//! - [`peer`] - Peer messaging client
//! - [`router`] - Single-protocol and fan-out dispatch
//! - [`config`] - Configuration files and protocol construction
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agentlink::context::SimulatedContextClient;
//! use agentlink::peer::PeerClient;
//! use agentlink::router::{KeywordReasoner, ProtocolRouter};
//!
//! let mut router = ProtocolRouter::new(Arc::new(KeywordReasoner));
//! router.add_protocol(Arc::new(SimulatedContextClient::new("mcp://github:8080")?));
//! router.add_protocol(Arc::new(PeerClient::new("a2a://local", "coordinator")?));
//!
//! let outcome = router.dispatch("analyze security of PR #123", false).await?;
//! println!("{}", outcome.final_answer());
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod router;
pub mod server;
pub mod telemetry;
pub mod tools;

pub use error::{ConfigError, ProtocolError, Result, RouterError, ToolError};
pub use protocol::{
    Capabilities, InvokeRequest, Protocol, ProtocolConfig, ProtocolResponse, ProtocolType,
};
pub use router::{DispatchOutcome, KeywordReasoner, ProtocolRouter, Reasoner};

/// Crate version, reported by servers in `initialize`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
