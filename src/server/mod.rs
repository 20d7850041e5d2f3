// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context-protocol server side.
//!
//! - [`envelope`] - NDJSON request/response envelope
//! - [`ContextServer`] - dispatches `initialize` / `list_tools` / `call_tool`
//!   against a [`crate::tools::ToolRegistry`]
//! - [`github`] - server pre-loaded with GitHub tools
//! - [`launcher`] - supervised background servers (child process or task)
//! - [`ServerManager`] - named collection of background servers
//!
//! # Example
//!
//! ```rust,ignore
//! use agentlink::server::ContextServer;
//!
//! let server = Arc::new(ContextServer::new("my-server"));
//! server.register_tool("echo", "Echo text", schema, handler).await?;
//! server.serve_stdio().await?;
//! ```

mod context;
pub mod envelope;
pub mod github;
pub mod launcher;
mod manager;

pub use context::ContextServer;
pub use envelope::{Method, Request, Response, PROTOCOL_VERSION};
pub use github::{github_server, github_server_with_api, GITHUB_SERVER_NAME};
pub use launcher::{CommandSpec, ServerHandle, ServerLauncher, ServerState, Transport};
pub use manager::{ServerManager, ServerStatus};
