// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Named collection of supervised background servers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::launcher::{ServerHandle, ServerLauncher, ServerState};
use crate::context::RpcConnection;
use crate::error::ProtocolError;
use crate::protocol::DEFAULT_TIMEOUT_MS;

struct ManagedServer {
    handle: ServerHandle,
    rpc: Arc<RpcConnection>,
}

/// Status line for one managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub launcher: String,
    pub state: ServerState,
    pub pid: Option<u32>,
}

/// Starts, tracks and stops background servers by name.
///
/// Each manager is an explicit instance; nothing here is process-global.
pub struct ServerManager {
    servers: BTreeMap<String, ManagedServer>,
    timeout: Duration,
}

impl Default for ServerManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

impl ServerManager {
    /// Create a manager whose requests use `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            servers: BTreeMap::new(),
            timeout,
        }
    }

    /// Launch a server and wait for its handshake.
    ///
    /// A name whose server has terminated may be reused.
    pub async fn start(
        &mut self,
        name: impl Into<String>,
        launcher: &ServerLauncher,
    ) -> Result<ServerStatus, ProtocolError> {
        let name = name.into();

        if let Some(existing) = self.servers.get_mut(&name) {
            if existing.handle.state() != ServerState::Terminated {
                return Err(ProtocolError::connection(
                    &name,
                    "a server with this name is already running",
                ));
            }
        }

        let (mut handle, transport) = launcher.launch(None).await?;
        let rpc = Arc::new(RpcConnection::start(transport));

        if let Err(err) = rpc.initialize(self.timeout).await {
            rpc.close().await;
            handle.terminate().await;
            return Err(err);
        }
        handle.mark_ready();
        info!(server = %name, launcher = %launcher.label(), "Background server ready");

        let status = ServerStatus {
            name: name.clone(),
            launcher: handle.label().to_string(),
            state: handle.state(),
            pid: handle.pid(),
        };
        self.servers.insert(name, ManagedServer { handle, rpc });
        Ok(status)
    }

    /// Run a tool on a named server.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ProtocolError> {
        let rpc = self
            .servers
            .get(server)
            .map(|managed| Arc::clone(&managed.rpc))
            .ok_or_else(|| ProtocolError::NotConnected(server.to_string()))?;
        rpc.call_tool(tool, args, self.timeout).await
    }

    /// Status of one server.
    pub fn status(&mut self, name: &str) -> Option<ServerStatus> {
        self.servers.get_mut(name).map(|managed| ServerStatus {
            name: name.to_string(),
            launcher: managed.handle.label().to_string(),
            state: managed.handle.state(),
            pid: managed.handle.pid(),
        })
    }

    /// Status of every server, by name.
    pub fn list(&mut self) -> Vec<ServerStatus> {
        let names: Vec<String> = self.servers.keys().cloned().collect();
        names.iter().filter_map(|name| self.status(name)).collect()
    }

    /// Stop and forget one server. Returns false if the name is unknown.
    pub async fn stop(&mut self, name: &str) -> bool {
        match self.servers.remove(name) {
            Some(mut managed) => {
                managed.rpc.close().await;
                managed.handle.terminate().await;
                true
            }
            None => {
                warn!(server = %name, "Stop requested for unknown server");
                false
            }
        }
    }

    /// Stop every server.
    pub async fn stop_all(&mut self) {
        let names: Vec<String> = self.servers.keys().cloned().collect();
        for name in names {
            self.stop(&name).await;
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
