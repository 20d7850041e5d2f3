// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context-protocol client backed by a supervised background server.
//!
//! `connect()` launches the server (child process or in-process task), runs
//! the `initialize` handshake and caches the tool list. Requests are
//! correlated by id so several may be in flight at once. A timed-out request
//! yields an error result but leaves the server running; only
//! `disconnect()` terminates it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::session::{RpcConnection, ServerHello, SessionState};
use crate::error::{ConfigError, ProtocolError};
use crate::protocol::{Capabilities, InvokeRequest, Protocol, ProtocolConfig, ProtocolType};
use crate::server::{ServerHandle, ServerLauncher, ServerState, PROTOCOL_VERSION};

/// Default time allowed for launch plus handshake.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// State that exists only while connected.
struct LiveSession {
    handle: ServerHandle,
    rpc: Arc<RpcConnection>,
    hello: ServerHello,
    tools: BTreeSet<String>,
}

/// Subprocess-backed context-protocol client.
pub struct ProcessContextClient {
    config: ProtocolConfig,
    launcher: ServerLauncher,
    startup_timeout: Duration,
    connected: AtomicBool,
    /// Serializes connect/disconnect.
    lifecycle: Mutex<()>,
    live: RwLock<Option<LiveSession>>,
    /// Connection of the live session, readable without awaiting so
    /// `is_connected` can notice a server that went away.
    watched: std::sync::Mutex<Option<Arc<RpcConnection>>>,
    last_error: std::sync::Mutex<Option<String>>,
}

impl ProcessContextClient {
    pub fn new(config: ProtocolConfig, launcher: ServerLauncher) -> Result<Self, ConfigError> {
        config.validate_for(ProtocolType::ContextSharing)?;
        if let ServerLauncher::Command(ref spec) = launcher {
            spec.validate()?;
        }
        Ok(Self {
            config,
            launcher,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            connected: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            live: RwLock::new(None),
            watched: std::sync::Mutex::new(None),
            last_error: std::sync::Mutex::new(None),
        })
    }

    /// Set the time allowed for launch plus handshake.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn launcher(&self) -> &ServerLauncher {
        &self.launcher
    }

    /// Lifecycle state of the background server, if one was launched.
    pub async fn server_state(&self) -> Option<ServerState> {
        self.live
            .write()
            .await
            .as_mut()
            .map(|live| live.handle.state())
    }

    /// OS process id of the background server, if it is a child process.
    pub async fn server_pid(&self) -> Option<u32> {
        self.live.read().await.as_ref().and_then(|live| live.handle.pid())
    }

    /// Current session snapshot.
    pub async fn session_state(&self) -> SessionState {
        let live = self.live.read().await;
        match live.as_ref() {
            Some(live) => SessionState {
                endpoint: self.config.endpoint.clone(),
                available_tools: live.tools.clone(),
                pending_correlation_ids: live.rpc.pending_ids().await,
            },
            None => SessionState {
                endpoint: self.config.endpoint.clone(),
                ..Default::default()
            },
        }
    }

    fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(endpoint = %self.config.endpoint, error = %message, "Context server error");
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(message);
        }
    }

    async fn establish(&self) -> Result<LiveSession, ProtocolError> {
        let (mut handle, transport) = self.launcher.launch(self.config.credentials.as_ref()).await?;
        let rpc = Arc::new(RpcConnection::start(transport));

        let handshake = async {
            let hello = rpc.initialize(self.startup_timeout).await?;
            let tools = rpc.list_tools(self.startup_timeout).await?;
            Ok::<_, ProtocolError>((hello, tools))
        };

        match handshake.await {
            Ok((hello, tools)) => {
                handle.mark_ready();
                Ok(LiveSession {
                    handle,
                    rpc,
                    hello,
                    tools: tools.into_iter().map(|t| t.name).collect(),
                })
            }
            Err(err) => {
                rpc.close().await;
                handle.terminate().await;
                Err(err)
            }
        }
    }

    fn watch(&self, rpc: Option<Arc<RpcConnection>>) {
        if let Ok(mut slot) = self.watched.lock() {
            *slot = rpc;
        }
    }

    async fn teardown(&self) {
        let live = self.live.write().await.take();
        self.connected.store(false, Ordering::SeqCst);
        self.watch(None);
        if let Some(mut live) = live {
            live.rpc.close().await;
            live.handle.terminate().await;
        }
    }

    async fn live_rpc(&self) -> Result<Arc<RpcConnection>, ProtocolError> {
        let rpc = self
            .live
            .read()
            .await
            .as_ref()
            .map(|live| Arc::clone(&live.rpc))
            .ok_or_else(|| ProtocolError::NotConnected(self.config.endpoint.clone()))?;

        if rpc.is_closed() {
            self.connected.store(false, Ordering::SeqCst);
            self.record_error("background server exited");
            return Err(ProtocolError::NotConnected(format!(
                "{}: background server exited",
                self.config.endpoint
            )));
        }
        Ok(rpc)
    }
}

#[async_trait]
impl Protocol for ProcessContextClient {
    fn protocol_type(&self) -> ProtocolType {
        self.config.protocol_type
    }

    fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// False once the server side of the live session has closed, so the
    /// next `invoke` relaunches instead of failing first.
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && self
                .watched
                .lock()
                .ok()
                .and_then(|slot| slot.as_ref().map(|rpc| !rpc.is_closed()))
                .unwrap_or(false)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    async fn connect(&self) -> bool {
        let _guard = self.lifecycle.lock().await;

        if self.is_connected() {
            let alive = self
                .live
                .read()
                .await
                .as_ref()
                .is_some_and(|live| !live.rpc.is_closed());
            if alive {
                return true;
            }
        }

        // Clear out a server that died since the last call.
        self.teardown().await;

        match self.establish().await {
            Ok(live) => {
                info!(
                    server = %self.launcher.label(),
                    tools = live.tools.len(),
                    protocol_version = %live.hello.protocol_version,
                    "Connected to context server"
                );
                self.watch(Some(Arc::clone(&live.rpc)));
                *self.live.write().await = Some(live);
                self.connected.store(true, Ordering::SeqCst);
                true
            }
            Err(err) => {
                self.record_error(err.to_string());
                false
            }
        }
    }

    async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        if self.live.read().await.is_some() {
            debug!(endpoint = %self.config.endpoint, "Disconnecting context server");
        }
        self.teardown().await;
    }

    async fn capabilities(&self) -> Capabilities {
        let live = self.live.read().await;
        let mut caps = match live.as_ref().filter(|_| self.is_connected()) {
            Some(live) => {
                let mut caps = Capabilities::new("context_sharing", live.hello.protocol_version.clone())
                    .with_tools(live.tools.iter().cloned());
                if let Some(name) = live.hello.server_name() {
                    caps.extra.insert("server_name".to_string(), json!(name));
                }
                caps
            }
            None => Capabilities::new("context_sharing", PROTOCOL_VERSION).with_tools(Vec::<String>::new()),
        };
        caps.context_sharing = Some(true);
        caps.session_management = Some(true);
        caps.background_server = Some(true);
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
        let rpc = self.live_rpc().await?;
        let timeout = self.config.timeout();

        match request.tool {
            Some(name) => {
                let result = rpc.call_tool(&name, request.args, timeout).await?;
                Ok(json!({
                    "tool": name,
                    "tool_result": result,
                    "tools_used": [name],
                }))
            }
            None => {
                let tools: Vec<String> = rpc
                    .list_tools(timeout)
                    .await?
                    .into_iter()
                    .map(|t| t.name)
                    .collect();
                Ok(json!({
                    "context_data": format!(
                        "{} offers {} tools for '{}': {}",
                        self.launcher.label(),
                        tools.len(),
                        request.query,
                        tools.join(", ")
                    ),
                    "available_tools": tools,
                }))
            }
        }
    }
}

impl std::fmt::Debug for ProcessContextClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContextClient")
            .field("config", &self.config)
            .field("launcher", &self.launcher)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
