// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client-side session plumbing.
//!
//! [`RpcConnection`] multiplexes requests over one NDJSON transport. Every
//! outgoing request gets a fresh correlation id and a oneshot slot in the
//! pending map; the reader task completes whichever slot the response's id
//! names, so responses may arrive in any order.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::ProtocolError;
use crate::server::envelope::{decode, encode, Method, Request, Response};
use crate::server::Transport;
use crate::tools::ToolDefinition;

type PendingMap = Arc<std::sync::Mutex<HashMap<String, oneshot::Sender<Response>>>>;

fn lock_pending(
    pending: &PendingMap,
) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Response>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns one entry of the pending map and removes it on drop, so a request
/// future cancelled from outside (an enclosing timeout, a dropped task)
/// leaves nothing behind.
struct PendingSlot {
    pending: PendingMap,
    id: String,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        lock_pending(&self.pending).remove(&self.id);
    }
}

/// Snapshot of a context-protocol session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub endpoint: String,
    pub available_tools: BTreeSet<String>,
    pub pending_correlation_ids: BTreeSet<String>,
}

/// Result of the `initialize` handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerHello {
    pub protocol_version: String,
    #[serde(default)]
    pub server_capabilities: serde_json::Value,
}

impl ServerHello {
    /// Server name, if it reported one.
    pub fn server_name(&self) -> Option<&str> {
        self.server_capabilities.get("name").and_then(|n| n.as_str())
    }
}

/// A request/response channel to one server.
pub struct RpcConnection {
    tx: mpsc::Sender<String>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl RpcConnection {
    /// Start the reader and writer tasks over a transport.
    pub fn start(transport: Transport) -> Self {
        let Transport { reader, mut writer } = transport;
        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let (tx, mut rx) = mpsc::channel::<String>(100);
        let writer_closed = Arc::clone(&closed);
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if writer.write_all(msg.as_bytes()).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
            writer_closed.store(true, Ordering::SeqCst);
        });

        let reader_task = tokio::spawn(Self::read_responses(
            BufReader::new(reader),
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Self {
            tx,
            pending,
            closed,
            reader_task,
            writer_task,
        }
    }

    async fn read_responses(
        mut reader: BufReader<crate::server::launcher::BoxedReader>,
        pending: PendingMap,
        closed: Arc<AtomicBool>,
    ) {
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("Server closed the connection");
                    break;
                }
                Ok(_) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match decode::<Response>(&line) {
                        Ok(response) => {
                            let slot = lock_pending(&pending).remove(&response.id);
                            match slot {
                                Some(tx) => {
                                    let _ = tx.send(response);
                                }
                                None => trace!(id = %response.id, "Dropping response with no pending request"),
                            }
                        }
                        Err(e) => warn!("Failed to parse response: {}", e),
                    }
                }
                Err(e) => {
                    error!("Error reading from server: {}", e);
                    break;
                }
            }
        }

        closed.store(true, Ordering::SeqCst);
        // Waiters see a closed channel instead of running into their timeout.
        lock_pending(&pending).clear();
    }

    /// Whether the server side has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response.
    ///
    /// A timeout returns [`ProtocolError::Timeout`]; the connection stays
    /// usable and a late response is dropped. The pending slot is released
    /// however the call ends, including when the future itself is dropped.
    pub async fn request(
        &self,
        method: Method,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::NotConnected("server connection closed".to_string()));
        }

        let request = Request::new(method, params);
        let id = request.id.clone();
        let msg = encode(&request)?;

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id.clone(), tx);
        let _slot = PendingSlot {
            pending: Arc::clone(&self.pending),
            id: id.clone(),
        };

        trace!(id = %id, method = %method, "Sending request");
        if self.tx.send(msg).await.is_err() {
            return Err(ProtocolError::Transport("Failed to send request".to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response.into_result().map_err(ProtocolError::Remote),
            Ok(Err(_)) => Err(ProtocolError::Transport("Connection closed before response".to_string())),
            Err(_) => {
                warn!(id = %id, method = %method, "Request timed out");
                Err(ProtocolError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Run the `initialize` handshake.
    pub async fn initialize(&self, timeout: Duration) -> Result<ServerHello, ProtocolError> {
        let result = self
            .request(
                Method::Initialize,
                serde_json::json!({ "client": "agentlink", "version": crate::VERSION }),
                timeout,
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Fetch the server's tool definitions.
    pub async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolDefinition>, ProtocolError> {
        let result = self
            .request(Method::ListTools, serde_json::json!({}), timeout)
            .await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| ProtocolError::InvalidResponse("list_tools result has no tools".to_string()))?;
        Ok(serde_json::from_value(tools)?)
    }

    /// Run a tool on the server.
    pub async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, ProtocolError> {
        self.request(
            Method::CallTool,
            serde_json::json!({ "name": name, "args": args }),
            timeout,
        )
        .await
    }

    /// Correlation ids still waiting for a response.
    pub async fn pending_ids(&self) -> BTreeSet<String> {
        lock_pending(&self.pending).keys().cloned().collect()
    }

    /// Stop both tasks and discard pending requests.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader_task.abort();
        self.writer_task.abort();
        let discarded = {
            let mut pending = lock_pending(&self.pending);
            let count = pending.len();
            pending.clear();
            count
        };
        if discarded > 0 {
            debug!(discarded, "Discarded pending requests");
        }
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}
