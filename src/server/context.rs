// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context-protocol server.
//!
//! The server reads newline-delimited [`Request`]s, dispatches them against
//! its [`ToolRegistry`] and writes one [`Response`] per request. Each request
//! runs on its own task so a slow tool never holds up responses to others;
//! responses are funnelled through a single writer task and may leave in a
//! different order than requests arrived.

use std::any::Any;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, instrument, warn};

use super::envelope::{decode, encode, Method, Request, Response, PROTOCOL_VERSION};
use crate::error::{ProtocolError, ToolError};
use crate::tools::{ParameterSchema, ToolDefinition, ToolHandler, ToolRegistry, ToolSpec};

/// Parameters of a `call_tool` request.
#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// A context-protocol server backed by a tool registry.
pub struct ContextServer {
    name: String,
    version: String,
    registry: RwLock<ToolRegistry>,
}

impl ContextServer {
    /// Create a server with an empty registry.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(name, ToolRegistry::new())
    }

    /// Create a server around a prepared registry.
    pub fn with_registry(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            version: crate::VERSION.to_string(),
            registry: RwLock::new(registry),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Register a tool. Safe to call while the server is serving; fails on a
    /// duplicate name.
    pub async fn register_tool(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: ParameterSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolError> {
        self.registry
            .write()
            .await
            .register(name, description, parameter_schema, handler)
    }

    /// Insert or overwrite a tool.
    pub async fn replace_tool(&self, spec: ToolSpec) -> Option<ToolSpec> {
        self.registry.write().await.replace(spec)
    }

    /// Tool definitions in registration order.
    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        self.registry.read().await.definitions()
    }

    /// Tool names in registration order.
    pub async fn tool_names(&self) -> Vec<String> {
        self.registry.read().await.names()
    }

    /// Handle one request. Never fails: every problem becomes an error
    /// response echoing the request id.
    #[instrument(skip(self, request), fields(server = %self.name, method = %request.method, id = %request.id))]
    pub async fn process_request(&self, request: Request) -> Response {
        let Request { method, params, id } = request;

        let method = match method.parse::<Method>() {
            Ok(method) => method,
            Err(message) => {
                warn!("{}", message);
                return Response::err(id, message);
            }
        };

        match method {
            Method::Initialize => Response::ok(id, self.initialize().await),
            Method::ListTools => {
                let tools = self.list_tools().await;
                Response::ok(id, serde_json::json!({ "tools": tools }))
            }
            Method::CallTool => match self.call_tool(params).await {
                Ok(value) => Response::ok(id, value),
                Err(err) => Response::err(id, err.to_string()),
            },
        }
    }

    /// Decode and handle one wire line.
    pub async fn handle_line(&self, line: &str) -> Response {
        match decode::<Request>(line) {
            Ok(request) => self.process_request(request).await,
            Err(err) => {
                let id = serde_json::from_str::<serde_json::Value>(line.trim())
                    .ok()
                    .and_then(|value| value.get("id").and_then(|id| id.as_str()).map(String::from))
                    .unwrap_or_default();
                warn!(error = %err, "Malformed request");
                Response::err(id, format!("Invalid request: {err}"))
            }
        }
    }

    async fn initialize(&self) -> serde_json::Value {
        let tools = self.tool_names().await;
        serde_json::json!({
            "protocol_version": PROTOCOL_VERSION,
            "server_capabilities": {
                "name": self.name,
                "version": self.version,
                "tools": tools,
                "context_sharing": true,
                "session_management": true,
            }
        })
    }

    async fn call_tool(&self, params: serde_json::Value) -> Result<serde_json::Value, ProtocolError> {
        let CallToolParams { name, args } = serde_json::from_value(params)
            .map_err(|err| ProtocolError::InvalidResponse(format!("Invalid call_tool params: {err}")))?;

        // Release the registry lock before running the handler.
        let spec = match self.registry.read().await.get(&name) {
            Some(spec) => spec.clone(),
            None => return Err(ProtocolError::UnknownTool(name)),
        };

        let args = if args.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            args
        };

        // A separate task turns a handler panic into a JoinError.
        match tokio::spawn(async move { spec.run(args).await }).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ProtocolError::handler(name, err.to_string())),
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "handler task was cancelled".to_string()
                };
                error!(tool = %name, error = %message, "Tool handler panicked");
                Err(ProtocolError::handler(name, message))
            }
        }
    }

    /// Serve requests from `reader`, writing responses to `writer`, until the
    /// reader reaches EOF. In-flight requests finish before this returns.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!(server = %self.name, "Context server started");

        let (tx, mut rx) = mpsc::channel::<String>(100);

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(line) = rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        });

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut read_error = None;

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!(server = %self.name, "Input closed");
                    break;
                }
                Ok(_) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let server = Arc::clone(&self);
                    let tx = tx.clone();
                    let request_line = line.clone();
                    tokio::spawn(async move {
                        let response = server.handle_line(&request_line).await;
                        match encode(&response) {
                            Ok(encoded) => {
                                if tx.send(encoded).await.is_err() {
                                    warn!("Response channel closed");
                                }
                            }
                            Err(e) => error!("Failed to encode response: {}", e),
                        }
                    });
                }
                Err(e) => {
                    error!("Error reading request: {}", e);
                    read_error = Some(ProtocolError::from(e));
                    break;
                }
            }
        }

        // Writer exits once every in-flight request has dropped its sender.
        drop(tx);
        let _ = writer_task.await;
        info!(server = %self.name, "Context server stopped");

        match read_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Serve on the process's stdin/stdout.
    pub async fn serve_stdio(self: Arc<Self>) -> Result<(), ProtocolError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }
}

impl std::fmt::Debug for ContextServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextServer")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{handler_fn, ParamType};
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::duplex;

    async fn explode(_args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        panic!("kaboom")
    }

    fn text_schema() -> ParameterSchema {
        [("text".to_string(), ParamType::String)].into()
    }

    async fn echo_server() -> ContextServer {
        let server = ContextServer::new("test-server");
        server
            .register_tool(
                "echo",
                "Echo the text argument",
                text_schema(),
                handler_fn(|args| async move { Ok(args["text"].clone()) }),
            )
            .await
            .unwrap();
        server
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = echo_server().await;
        let response = server
            .process_request(Request::with_id(Method::Initialize, json!({}), "1"))
            .await;

        assert_eq!(response.id, "1");
        let result = response.result.unwrap();
        assert_eq!(result["protocol_version"], "1.0");
        assert_eq!(result["server_capabilities"]["name"], "test-server");
        assert_eq!(result["server_capabilities"]["tools"], json!(["echo"]));
    }

    #[tokio::test]
    async fn test_list_tools() {
        let server = echo_server().await;
        server
            .register_tool(
                "count",
                "Count things",
                [("n".to_string(), ParamType::Integer)].into(),
                handler_fn(|_| async { Ok(json!(0)) }),
            )
            .await
            .unwrap();

        let response = server
            .process_request(Request::with_id(Method::ListTools, json!({}), "2"))
            .await;
        let tools = &response.result.unwrap()["tools"];

        assert_eq!(tools.as_array().unwrap().len(), 2);
        assert_eq!(tools[0]["name"], "echo");
        assert_eq!(tools[0]["description"], "Echo the text argument");
        assert_eq!(tools[0]["parameter_schema"]["text"], "string");
        assert_eq!(tools[1]["name"], "count");
    }

    #[tokio::test]
    async fn test_call_tool_echo() {
        let server = echo_server().await;
        let request = Request::with_id(
            Method::CallTool,
            json!({"name": "echo", "args": {"text": "hi"}}),
            "7",
        );

        let response = server.process_request(request).await;
        assert_eq!(response, Response::ok("7", json!("hi")));
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let server = echo_server().await;
        let request = Request::with_id(Method::CallTool, json!({"name": "missing_tool"}), "3");

        let response = server.process_request(request).await;
        assert_eq!(response.id, "3");
        assert!(response.error.unwrap().contains("missing_tool"));
    }

    #[tokio::test]
    async fn test_handler_error_is_wrapped() {
        let server = ContextServer::new("test");
        server
            .register_tool(
                "fail",
                "Always fails",
                ParameterSchema::new(),
                handler_fn(|_| async { Err(ToolError::ExecutionFailed("disk on fire".to_string())) }),
            )
            .await
            .unwrap();

        let response = server
            .process_request(Request::with_id(Method::CallTool, json!({"name": "fail"}), "4"))
            .await;
        let error = response.error.unwrap();
        assert!(error.contains("fail"));
        assert!(error.contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_crash_server() {
        let server = echo_server().await;
        server
            .register_tool(
                "explode",
                "Panics",
                ParameterSchema::new(),
                handler_fn(explode),
            )
            .await
            .unwrap();

        let response = server
            .process_request(Request::with_id(Method::CallTool, json!({"name": "explode"}), "5"))
            .await;
        assert!(response.error.unwrap().contains("kaboom"));

        let response = server
            .process_request(Request::with_id(
                Method::CallTool,
                json!({"name": "echo", "args": {"text": "still here"}}),
                "6",
            ))
            .await;
        assert_eq!(response.result, Some(json!("still here")));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = echo_server().await;
        let request = Request {
            method: "shutdown".to_string(),
            params: json!({}),
            id: "9".to_string(),
        };
        let response = server.process_request(request).await;
        assert_eq!(response.id, "9");
        assert!(response.error.unwrap().contains("shutdown"));
    }

    #[tokio::test]
    async fn test_malformed_line_keeps_id() {
        let server = echo_server().await;
        let response = server.handle_line(r#"{"id":"10","params":{}}"#).await;
        assert_eq!(response.id, "10");
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_serve_answers_out_of_order() {
        let server = Arc::new(ContextServer::new("concurrent"));
        server
            .register_tool(
                "slow",
                "Sleeps",
                ParameterSchema::new(),
                handler_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(json!("slow"))
                }),
            )
            .await
            .unwrap();
        server
            .register_tool(
                "fast",
                "Returns at once",
                ParameterSchema::new(),
                handler_fn(|_| async { Ok(json!("fast")) }),
            )
            .await
            .unwrap();

        let (client, server_io) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let serve = tokio::spawn(Arc::clone(&server).serve(server_read, server_write));

        let (client_read, mut client_write) = tokio::io::split(client);
        let slow = Request::with_id(Method::CallTool, json!({"name": "slow"}), "a");
        let fast = Request::with_id(Method::CallTool, json!({"name": "fast"}), "b");
        client_write
            .write_all(encode(&slow).unwrap().as_bytes())
            .await
            .unwrap();
        client_write
            .write_all(encode(&fast).unwrap().as_bytes())
            .await
            .unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let first: Response = decode(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: Response = decode(&lines.next_line().await.unwrap().unwrap()).unwrap();

        assert_eq!(first.id, "b");
        assert_eq!(second.id, "a");
        assert_eq!(second.result, Some(json!("slow")));

        client_write.shutdown().await.unwrap();
        serve.await.unwrap().unwrap();
    }
}
