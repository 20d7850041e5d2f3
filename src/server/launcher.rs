// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Supervised background servers.
//!
//! A [`ServerLauncher`] starts a context server either as a child process
//! (speaking NDJSON over its stdin/stdout) or as a tokio task over an
//! in-memory duplex pipe. Both yield a [`ServerHandle`] with explicit
//! lifecycle states and a [`Transport`] for the client side.
//!
//! ```text
//!   launch() ──► Starting ──mark_ready()──► Ready
//!                   │                         │
//!                   └──── terminate() / exit ─┴──► Terminated
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ContextServer;
use crate::error::{ConfigError, ProtocolError};
use crate::protocol::Credentials;

/// Buffer size of the in-process duplex pipe.
const DUPLEX_BUFFER: usize = 64 * 1024;

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Client side of a launched server's channel.
pub struct Transport {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transport")
    }
}

/// Command line for a subprocess server. Treated as opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Environment variable that receives the credential token, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    /// Pass the child's stderr through instead of discarding it.
    #[serde(default)]
    pub inherit_stderr: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn token_env(mut self, name: impl Into<String>) -> Self {
        self.token_env = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::MissingField("command".to_string()));
        }
        Ok(())
    }

    /// Human-readable command line.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self, credentials: Option<&Credentials>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if self.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let (Some(var), Some(token)) = (&self.token_env, credentials) {
            cmd.env(var, token.expose());
        }
        cmd
    }
}

/// How to start a background server.
#[derive(Clone)]
pub enum ServerLauncher {
    /// Spawn a child process.
    Command(CommandSpec),
    /// Run a server on a tokio task in this process.
    InProcess(Arc<ContextServer>),
}

impl ServerLauncher {
    /// Short description for logs.
    pub fn label(&self) -> String {
        match self {
            Self::Command(spec) => spec.display(),
            Self::InProcess(server) => format!("in-process:{}", server.name()),
        }
    }

    /// Start the server. The handle starts in [`ServerState::Starting`].
    pub async fn launch(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<(ServerHandle, Transport), ProtocolError> {
        let label = self.label();
        match self {
            Self::Command(spec) => {
                spec.validate()
                    .map_err(|e| ProtocolError::connection(&label, e.to_string()))?;

                let mut child = spec.command(credentials).spawn().map_err(|e| {
                    ProtocolError::connection(&label, format!("Failed to spawn {}: {}", spec.program, e))
                })?;

                let stdin = child.stdin.take().ok_or_else(|| {
                    ProtocolError::connection(&label, "Failed to get stdin")
                })?;
                let stdout = child.stdout.take().ok_or_else(|| {
                    ProtocolError::connection(&label, "Failed to get stdout")
                })?;

                info!(command = %label, pid = ?child.id(), "Launched server process");
                let handle = ServerHandle::new(label, Supervised::Child(child));
                let transport = Transport {
                    reader: Box::new(stdout),
                    writer: Box::new(stdin),
                };
                Ok((handle, transport))
            }
            Self::InProcess(server) => {
                let (client_io, server_io) = tokio::io::duplex(DUPLEX_BUFFER);
                let (server_read, server_write) = tokio::io::split(server_io);
                let task = tokio::spawn(Arc::clone(server).serve(server_read, server_write));

                debug!(server = %server.name(), "Launched in-process server");
                let (client_read, client_write) = tokio::io::split(client_io);
                let handle = ServerHandle::new(label, Supervised::Task(task));
                let transport = Transport {
                    reader: Box::new(client_read),
                    writer: Box::new(client_write),
                };
                Ok((handle, transport))
            }
        }
    }
}

impl fmt::Debug for ServerLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(spec) => f.debug_tuple("Command").field(spec).finish(),
            Self::InProcess(server) => f.debug_tuple("InProcess").field(&server.name()).finish(),
        }
    }
}

/// Lifecycle state of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Launched, handshake not yet complete.
    Starting,
    /// Handshake complete, accepting requests.
    Ready,
    /// Stopped or exited.
    Terminated,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

enum Supervised {
    Child(Child),
    Task(JoinHandle<Result<(), ProtocolError>>),
}

/// Owned handle to a running background server.
pub struct ServerHandle {
    label: String,
    state: ServerState,
    process: Supervised,
}

impl ServerHandle {
    fn new(label: String, process: Supervised) -> Self {
        Self {
            label,
            state: ServerState::Starting,
            process,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current state, noticing an unexpected exit.
    pub fn state(&mut self) -> ServerState {
        if self.state != ServerState::Terminated && self.has_exited() {
            warn!(server = %self.label, "Server exited");
            self.state = ServerState::Terminated;
        }
        self.state
    }

    /// Record a completed handshake.
    pub fn mark_ready(&mut self) {
        if self.state == ServerState::Starting {
            self.state = ServerState::Ready;
        }
    }

    /// OS process id, for child-process servers.
    pub fn pid(&self) -> Option<u32> {
        match &self.process {
            Supervised::Child(child) => child.id(),
            Supervised::Task(_) => None,
        }
    }

    fn has_exited(&mut self) -> bool {
        match &mut self.process {
            Supervised::Child(child) => !matches!(child.try_wait(), Ok(None)),
            Supervised::Task(task) => task.is_finished(),
        }
    }

    /// Stop the server. Idempotent.
    pub async fn terminate(&mut self) {
        if self.state == ServerState::Terminated {
            return;
        }
        match &mut self.process {
            Supervised::Child(child) => {
                if let Err(e) = child.start_kill() {
                    debug!(server = %self.label, error = %e, "Kill failed, process may have exited");
                }
                let _ = child.wait().await;
            }
            Supervised::Task(task) => task.abort(),
        }
        info!(server = %self.label, "Server terminated");
        self.state = ServerState::Terminated;
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("label", &self.label)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .finish()
    }
}
