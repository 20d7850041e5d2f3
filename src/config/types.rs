// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration file structure.
//!
//! ```yaml
//! default_timeout_ms: 30000
//! protocols:
//!   - kind: process_context
//!     endpoint: mcp://github
//!     command: agentlink
//!     args: [serve, --github]
//!     credentials_env: GITHUB_TOKEN
//!     token_env: GITHUB_TOKEN
//!   - kind: peer
//!     endpoint: a2a://local
//!     agent_id: coordinator
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::protocol::{ProtocolType, DEFAULT_TIMEOUT_MS};

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Timeout for entries that do not set their own.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default)]
    pub protocols: Vec<ProtocolEntry>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            protocols: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Simulated context client plus a peer client, used when no file exists.
    pub fn example() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            protocols: vec![
                ProtocolEntry::SimulatedContext(SimulatedContextEntry {
                    endpoint: "mcp://github:8080".to_string(),
                    tools: None,
                    timeout_ms: None,
                }),
                ProtocolEntry::Peer(PeerEntry {
                    endpoint: "a2a://local".to_string(),
                    agent_id: "coordinator".to_string(),
                    peers: None,
                    timeout_ms: None,
                }),
            ],
        }
    }
}

/// One protocol instance to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolEntry {
    SimulatedContext(SimulatedContextEntry),
    ProcessContext(ProcessContextEntry),
    Peer(PeerEntry),
}

impl ProtocolEntry {
    pub fn protocol_type(&self) -> ProtocolType {
        match self {
            Self::SimulatedContext(_) | Self::ProcessContext(_) => ProtocolType::ContextSharing,
            Self::Peer(_) => ProtocolType::PeerToPeer,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::SimulatedContext(entry) => &entry.endpoint,
            Self::ProcessContext(entry) => &entry.endpoint,
            Self::Peer(entry) => &entry.endpoint,
        }
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            Self::SimulatedContext(entry) => entry.timeout_ms,
            Self::ProcessContext(entry) => entry.timeout_ms,
            Self::Peer(entry) => entry.timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedContextEntry {
    pub endpoint: String,

    /// Overrides the built-in tool list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A context-protocol server run as a child process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessContextEntry {
    pub endpoint: String,

    /// Program to launch.
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// How long the launch and handshake may take.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_timeout_ms: Option<u64>,

    /// Variable the child receives the credential token in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Variable the credential token is read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub endpoint: String,

    pub agent_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_entries_parse() {
        let yaml = r#"
protocols:
  - kind: process_context
    endpoint: mcp://github
    command: agentlink
    args: [serve, --github]
  - kind: peer
    endpoint: a2a://local
    agent_id: me
    peers: [a, b]
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.protocols.len(), 2);
        match &config.protocols[0] {
            ProtocolEntry::ProcessContext(entry) => {
                assert_eq!(entry.command, "agentlink");
                assert_eq!(entry.args, vec!["serve", "--github"]);
            }
            other => panic!("unexpected entry: {other:?}"),
        }
        assert_eq!(config.protocols[1].protocol_type(), ProtocolType::PeerToPeer);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"protocols": [{"kind": "carrier_pigeon", "endpoint": "x"}]}"#;
        assert!(serde_json::from_str::<AppConfig>(json).is_err());
    }

    #[test]
    fn test_example_round_trips_through_json() {
        let example = AppConfig::example();
        let text = serde_json::to_string(&example).unwrap();
        assert!(text.contains(r#""kind":"simulated_context""#));
        assert_eq!(serde_json::from_str::<AppConfig>(&text).unwrap(), example);
    }
}
