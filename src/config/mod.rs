// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration files and protocol construction.
//!
//! Configuration is searched for in this order:
//! - `agentlink.json`, `agentlink.yaml`, `agentlink.yml` in the given directory
//! - `~/.agentlink/config.json`
//!
//! Credentials are never stored in the file. An entry names the environment
//! variable the token is read from (`credentials_env`).

mod loader;
mod types;

pub use loader::{
    find_config_file, global_config_path, load_config, load_config_file, CONFIG_FILES,
    GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};
pub use types::{
    AppConfig, PeerEntry, ProcessContextEntry, ProtocolEntry, SimulatedContextEntry,
};

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::context::{ProcessContextClient, SimulatedContextClient};
use crate::error::ConfigError;
use crate::peer::PeerClient;
use crate::protocol::{Protocol, ProtocolConfig};
use crate::server::{CommandSpec, ServerLauncher};

/// Build one protocol instance per entry, in file order.
///
/// Nothing is connected here. Malformed entries fail the whole build.
pub fn build_protocols(config: &AppConfig) -> Result<Vec<Arc<dyn Protocol>>, ConfigError> {
    config
        .protocols
        .iter()
        .map(|entry| build_protocol(entry, config.default_timeout_ms))
        .collect()
}

fn build_protocol(
    entry: &ProtocolEntry,
    default_timeout_ms: u64,
) -> Result<Arc<dyn Protocol>, ConfigError> {
    let mut protocol_config = ProtocolConfig::new(entry.protocol_type(), entry.endpoint());
    protocol_config.timeout_ms = entry.timeout_ms().unwrap_or(default_timeout_ms);

    let protocol: Arc<dyn Protocol> = match entry {
        ProtocolEntry::SimulatedContext(entry) => {
            let mut client = SimulatedContextClient::with_config(protocol_config)?;
            if let Some(ref tools) = entry.tools {
                client = client.with_tools(tools.iter().cloned());
            }
            Arc::new(client)
        }
        ProtocolEntry::ProcessContext(entry) => {
            if let Some(ref var) = entry.credentials_env {
                match std::env::var(var) {
                    Ok(token) => protocol_config = protocol_config.with_credentials(token),
                    Err(_) => warn!(variable = %var, "Credential variable is not set"),
                }
            }

            let mut spec = CommandSpec::new(&entry.command).args(entry.args.iter().cloned());
            spec.env = entry.env.clone();
            spec.cwd = entry.cwd.clone();
            spec.token_env = entry.token_env.clone();

            let mut client = ProcessContextClient::new(protocol_config, ServerLauncher::Command(spec))?;
            if let Some(ms) = entry.startup_timeout_ms {
                client = client.with_startup_timeout(Duration::from_millis(ms));
            }
            Arc::new(client)
        }
        ProtocolEntry::Peer(entry) => {
            let mut client = PeerClient::with_config(protocol_config, &entry.agent_id)?;
            if let Some(ref peers) = entry.peers {
                client = client.with_peers(peers.iter().cloned());
            }
            Arc::new(client)
        }
    };
    Ok(protocol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolType;

    #[test]
    fn test_build_example() {
        let protocols = build_protocols(&AppConfig::example()).unwrap();
        let types: Vec<_> = protocols.iter().map(|p| p.protocol_type()).collect();
        assert_eq!(types, vec![ProtocolType::ContextSharing, ProtocolType::PeerToPeer]);
        assert!(protocols.iter().all(|p| !p.is_connected()));
    }

    #[test]
    fn test_default_timeout_applies() {
        let config: AppConfig = serde_json::from_str(
            r#"{"default_timeout_ms": 1234, "protocols": [
                {"kind": "peer", "endpoint": "a2a://x", "agent_id": "me"},
                {"kind": "simulated_context", "endpoint": "mcp://y", "timeout_ms": 50}
            ]}"#,
        )
        .unwrap();

        let protocols = build_protocols(&config).unwrap();
        assert_eq!(protocols[0].config().timeout_ms, 1234);
        assert_eq!(protocols[1].config().timeout_ms, 50);
    }

    #[test]
    fn test_credentials_read_from_env() {
        std::env::set_var("AGENTLINK_TEST_TOKEN_BUILD", "s3cret");
        let config: AppConfig = serde_json::from_str(
            r#"{"protocols": [{"kind": "process_context", "endpoint": "mcp://gh",
                "command": "agentlink", "args": ["serve"],
                "credentials_env": "AGENTLINK_TEST_TOKEN_BUILD", "token_env": "GITHUB_TOKEN"}]}"#,
        )
        .unwrap();

        let protocols = build_protocols(&config).unwrap();
        let credentials = protocols[0].config().credentials.as_ref().unwrap();
        assert_eq!(credentials.expose(), "s3cret");
        assert!(!format!("{:?}", protocols[0].config()).contains("s3cret"));
    }

    #[test]
    fn test_invalid_entries_fail() {
        let empty_command: AppConfig = serde_json::from_str(
            r#"{"protocols": [{"kind": "process_context", "endpoint": "mcp://gh", "command": " "}]}"#,
        )
        .unwrap();
        assert!(matches!(
            build_protocols(&empty_command),
            Err(ConfigError::MissingField(_))
        ));

        let empty_agent: AppConfig = serde_json::from_str(
            r#"{"protocols": [{"kind": "peer", "endpoint": "a2a://x", "agent_id": ""}]}"#,
        )
        .unwrap();
        assert!(build_protocols(&empty_agent).is_err());
    }
}
