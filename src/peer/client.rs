// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Peer protocol client.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::{ConfigError, ProtocolError};
use crate::protocol::{Capabilities, InvokeRequest, Protocol, ProtocolConfig, ProtocolType};

/// Peers known to a client that was not given an explicit list.
pub const DEFAULT_PEERS: [&str; 3] = ["agent-1", "agent-2", "agent-3"];

/// Delivered messages kept for inspection; older ones are dropped first.
pub const MAX_MESSAGE_LOG: usize = 256;

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMessage {
    pub target: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Symmetric peer messaging client.
#[derive(Debug)]
pub struct PeerClient {
    config: ProtocolConfig,
    agent_id: String,
    peers: Vec<String>,
    connected: AtomicBool,
    sent: Mutex<VecDeque<PeerMessage>>,
}

impl PeerClient {
    /// Create a client for a peer network endpoint.
    pub fn new(endpoint: impl Into<String>, agent_id: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_config(ProtocolConfig::new(ProtocolType::PeerToPeer, endpoint), agent_id)
    }

    pub fn with_config(config: ProtocolConfig, agent_id: impl Into<String>) -> Result<Self, ConfigError> {
        config.validate_for(ProtocolType::PeerToPeer)?;
        let agent_id = agent_id.into();
        if agent_id.trim().is_empty() {
            return Err(ConfigError::MissingField("agent_id".to_string()));
        }
        Ok(Self {
            config,
            agent_id,
            peers: DEFAULT_PEERS.iter().map(|p| p.to_string()).collect(),
            connected: AtomicBool::new(false),
            sent: Mutex::new(VecDeque::new()),
        })
    }

    /// Replace the known peer list.
    pub fn with_peers<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.peers = peers.into_iter().map(Into::into).collect();
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Deliver one message and return the acknowledgement.
    pub async fn send_message(&self, target: &str, message: &str) -> String {
        debug!(from = %self.agent_id, to = %target, "Sending peer message");
        let mut sent = self.sent.lock().await;
        if sent.len() == MAX_MESSAGE_LOG {
            sent.pop_front();
        }
        sent.push_back(PeerMessage {
            target: target.to_string(),
            body: message.to_string(),
            sent_at: Utc::now(),
        });
        format!("Message delivered to {target}")
    }

    /// Send to every discovered peer, one after another.
    pub async fn broadcast_message(&self, message: &str) -> Vec<String> {
        let peers = self.discover_peers().await;
        let mut acks = Vec::with_capacity(peers.len());
        for peer in &peers {
            acks.push(self.send_message(peer, message).await);
        }
        acks
    }

    /// The most recent delivered messages, oldest first.
    pub async fn sent_messages(&self) -> Vec<PeerMessage> {
        self.sent.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl Protocol for PeerClient {
    fn protocol_type(&self) -> ProtocolType {
        self.config.protocol_type
    }

    fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> bool {
        if !self.connected.swap(true, Ordering::SeqCst) {
            info!(network = %self.config.endpoint, agent_id = %self.agent_id, "Joined peer network");
        }
        true
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(network = %self.config.endpoint, agent_id = %self.agent_id, "Left peer network");
        }
    }

    async fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::new("peer_to_peer", "1.0");
        caps.peer_communication = Some(true);
        caps.message_routing = Some(true);
        caps.agent_id = Some(self.agent_id.clone());
        caps
    }

    async fn discover_peers(&self) -> Vec<String> {
        self.peers.clone()
    }

    #[instrument(skip(self, request), fields(agent_id = %self.agent_id, target = ?request.target))]
    async fn handle_request(
        &self,
        request: InvokeRequest,
    ) -> Result<serde_json::Value, ProtocolError> {
        match request.target {
            Some(target) => {
                let ack = self.send_message(&target, &request.query).await;
                Ok(json!({
                    "message_sent": request.query,
                    "target": target,
                    "ack": ack,
                    "response_received": format!("Response from {target}: Received your message"),
                }))
            }
            None => {
                let acks = self.broadcast_message(&request.query).await;
                Ok(json!({
                    "message_sent": request.query,
                    "peers": self.peers,
                    "acks": acks,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_order_matches_discovery() {
        let client = PeerClient::new("a2a://local", "agent-0")
            .unwrap()
            .with_peers(["a", "b", "c"]);

        let acks = client.broadcast_message("hi").await;

        assert_eq!(
            acks,
            vec![
                "Message delivered to a",
                "Message delivered to b",
                "Message delivered to c"
            ]
        );
        let targets: Vec<_> = client
            .sent_messages()
            .await
            .into_iter()
            .map(|m| m.target)
            .collect();
        assert_eq!(targets, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_default_peers() {
        let client = PeerClient::new("a2a://local", "agent-0").unwrap();
        assert_eq!(client.discover_peers().await, vec!["agent-1", "agent-2", "agent-3"]);
    }

    #[tokio::test]
    async fn test_capabilities() {
        let client = PeerClient::new("a2a://local", "coordinator").unwrap();
        let caps = client.capabilities().await;
        assert_eq!(caps.protocol, "peer_to_peer");
        assert!(caps.supports("peer_communication"));
        assert!(caps.supports("message_routing"));
        assert_eq!(caps.agent_id.as_deref(), Some("coordinator"));
    }

    #[tokio::test]
    async fn test_invoke_with_target_sends_once() {
        let client = PeerClient::new("a2a://local", "agent-0").unwrap();
        let response = client
            .invoke(InvokeRequest::new("review PR").with_target("agent-2"))
            .await;

        let data = response.data().unwrap();
        assert_eq!(data["ack"], "Message delivered to agent-2");
        assert_eq!(client.sent_messages().await.len(), 1);
        assert_eq!(client.sent_messages().await[0].body, "review PR");
    }

    #[tokio::test]
    async fn test_invoke_without_target_broadcasts() {
        let client = PeerClient::new("a2a://local", "agent-0")
            .unwrap()
            .with_peers(["x", "y"]);
        let response = client.invoke(InvokeRequest::new("status?")).await;

        assert_eq!(response.data().unwrap()["acks"].as_array().unwrap().len(), 2);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_message_log_is_bounded() {
        let client = PeerClient::new("a2a://local", "agent-0").unwrap();
        for i in 0..MAX_MESSAGE_LOG + 10 {
            client.send_message("agent-1", &format!("m{i}")).await;
        }

        let sent = client.sent_messages().await;
        assert_eq!(sent.len(), MAX_MESSAGE_LOG);
        assert_eq!(sent[0].body, "m10");
        assert_eq!(
            sent.last().unwrap().body,
            format!("m{}", MAX_MESSAGE_LOG + 9)
        );
    }

    #[test]
    fn test_mismatched_protocol_type_rejected() {
        let config = ProtocolConfig::new(ProtocolType::ContextSharing, "a2a://local");
        let err = PeerClient::with_config(config, "agent-0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "protocol_type"));
    }

    #[test]
    fn test_empty_agent_id_rejected() {
        assert!(matches!(
            PeerClient::new("a2a://local", ""),
            Err(ConfigError::MissingField(_))
        ));
    }
}
