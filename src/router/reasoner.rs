// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The reasoning seam used by the router.
//!
//! The router never looks inside a [`Reasoner`]: it hands over the available
//! protocol types with their capability summaries and gets a decision back,
//! then hands over per-protocol results and gets a final answer back.
//! [`KeywordReasoner`] is a deterministic built-in implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::types::{RoutingDecision, Synthesis};
use crate::protocol::{ProtocolResponse, ProtocolType};

/// Chooses protocols and synthesizes answers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Pick one protocol for a request.
    ///
    /// `available` is never empty and is sorted. Choosing a type that is not
    /// in `available` is tolerated: the router falls back deterministically.
    async fn select_protocol(
        &self,
        available: &[ProtocolType],
        capability_summaries: &BTreeMap<ProtocolType, String>,
        request: &str,
    ) -> RoutingDecision;

    /// Turn per-protocol results (failures included) into one answer.
    async fn synthesize(
        &self,
        request: &str,
        results: &BTreeMap<ProtocolType, ProtocolResponse>,
    ) -> Synthesis;
}

const PEER_KEYWORDS: &[&str] = &[
    "message",
    "broadcast",
    "peer",
    "agent",
    "notify",
    "coordinate",
    "delegate",
    "send",
];

const CONTEXT_KEYWORDS: &[&str] = &[
    "pr ",
    "pull request",
    "file",
    "code",
    "repo",
    "security",
    "analy",
    "review",
    "search",
    "context",
    "issue",
];

/// Keyword-scoring reasoner with no external dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordReasoner;

impl KeywordReasoner {
    pub fn new() -> Self {
        Self
    }

    fn matches(request: &str, keywords: &[&'static str]) -> Vec<&'static str> {
        keywords
            .iter()
            .copied()
            .filter(|keyword| request.contains(keyword))
            .collect()
    }
}

#[async_trait]
impl Reasoner for KeywordReasoner {
    async fn select_protocol(
        &self,
        available: &[ProtocolType],
        capability_summaries: &BTreeMap<ProtocolType, String>,
        request: &str,
    ) -> RoutingDecision {
        // Pad so a trailing "pr" still matches "pr ".
        let lower = format!("{} ", request.to_lowercase());
        let peer_hits = Self::matches(&lower, PEER_KEYWORDS);
        let context_hits = Self::matches(&lower, CONTEXT_KEYWORDS);

        let preferred = if peer_hits.len() > context_hits.len() {
            Some((ProtocolType::PeerToPeer, peer_hits))
        } else if !context_hits.is_empty() {
            Some((ProtocolType::ContextSharing, context_hits))
        } else {
            None
        };

        let fallback = available.first().copied().unwrap_or(ProtocolType::ContextSharing);
        let describe = |protocol: ProtocolType| {
            capability_summaries
                .get(&protocol)
                .map(|summary| format!(" ({summary})"))
                .unwrap_or_default()
        };

        match preferred {
            Some((protocol, hits)) if available.contains(&protocol) => RoutingDecision::new(
                protocol,
                format!(
                    "Request mentions {}; routing to {}{}",
                    hits.join(", "),
                    protocol,
                    describe(protocol)
                ),
                0.9,
            ),
            Some((protocol, _)) => RoutingDecision::new(
                fallback,
                format!(
                    "Request suits {} but it is not available; using {}{}",
                    protocol,
                    fallback,
                    describe(fallback)
                ),
                0.5,
            ),
            None => RoutingDecision::new(
                fallback,
                format!("No routing keywords matched; using {}{}", fallback, describe(fallback)),
                0.5,
            ),
        }
    }

    async fn synthesize(
        &self,
        request: &str,
        results: &BTreeMap<ProtocolType, ProtocolResponse>,
    ) -> Synthesis {
        if results.is_empty() {
            return Synthesis::new(format!("No protocol results for '{request}'"), 0.0);
        }

        let successes: Vec<String> = results
            .iter()
            .filter(|(_, response)| response.is_success())
            .map(|(protocol, response)| format!("[{}] {}", protocol, response.summary()))
            .collect();

        if successes.is_empty() {
            let errors: Vec<String> = results
                .iter()
                .map(|(protocol, response)| format!("[{}] {}", protocol, response.summary()))
                .collect();
            return Synthesis::new(
                format!("No protocol produced a result for '{}': {}", request, errors.join("; ")),
                0.0,
            );
        }

        let confidence = successes.len() as f64 / results.len() as f64;
        Synthesis::new(successes.join("\n"), confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::protocol::Capabilities;

    fn both() -> Vec<ProtocolType> {
        vec![ProtocolType::ContextSharing, ProtocolType::PeerToPeer]
    }

    #[tokio::test]
    async fn test_security_routes_to_context() {
        let decision = KeywordReasoner
            .select_protocol(&both(), &BTreeMap::new(), "analyze security of this PR")
            .await;
        assert_eq!(decision.chosen, ProtocolType::ContextSharing);
        assert!(decision.reasoning.contains("security"));
        assert_eq!(decision.confidence, 0.9);
    }

    #[tokio::test]
    async fn test_broadcast_routes_to_peer() {
        let decision = KeywordReasoner
            .select_protocol(&both(), &BTreeMap::new(), "broadcast a message to every agent")
            .await;
        assert_eq!(decision.chosen, ProtocolType::PeerToPeer);
    }

    #[tokio::test]
    async fn test_unavailable_preference_uses_first() {
        let decision = KeywordReasoner
            .select_protocol(&[ProtocolType::Custom], &BTreeMap::new(), "review the code")
            .await;
        assert_eq!(decision.chosen, ProtocolType::Custom);
        assert!(decision.reasoning.contains("not available"));
    }

    #[tokio::test]
    async fn test_summary_appears_in_reasoning() {
        let summaries = BTreeMap::from([(
            ProtocolType::ContextSharing,
            "context_sharing v1.0".to_string(),
        )]);
        let decision = KeywordReasoner
            .select_protocol(&both(), &summaries, "hello there")
            .await;
        assert_eq!(decision.chosen, ProtocolType::ContextSharing);
        assert!(decision.reasoning.contains("context_sharing v1.0"));
    }

    #[tokio::test]
    async fn test_synthesize_confidence_is_success_ratio() {
        let caps = Capabilities::new("x", "1");
        let results = BTreeMap::from([
            (
                ProtocolType::ContextSharing,
                ProtocolResponse::success(
                    ProtocolType::ContextSharing,
                    "a",
                    caps.clone(),
                    serde_json::json!("found it"),
                ),
            ),
            (
                ProtocolType::Custom,
                ProtocolResponse::failure(
                    ProtocolType::Custom,
                    "b",
                    caps,
                    ProtocolError::Transport("down".to_string()),
                ),
            ),
        ]);

        let synthesis = KeywordReasoner.synthesize("q", &results).await;
        assert_eq!(synthesis.confidence, 0.5);
        assert!(synthesis.final_answer.contains("found it"));
        assert!(!synthesis.final_answer.contains("down"));
    }

    #[tokio::test]
    async fn test_synthesize_all_failed() {
        let results = BTreeMap::from([(
            ProtocolType::Custom,
            ProtocolResponse::failure(
                ProtocolType::Custom,
                "b",
                Capabilities::new("x", "1"),
                ProtocolError::Transport("down".to_string()),
            ),
        )]);
        let synthesis = KeywordReasoner.synthesize("q", &results).await;
        assert_eq!(synthesis.confidence, 0.0);
        assert!(synthesis.final_answer.contains("down"));
    }
}
