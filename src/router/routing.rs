// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Multi-protocol router.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use super::reasoner::Reasoner;
use super::types::{AggregatedResult, DispatchOutcome, RoutedResult};
use crate::error::{ProtocolError, RouterError};
use crate::protocol::{Capabilities, InvokeRequest, Protocol, ProtocolResponse, ProtocolType};

/// Holds one protocol per type and routes requests across them.
///
/// Routing in single mode:
/// 1. Ask the reasoner to pick a type from the registered ones
/// 2. If it picks an unregistered type, fall back to the lowest registered
///    type and say so in `routing_reasoning`
/// 3. Invoke only that protocol
///
/// Fan-out mode invokes every protocol concurrently, each under its own
/// timeout, and asks the reasoner to synthesize the collected results.
///
/// Registration takes `&mut self` and dispatch takes `&self`, so the borrow
/// checker keeps the map stable while requests are in flight.
///
/// # Example
///
/// ```rust,ignore
/// use agentlink::router::{KeywordReasoner, ProtocolRouter};
///
/// let mut router = ProtocolRouter::new(Arc::new(KeywordReasoner));
/// router.add_protocol(Arc::new(SimulatedContextClient::new("mcp://github:8080")?));
/// router.add_protocol(Arc::new(PeerClient::new("a2a://local", "agent-0")?));
///
/// let single = router.route("analyze security").await?;
/// let all = router.fan_out("analyze security").await?;
/// router.cleanup().await;
/// ```
pub struct ProtocolRouter {
    protocols: BTreeMap<ProtocolType, Arc<dyn Protocol>>,
    reasoner: Arc<dyn Reasoner>,
}

impl ProtocolRouter {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self {
            protocols: BTreeMap::new(),
            reasoner,
        }
    }

    /// Record a protocol under its declared type. Connects nothing.
    ///
    /// Returns the instance it replaced, if any.
    pub fn add_protocol(&mut self, protocol: Arc<dyn Protocol>) -> Option<Arc<dyn Protocol>> {
        let protocol_type = protocol.protocol_type();
        let replaced = self.protocols.insert(protocol_type, protocol);
        if replaced.is_some() {
            debug!(%protocol_type, "Replaced registered protocol");
        }
        replaced
    }

    pub fn protocol(&self, protocol_type: ProtocolType) -> Option<&Arc<dyn Protocol>> {
        self.protocols.get(&protocol_type)
    }

    /// Registered types, lowest first.
    pub fn protocol_types(&self) -> Vec<ProtocolType> {
        self.protocols.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Dispatch in single mode, or in fan-out mode when `use_all_protocols`.
    pub async fn dispatch(
        &self,
        request: impl Into<InvokeRequest>,
        use_all_protocols: bool,
    ) -> Result<DispatchOutcome, RouterError> {
        let request = request.into();
        if use_all_protocols {
            self.fan_out(request).await.map(DispatchOutcome::FanOut)
        } else {
            self.route(request).await.map(DispatchOutcome::Single)
        }
    }

    /// Single-protocol dispatch.
    #[instrument(skip_all)]
    pub async fn route(&self, request: impl Into<InvokeRequest>) -> Result<RoutedResult, RouterError> {
        let request = request.into();
        debug!(query = %request.query, "Routing request");
        let available = self.protocol_types();
        let Some(&lowest) = available.first() else {
            return Err(RouterError::NoProtocols);
        };

        let summaries = self.capability_summaries().await;
        let decision = self
            .reasoner
            .select_protocol(&available, &summaries, &request.query)
            .await;

        let (protocol_used, routing_reasoning) = if self.protocols.contains_key(&decision.chosen) {
            (decision.chosen, decision.reasoning)
        } else {
            warn!(chosen = %decision.chosen, fallback = %lowest, "Routing decision named an unregistered protocol");
            (
                lowest,
                format!(
                    "{} [fallback: {} is not registered, used {}]",
                    decision.reasoning, decision.chosen, lowest
                ),
            )
        };

        let query = request.query.clone();
        let response = match self.protocols.get(&protocol_used) {
            Some(protocol) => invoke_bounded(Arc::clone(protocol), request).await,
            None => return Err(RouterError::NoProtocols),
        };
        info!(protocol = %protocol_used, success = response.is_success(), "Routed request");

        let results = BTreeMap::from([(protocol_used, response.clone())]);
        let synthesis = self.reasoner.synthesize(&query, &results).await;

        Ok(RoutedResult {
            final_answer: synthesis.final_answer,
            protocol_used,
            routing_reasoning,
            confidence: decision.confidence,
            response,
        })
    }

    /// Invoke every protocol concurrently and aggregate.
    #[instrument(skip_all, fields(protocols = self.protocols.len()))]
    pub async fn fan_out(&self, request: impl Into<InvokeRequest>) -> Result<AggregatedResult, RouterError> {
        let request = request.into();
        debug!(query = %request.query, "Fanning out request");
        if self.protocols.is_empty() {
            return Err(RouterError::NoProtocols);
        }

        let start = Instant::now();
        let calls = self.protocols.iter().map(|(protocol_type, protocol)| {
            let protocol = Arc::clone(protocol);
            let request = request.clone();
            let protocol_type = *protocol_type;
            async move { (protocol_type, invoke_bounded(protocol, request).await) }
        });
        let per_protocol_results: BTreeMap<ProtocolType, ProtocolResponse> =
            join_all(calls).await.into_iter().collect();

        let protocols_used: Vec<ProtocolType> = per_protocol_results
            .iter()
            .filter(|(_, response)| response.is_success())
            .map(|(protocol_type, _)| *protocol_type)
            .collect();

        info!(
            succeeded = protocols_used.len(),
            total = per_protocol_results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Fan-out complete"
        );

        let synthesis = self
            .reasoner
            .synthesize(&request.query, &per_protocol_results)
            .await;

        Ok(AggregatedResult {
            per_protocol_results,
            final_answer: synthesis.final_answer,
            confidence: synthesis.confidence,
            protocols_used,
        })
    }

    /// Disconnect every protocol and empty the router.
    pub async fn cleanup(&mut self) {
        for (protocol_type, protocol) in std::mem::take(&mut self.protocols) {
            debug!(%protocol_type, "Disconnecting");
            protocol.disconnect().await;
        }
    }

    async fn capability_summaries(&self) -> BTreeMap<ProtocolType, String> {
        let mut summaries = BTreeMap::new();
        for (protocol_type, protocol) in &self.protocols {
            summaries.insert(*protocol_type, protocol.capabilities().await.summary());
        }
        summaries
    }
}

impl std::fmt::Debug for ProtocolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRouter")
            .field("protocols", &self.protocol_types())
            .finish_non_exhaustive()
    }
}

/// Invoke under the protocol's own timeout. A timeout becomes an error result.
async fn invoke_bounded(protocol: Arc<dyn Protocol>, request: InvokeRequest) -> ProtocolResponse {
    let protocol_type = protocol.protocol_type();
    let timeout = protocol.config().timeout();

    match tokio::time::timeout(timeout, protocol.invoke(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(protocol = %protocol_type, timeout_ms = timeout.as_millis() as u64, "Protocol timed out");
            ProtocolResponse::failure(
                protocol_type,
                protocol.config().endpoint.clone(),
                Capabilities::new(protocol_type.as_str(), "unknown"),
                ProtocolError::Timeout {
                    method: "invoke".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimulatedContextClient;
    use crate::peer::PeerClient;
    use crate::protocol::{MockProtocol, ProtocolConfig};
    use crate::router::MockReasoner;
    use crate::router::{KeywordReasoner, RoutingDecision, Synthesis};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Always picks the same type, echoes results back as the answer.
    struct FixedReasoner(ProtocolType);

    #[async_trait]
    impl Reasoner for FixedReasoner {
        async fn select_protocol(
            &self,
            _available: &[ProtocolType],
            _capability_summaries: &BTreeMap<ProtocolType, String>,
            _request: &str,
        ) -> RoutingDecision {
            RoutingDecision::new(self.0, format!("fixed choice {}", self.0), 1.0)
        }

        async fn synthesize(
            &self,
            _request: &str,
            results: &BTreeMap<ProtocolType, ProtocolResponse>,
        ) -> Synthesis {
            let answer: Vec<String> = results.values().map(|r| r.summary()).collect();
            Synthesis::new(answer.join(" | "), 1.0)
        }
    }

    fn untouched_peer() -> MockProtocol {
        let mut peer = MockProtocol::new();
        peer.expect_protocol_type()
            .return_const(ProtocolType::PeerToPeer);
        peer.expect_config()
            .return_const(ProtocolConfig::new(ProtocolType::PeerToPeer, "a2a://mock"));
        peer.expect_capabilities()
            .returning(|| Capabilities::new("peer_to_peer", "1.0"));
        peer.expect_invoke().times(0);
        peer.expect_connect().times(0);
        peer.expect_handle_request().times(0);
        peer
    }

    fn simulated() -> Arc<dyn Protocol> {
        Arc::new(SimulatedContextClient::new("mcp://github:8080").unwrap())
    }

    #[tokio::test]
    async fn test_single_mode_invokes_only_chosen() {
        let mut router = ProtocolRouter::new(Arc::new(FixedReasoner(ProtocolType::ContextSharing)));
        router.add_protocol(simulated());
        router.add_protocol(Arc::new(untouched_peer()));

        let result = router.route("analyze security").await.unwrap();

        assert_eq!(result.protocol_used, ProtocolType::ContextSharing);
        assert_eq!(result.routing_reasoning, "fixed choice context_sharing");
        assert!(result.response.is_success());
        assert!(result.final_answer.contains("analyze security"));
    }

    #[tokio::test]
    async fn test_fallback_to_lowest_registered_type() {
        let mut router = ProtocolRouter::new(Arc::new(FixedReasoner(ProtocolType::Custom)));
        router.add_protocol(Arc::new(PeerClient::new("a2a://local", "me").unwrap()));
        router.add_protocol(simulated());

        let result = router.route("anything").await.unwrap();

        assert_eq!(result.protocol_used, ProtocolType::ContextSharing);
        assert!(result.routing_reasoning.contains("fallback"));
        assert!(result.routing_reasoning.contains("custom"));
    }

    #[tokio::test]
    async fn test_reasoner_receives_sorted_types_and_summaries() {
        let mut reasoner = MockReasoner::new();
        reasoner
            .expect_select_protocol()
            .withf(|available, summaries, request| {
                available.to_vec() == vec![ProtocolType::ContextSharing, ProtocolType::PeerToPeer]
                    && summaries[&ProtocolType::PeerToPeer].contains("peer_communication")
                    && request.to_string() == "ping peers"
            })
            .times(1)
            .returning(|_, _, _| RoutingDecision::new(ProtocolType::PeerToPeer, "peers", 0.8));
        reasoner
            .expect_synthesize()
            .times(1)
            .returning(|_, _| Synthesis::new("done", 0.8));

        let mut router = ProtocolRouter::new(Arc::new(reasoner));
        router.add_protocol(Arc::new(PeerClient::new("a2a://local", "me").unwrap()));
        router.add_protocol(simulated());

        let outcome = router.dispatch("ping peers", false).await.unwrap();
        let single = outcome.as_single().unwrap();
        assert_eq!(single.protocol_used, ProtocolType::PeerToPeer);
        assert_eq!(single.final_answer, "done");
        assert_eq!(single.confidence, 0.8);
    }

    #[tokio::test]
    async fn test_empty_router() {
        let router = ProtocolRouter::new(Arc::new(KeywordReasoner));
        assert_eq!(router.route("x").await.unwrap_err(), RouterError::NoProtocols);
        assert_eq!(
            router.dispatch("x", true).await.unwrap_err(),
            RouterError::NoProtocols
        );
    }

    #[tokio::test]
    async fn test_add_protocol_replaces_same_type() {
        let mut router = ProtocolRouter::new(Arc::new(KeywordReasoner));
        assert!(router.add_protocol(simulated()).is_none());
        assert!(router.add_protocol(simulated()).is_some());
        assert_eq!(router.len(), 1);
    }

    /// Connects, then never answers.
    struct HangingProtocol {
        config: ProtocolConfig,
    }

    #[async_trait]
    impl Protocol for HangingProtocol {
        fn protocol_type(&self) -> ProtocolType {
            ProtocolType::Custom
        }

        fn config(&self) -> &ProtocolConfig {
            &self.config
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn connect(&self) -> bool {
            true
        }

        async fn disconnect(&self) {}

        async fn capabilities(&self) -> Capabilities {
            Capabilities::new("custom", "1.0")
        }

        async fn discover_peers(&self) -> Vec<String> {
            Vec::new()
        }

        async fn handle_request(
            &self,
            _request: InvokeRequest,
        ) -> Result<serde_json::Value, ProtocolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProtocolError::Transport("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fan_out_bounded_by_single_timeout() {
        let hanging = HangingProtocol {
            config: ProtocolConfig::new(ProtocolType::Custom, "custom://hang")
                .with_timeout(Duration::from_millis(200)),
        };

        let mut router = ProtocolRouter::new(Arc::new(KeywordReasoner));
        router.add_protocol(simulated());
        router.add_protocol(Arc::new(PeerClient::new("a2a://local", "me").unwrap()));
        router.add_protocol(Arc::new(hanging));

        let start = Instant::now();
        let result = router.fan_out("analyze security").await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(result.per_protocol_results.len(), 3);
        assert_eq!(
            result.protocols_used,
            vec![ProtocolType::ContextSharing, ProtocolType::PeerToPeer]
        );
        assert_eq!(result.failed_protocols(), vec![ProtocolType::Custom]);
        let failed = &result.per_protocol_results[&ProtocolType::Custom];
        assert_eq!(failed.error().unwrap().kind, crate::protocol::FailureKind::Timeout);
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cleanup_disconnects_all() {
        let context = Arc::new(SimulatedContextClient::new("mcp://x").unwrap());
        let peer = Arc::new(PeerClient::new("a2a://x", "me").unwrap());
        context.connect().await;
        peer.connect().await;

        let mut router = ProtocolRouter::new(Arc::new(KeywordReasoner));
        router.add_protocol(context.clone());
        router.add_protocol(peer.clone());
        router.cleanup().await;

        assert!(router.is_empty());
        assert!(!context.is_connected());
        assert!(!peer.is_connected());
    }
}
