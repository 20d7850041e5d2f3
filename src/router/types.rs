// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Routing decisions and dispatch results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::{ProtocolResponse, ProtocolType};

/// Which protocol to use for one request, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub chosen: ProtocolType,
    pub reasoning: String,
    /// In `[0, 1]`.
    pub confidence: f64,
}

impl RoutingDecision {
    /// Create a decision, clamping confidence into `[0, 1]`.
    pub fn new(chosen: ProtocolType, reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            chosen,
            reasoning: reasoning.into(),
            confidence: clamp_confidence(confidence),
        }
    }
}

/// Final answer synthesized from protocol output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub final_answer: String,
    /// In `[0, 1]`.
    pub confidence: f64,
}

impl Synthesis {
    pub fn new(final_answer: impl Into<String>, confidence: f64) -> Self {
        Self {
            final_answer: final_answer.into(),
            confidence: clamp_confidence(confidence),
        }
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Result of single-protocol dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedResult {
    pub final_answer: String,
    pub protocol_used: ProtocolType,
    pub routing_reasoning: String,
    /// Confidence of the routing decision.
    pub confidence: f64,
    /// Raw result of the chosen protocol.
    pub response: ProtocolResponse,
}

/// Result of fan-out dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// One entry per registered protocol, failures included.
    pub per_protocol_results: BTreeMap<ProtocolType, ProtocolResponse>,
    pub final_answer: String,
    pub confidence: f64,
    /// Protocols that succeeded, in type order.
    pub protocols_used: Vec<ProtocolType>,
}

impl AggregatedResult {
    /// Protocols whose invocation failed.
    pub fn failed_protocols(&self) -> Vec<ProtocolType> {
        self.per_protocol_results
            .iter()
            .filter(|(_, response)| !response.is_success())
            .map(|(protocol, _)| *protocol)
            .collect()
    }
}

/// Either shape `ProtocolRouter::dispatch` can return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Single(RoutedResult),
    FanOut(AggregatedResult),
}

impl DispatchOutcome {
    pub fn final_answer(&self) -> &str {
        match self {
            Self::Single(result) => &result.final_answer,
            Self::FanOut(result) => &result.final_answer,
        }
    }

    pub fn as_single(&self) -> Option<&RoutedResult> {
        match self {
            Self::Single(result) => Some(result),
            Self::FanOut(_) => None,
        }
    }

    pub fn as_fan_out(&self) -> Option<&AggregatedResult> {
        match self {
            Self::Single(_) => None,
            Self::FanOut(result) => Some(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Synthesis::new("x", 1.7).confidence, 1.0);
        assert_eq!(Synthesis::new("x", -0.2).confidence, 0.0);
        assert_eq!(Synthesis::new("x", f64::NAN).confidence, 0.0);
        assert_eq!(
            RoutingDecision::new(ProtocolType::Custom, "why", 0.4).confidence,
            0.4
        );
    }
}
