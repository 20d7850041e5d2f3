// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Multi-protocol routing.
//!
//! A [`ProtocolRouter`] holds at most one protocol per [`ProtocolType`] and
//! dispatches requests in one of two modes:
//!
//! ```text
//! single:   request -> Reasoner::select_protocol -> one Protocol::invoke -> RoutedResult
//! fan-out:  request -> every Protocol::invoke (concurrent, each bounded)
//!                   -> Reasoner::synthesize -> AggregatedResult
//! ```
//!
//! The reasoning step sits behind the [`Reasoner`] trait so tests and callers
//! can plug in any strategy. [`KeywordReasoner`] is the built-in default.
//!
//! [`ProtocolType`]: crate::protocol::ProtocolType

mod reasoner;
mod routing;
pub mod types;

pub use reasoner::{KeywordReasoner, Reasoner};
pub use routing::ProtocolRouter;
pub use types::{AggregatedResult, DispatchOutcome, RoutedResult, RoutingDecision, Synthesis};

#[cfg(test)]
pub use reasoner::MockReasoner;
