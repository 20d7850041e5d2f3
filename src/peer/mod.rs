// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Peer-to-peer agent messaging.
//!
//! [`PeerClient`] joins a peer network under an agent id, discovers peers
//! and delivers messages to them. Broadcast is a sequential loop over the
//! discovered peers, so acknowledgements come back in discovery order.

mod client;

pub use client::{PeerClient, PeerMessage, DEFAULT_PEERS};
