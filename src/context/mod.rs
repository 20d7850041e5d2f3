// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Context-protocol clients.
//!
//! Two transports sit behind the same [`crate::protocol::Protocol`] contract:
//!
//! - [`SimulatedContextClient`] - canned tools and context, no I/O
//! - [`ProcessContextClient`] - talks NDJSON to a supervised background
//!   server launched by a [`crate::server::ServerLauncher`]
//!
//! Both report `context_sharing` and `session_management` capabilities.

mod process;
pub mod session;
mod simulated;

pub use process::{ProcessContextClient, DEFAULT_STARTUP_TIMEOUT};
pub use session::{RpcConnection, ServerHello, SessionState};
pub use simulated::{SimulatedContextClient, SimulatedSession, DEFAULT_SIMULATED_TOOLS};
