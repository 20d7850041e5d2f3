// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging setup.
//!
//! Library code only emits `tracing` events and spans; installing a
//! subscriber is left to the binary:
//!
//! ```rust,ignore
//! use agentlink::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::for_command(false, false, false))?;
//! ```
//!
//! `RUST_LOG` overrides the preset level, e.g.
//! `RUST_LOG=agentlink::router=debug`.
//!
//! Guidelines for new code:
//!
//! 1. `#[instrument]` on public async entry points, skipping large arguments
//! 2. Record endpoints, tool names and counts as fields, never credentials
//! 3. `debug!` for per-message detail, `info!` for lifecycle, `warn!` for
//!    recovered failures

mod init;

pub use init::{init_telemetry, LogFormat, TelemetryConfig, TelemetryGuard, CRATE_TARGET};
