// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup.

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log target of this crate, used to build filter directives.
pub const CRATE_TARGET: &str = "agentlink";

/// Line layout of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One line per event, module target only.
    Compact,
    /// Multi-field lines with file, line and span enter/close events.
    Detailed,
}

/// How logs are filtered and formatted.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level for this crate when neither `RUST_LOG` nor a directive is set.
    pub level: Level,
    pub format: LogFormat,
    pub ansi_colors: bool,
    /// Explicit filter directive. Takes precedence over `RUST_LOG`.
    pub filter_directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            ansi_colors: true,
            filter_directive: None,
        }
    }
}

impl TelemetryConfig {
    /// Settings for one invocation of the binary.
    ///
    /// `serve` owns stdout for NDJSON and its stderr usually ends up in a
    /// parent's log, so it stays uncolored and reports errors only unless
    /// asked for more.
    pub fn for_command(verbose: bool, debug: bool, serving: bool) -> Self {
        let base = Self {
            ansi_colors: !serving,
            ..Self::default()
        };
        if debug {
            Self {
                level: Level::DEBUG,
                format: LogFormat::Detailed,
                ..base
            }
        } else if verbose {
            base.with_level(Level::INFO)
        } else if serving {
            base.with_level(Level::ERROR)
        } else {
            base
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    /// Directive used when nothing else is configured.
    fn default_directive(&self) -> String {
        format!("{}={}", CRATE_TARGET, self.level.as_str().to_lowercase())
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.default_directive());
        match &self.filter_directive {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Keep alive for the duration of the program.
#[derive(Debug)]
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber. Output goes to stderr.
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let detailed = config.format == LogFormat::Detailed;

    // stdout belongs to the NDJSON channel when serving.
    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_file(detailed)
        .with_line_number(detailed)
        .with_span_events(if detailed {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = match config.format {
        LogFormat::Compact => registry.with(fmt_layer.compact()).try_init(),
        LogFormat::Detailed => registry.with(fmt_layer).try_init(),
    };
    installed.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}
