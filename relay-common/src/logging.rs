//! Logging setup for the relay.
//!
//! HTTP client internals (hyper, reqwest, h2, rustls) log at `warn` so that
//! conversation and provider events stay readable at `debug`.

use std::str::FromStr;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Modules capped at `warn` unless `RUST_LOG` says otherwise.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with span and source location
    Json,
    /// Colored, human-readable lines
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json or pretty)")),
        }
    }
}

fn filter_directives(log_level: &str) -> String {
    std::iter::once(log_level.to_string())
        .chain(NOISY_MODULES.iter().map(|m| format!("{m}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. Later calls are no-ops.
///
/// An unknown `log_format` falls back to pretty output.
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(log_level)));
    let format = log_format.parse().unwrap_or(LogFormat::Pretty);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    if installed.is_ok() {
        tracing::info!(log_level, ?format, "Logging initialized");
    }
}

/// Fresh id attached to every inbound message.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
