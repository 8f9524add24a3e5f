//! Tracing subscriber setup.
//!
//! The `db` layer logs through the `log` facade; `tracing-log` forwards those
//! records into the same subscriber as the engine's spans.

use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Builds the filter from `RUST_LOG`, falling back to `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the global subscriber and the `log` bridge. Logs go to stderr
/// so stdout stays free for command output. Calling this twice returns an
/// error instead of panicking.
pub fn init(format: LogFormat, default_level: &str) -> Result<(), TelemetryError> {
    let registry = Registry::default().with(env_filter(default_level));
    let installed = match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(io::stderr).with_target(true)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true),
            ),
        ),
    };
    installed.map_err(|e| TelemetryError(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| TelemetryError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to initialise logging: {0}")]
pub struct TelemetryError(String);
