//! # linecast-telemetry
//!
//! Structured logging via `tracing` and metric name constants shared by the
//! server crate and the binary.

#![deny(unsafe_code)]

pub mod metrics;

use linecast_settings::LoggingSettings;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Telemetry setup failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

/// Filter used when `RUST_LOG` is not set.
///
/// The configured level applies to linecast crates; dependencies are capped
/// at `warn` unless the configured level is quieter.
pub fn default_directive(settings: &LoggingSettings) -> String {
    let level = settings.level.as_filter_str();
    let deps = match level {
        "error" => "error",
        _ => "warn",
    };
    format!(
        "{deps},linecast={level},linecast_server={level},linecast_client={level},linecast_settings={level}"
    )
}

/// Build the env filter: `RUST_LOG` wins over the configured level.
pub fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(settings)))
}

/// Install the global subscriber. Call once at startup.
///
/// Logs go to stderr so they never interleave with console chat output.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), TelemetryError> {
    let filter = build_filter(settings);

    let result = if settings.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).try_init()
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).try_init()
    };

    result.map_err(|e| TelemetryError::Subscriber(e.to_string()))
}
