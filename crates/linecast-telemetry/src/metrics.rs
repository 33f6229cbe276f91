//! Prometheus recorder and metric name constants.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::TelemetryError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Call once at
/// startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Connections accepted and registered (counter).
pub const CONNECTIONS_TOTAL: &str = "linecast_connections_total";
/// Connections ended (counter, labels: reason).
pub const DISCONNECTIONS_TOTAL: &str = "linecast_disconnections_total";
/// Currently registered connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "linecast_connections_active";
/// Connections refused at the admission cap (counter).
pub const CONNECTIONS_REJECTED_TOTAL: &str = "linecast_connections_rejected_total";
/// Transient accept failures (counter).
pub const ACCEPT_ERRORS_TOTAL: &str = "linecast_accept_errors_total";
/// Inbound lines read from peers (counter).
pub const LINES_RECEIVED_TOTAL: &str = "linecast_lines_received_total";
/// Lines enqueued to a member during fan-out (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "linecast_broadcast_deliveries_total";
/// Members skipped or evicted during fan-out (counter, labels: reason).
pub const BROADCAST_FAILURES_TOTAL: &str = "linecast_broadcast_failures_total";
