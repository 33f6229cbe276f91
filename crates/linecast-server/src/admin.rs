//! Admin HTTP endpoint: `/health` and `/metrics`.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::broadcast::Broadcaster;
use crate::health::{self, HealthResponse};

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    /// Source of connection and line counts.
    pub broadcaster: Arc<Broadcaster>,
    /// When the server started.
    pub start_time: Instant,
    /// Installed Prometheus recorder, if any.
    pub metrics: Option<PrometheusHandle>,
}

/// Build the admin router.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve the admin router until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) {
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(error) = result {
        warn!(%error, "admin endpoint stopped");
    }
}

/// GET /health
async fn health_handler(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.broadcaster.registry().len(),
        state.broadcaster.lines_published(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AdminState>) -> Response {
    match &state.metrics {
        Some(handle) => linecast_telemetry::metrics::render(handle).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
