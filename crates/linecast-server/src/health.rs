//! `/health` response.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Currently registered connections.
    pub connections: usize,
    /// Lines published since start.
    pub lines_published: u64,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, lines_published: u64) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        lines_published,
    }
}
