//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while serving.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Live event subscriptions.
    pub subscriptions: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, subscriptions: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        subscriptions,
    }
}
