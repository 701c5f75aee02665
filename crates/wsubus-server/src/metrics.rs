//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle that renders `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Requests by method (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// JSON-RPC errors sent (counter, labels: code).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// Bus call latency (histogram).
pub const RPC_CALL_DURATION_SECONDS: &str = "rpc_call_duration_seconds";
/// Events delivered to clients (counter).
pub const EVENTS_FORWARDED_TOTAL: &str = "events_forwarded_total";
/// Events dropped by the access policy (counter).
pub const EVENTS_DENIED_TOTAL: &str = "events_denied_total";
/// Live subscriptions (gauge).
pub const SUBSCRIPTIONS_ACTIVE: &str = "subscriptions_active";
