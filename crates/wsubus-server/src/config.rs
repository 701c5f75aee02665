//! Server configuration.

use std::time::Duration;

use wsubus_core::MAX_INFLIGHT;
use wsubus_settings::WsubusSettings;

/// Runtime configuration for the bridge server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Disconnect clients silent for longer than this.
    pub heartbeat_timeout: Duration,
    /// Outbound frames buffered per client.
    pub send_queue_capacity: usize,
    /// Per-call bus timeout. `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// Per-event access check timeout. `None` waits forever.
    pub access_check_timeout: Option<Duration>,
    /// Concurrent `call` requests per connection.
    pub max_inflight_calls: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 64,
            max_message_size: 1024 * 1024,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            send_queue_capacity: 1024,
            call_timeout: Some(Duration::from_secs(30)),
            access_check_timeout: Some(Duration::from_secs(5)),
            max_inflight_calls: MAX_INFLIGHT,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &WsubusSettings) -> Self {
        let server = &settings.server;
        let rpc = &settings.rpc;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            max_message_size: server.max_message_size,
            heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(server.heartbeat_timeout_ms),
            send_queue_capacity: server.send_queue_capacity,
            call_timeout: optional_millis(rpc.call_timeout_ms),
            access_check_timeout: optional_millis(rpc.access_check_timeout_ms),
            max_inflight_calls: rpc.max_inflight_calls,
        }
    }

    /// `host:port` string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
