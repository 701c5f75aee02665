//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a
//! settings file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use wsubus_core::AccessRule;
use wsubus_logging::LogFormat;

pub use wsubus_core::MAX_INFLIGHT;

/// Root settings.
///
/// ```json
/// {
///   "server": { "port": 8843 },
///   "federation": { "peers": [{ "url": "ws://10.0.0.2:8843/ws" }] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WsubusSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Call and access-check limits.
    pub rpc: RpcSettings,
    /// Credentials accepted by the built-in `session` object.
    pub session: SessionSettings,
    /// Event access policy.
    pub access: AccessSettings,
    /// Outbound federation links.
    pub federation: FederationSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Maximum simultaneous WebSocket clients.
    pub max_connections: usize,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// Interval between server pings in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Disconnect clients silent for this long, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Outbound frames buffered per client before dropping.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8843,
            max_connections: 64,
            max_message_size: 1024 * 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            send_queue_capacity: 1024,
        }
    }
}

/// Call and access-check limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcSettings {
    /// Timeout for a single bus call in milliseconds. `0` disables it.
    pub call_timeout_ms: u64,
    /// Timeout for one access check in milliseconds. `0` disables it.
    pub access_check_timeout_ms: u64,
    /// Concurrent `call` requests per connection, at most [`MAX_INFLIGHT`].
    pub max_inflight_calls: usize,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            access_check_timeout_ms: 5_000,
            max_inflight_calls: MAX_INFLIGHT,
        }
    }
}

/// Credentials for the built-in `session` object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Whether to register the `session` object on the local bus.
    pub enabled: bool,
    /// Accepted user name.
    pub username: String,
    /// Accepted password.
    pub password: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

/// How events are gated before forwarding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessMode {
    /// Forward everything.
    #[default]
    AllowAll,
    /// Forward nothing.
    DenyAll,
    /// Forward what [`AccessSettings::rules`] allows.
    Acl,
}

/// Event access policy.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessSettings {
    /// Policy kind.
    pub mode: AccessMode,
    /// Allow rules, used in [`AccessMode::Acl`].
    pub rules: Vec<AccessRule>,
}

/// One federation peer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerSettings {
    /// WebSocket URL of the peer (`ws://host:port/ws`).
    pub url: String,
    /// User name for this peer; falls back to [`FederationSettings::username`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password for this peer; falls back to [`FederationSettings::password`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl PeerSettings {
    /// Peer with default credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }
}

/// Outbound federation links.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FederationSettings {
    /// Peers to federate with.
    pub peers: Vec<PeerSettings>,
    /// Default login user name.
    pub username: String,
    /// Default login password.
    pub password: String,
    /// Delay between reconnect attempts in milliseconds.
    pub reconnect_interval_ms: u64,
}

impl Default for FederationSettings {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            reconnect_interval_ms: 5_000,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
