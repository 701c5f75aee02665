//! # wsubus-logging
//!
//! Structured logging setup on top of `tracing`.
//!
//! - [`init_subscriber`] installs the global subscriber (compact text or
//!   JSON lines on stderr). `RUST_LOG` takes precedence over the configured
//!   level.
//! - [`capture_logs`] installs a thread-local capturing subscriber for
//!   assertions in tests.

#![deny(unsafe_code)]

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

use serde::{Deserialize, Serialize};

/// Output format of the stderr log stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup. Later calls are no-ops.
///
/// # Arguments
///
/// * `level` - Default filter directive (e.g. `"info"`, `"wsubus_server=debug"`).
/// * `format` - Output format.
pub fn init_subscriber(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails if a subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
