//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WsubusSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `WSUBUS_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{MAX_INFLIGHT, WsubusSettings};
use wsubus_logging::LogFormat;

/// Resolve the default settings path (`~/.wsubus/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".wsubus").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WsubusSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<WsubusSettings> {
    let defaults = serde_json::to_value(WsubusSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WsubusSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Check cross-field constraints.
pub fn validate(settings: &WsubusSettings) -> Result<()> {
    let inflight = settings.rpc.max_inflight_calls;
    if inflight == 0 || inflight > MAX_INFLIGHT {
        return Err(SettingsError::InvalidValue(format!(
            "rpc.maxInflightCalls must be between 1 and {MAX_INFLIGHT}, got {inflight}"
        )));
    }
    if settings.server.max_connections == 0 {
        return Err(SettingsError::InvalidValue(
            "server.maxConnections must be at least 1".to_string(),
        ));
    }
    for peer in &settings.federation.peers {
        if !(peer.url.starts_with("ws://") || peer.url.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "federation peer url must start with ws:// or wss://, got {:?}",
                peer.url
            )));
        }
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut WsubusSettings) {
    // ── Server settings ─────────────────────────────────────────────
    if let Some(v) = read_env_string("WSUBUS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("WSUBUS_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("WSUBUS_MAX_CONNECTIONS", 1, 100_000) {
        settings.server.max_connections = v;
    }

    // ── RPC settings ────────────────────────────────────────────────
    if let Some(v) = read_env_u64("WSUBUS_CALL_TIMEOUT_MS", 0, 3_600_000) {
        settings.rpc.call_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("WSUBUS_ACCESS_CHECK_TIMEOUT_MS", 0, 600_000) {
        settings.rpc.access_check_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("WSUBUS_MAX_INFLIGHT", 1, MAX_INFLIGHT) {
        settings.rpc.max_inflight_calls = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("WSUBUS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(json) = read_env_bool("WSUBUS_LOG_JSON") {
        settings.logging.format = if json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        };
    }

    // ── Federation ──────────────────────────────────────────────────
    if let Some(v) = read_env_string("WSUBUS_FEDERATION_USERNAME") {
        settings.federation.username = v;
    }
    if let Some(v) = read_env_string("WSUBUS_FEDERATION_PASSWORD") {
        settings.federation.password = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
