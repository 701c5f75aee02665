//! # wsubus-settings
//!
//! Layered configuration for the bridge. Settings come from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`WsubusSettings::default()`]
//! 2. **Settings file**: `~/.wsubus/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `WSUBUS_*` overrides
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;
