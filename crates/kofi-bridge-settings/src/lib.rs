//! # kofi-bridge-settings
//!
//! Settings are loaded from layered sources (in priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **Settings file**: `~/.kofi-bridge/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `KOFI_BRIDGE_*` overrides
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings,
    load_settings_from_path, read_settings_file, settings_path,
};
pub use types::{BridgeSettings, LoggingSettings, ServerSettings};
