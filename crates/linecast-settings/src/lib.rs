//! # linecast-settings
//!
//! Configuration for the linecast server and console client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LinecastSettings::default()`]
//! 2. **Settings file**: `~/.linecast/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `LINECAST_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    LoadedSettings, RejectedOverride, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
