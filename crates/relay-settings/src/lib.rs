//! # relay-settings
//!
//! Relay configuration with layered sources: compiled defaults, an optional
//! JSON settings file, then `RELAY_*` environment variables.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_with_env};
pub use types::{LogFormat, LoggingSettings, RelaySettings, ServerSettings};
