//! # relay-telemetry
//!
//! `tracing` subscriber initialisation. Stdout only, human-readable or JSON,
//! filtered by `RUST_LOG` when set and by the configured level otherwise.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default filter directive (e.g. `"info"` or `"relay_core=debug,info"`).
    /// Overridden by the `RUST_LOG` env var.
    pub log_level: String,
    /// Emit one JSON object per line instead of human-readable text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            json: false,
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter directive did not parse.
    #[error("invalid log filter `{directive}`: {source}")]
    InvalidFilter {
        /// The rejected directive.
        directive: String,
        /// Parser error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already installed.
    #[error("tracing subscriber already initialised: {0}")]
    AlreadyInitialised(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the filter: `RUST_LOG` if set and valid, else `default_directive`.
pub fn build_filter(default_directive: &str) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_directive).map_err(|source| TelemetryError::InvalidFilter {
        directive: default_directive.to_owned(),
        source,
    })
}

/// Initialize the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = build_filter(&config.log_level)?;

    if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = TelemetryConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert!(!cfg.json);
    }

    #[test]
    fn valid_directive_builds() {
        assert!(build_filter("relay_core=debug,info").is_ok());
    }

    #[test]
    fn invalid_directive_is_rejected() {
        // Only meaningful when RUST_LOG does not already supply a filter.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = build_filter("relay_core=loudest").unwrap_err();
        assert!(err.to_string().contains("relay_core=loudest"));
    }

    #[test]
    fn second_init_reports_error() {
        let cfg = TelemetryConfig::default();
        let first = init_telemetry(&cfg);
        let second = init_telemetry(&cfg);
        // Whichever test installs first wins; a repeat must fail cleanly.
        assert!(first.is_ok() || matches!(first, Err(TelemetryError::AlreadyInitialised(_))));
        assert!(matches!(second, Err(TelemetryError::AlreadyInitialised(_))));
    }
}
