//! Observability setup for the companion runtime.
//!
//! Library crates only emit `tracing` events; binaries call [`init_tracing`]
//! once at startup to install a subscriber.

#![warn(missing_docs, clippy::pedantic)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directives used when `RUST_LOG` is unset, e.g. `info,companion_memory=debug`.
    pub filter: String,
    /// Emit newline-delimited JSON instead of human-readable lines.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_owned(),
            json: false,
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter directives could not be parsed.
    #[error("invalid tracing filter {filter:?}: {source}")]
    InvalidFilter {
        /// Offending directives.
        filter: String,
        /// Parser error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
}

/// Builds the effective filter: `RUST_LOG` when set, otherwise `config.filter`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] when `config.filter` is malformed
/// and `RUST_LOG` is unset.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter).map_err(|source| TelemetryError::InvalidFilter {
        filter: config.filter.clone(),
        source,
    })
}

/// Installs the global `fmt` subscriber writing to stderr.
///
/// Returns `Ok(false)` without changing anything when a global subscriber is
/// already installed, so repeated calls are harmless.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for malformed filter directives.
pub fn init_tracing(config: &TelemetryConfig) -> Result<bool, TelemetryError> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    if installed {
        tracing::debug!(json = config.json, "tracing initialised");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let config = TelemetryConfig::default();
        init_tracing(&config).unwrap();
        assert!(!init_tracing(&config).unwrap());
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert_eq!(config.filter, "info");
        assert!(config.json);
    }
}
