//! Loads configuration from JSON files and environment overrides.

use std::env;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::schema::CompanionConfig;
use crate::{ConfigError, ConfigResult};

/// Overrides `storage.data_dir`.
pub const ENV_DATA_DIR: &str = "COMPANION_DATA_DIR";
/// Overrides `memory.recency_capacity`.
pub const ENV_RECENCY_CAPACITY: &str = "COMPANION_RECENCY_CAPACITY";
/// Overrides `memory.relevant_top_k`.
pub const ENV_TOP_K: &str = "COMPANION_TOP_K";

/// Reads `path`, applies process environment overrides and validates.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] for unreadable
/// files, and [`ConfigError::Invalid`] for bad overrides or values.
pub fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<CompanionConfig> {
    let path = path.as_ref();
    let mut config = read_file(path)?;
    apply_overrides(&mut config, |key| env::var(key).ok())?;
    config.validate()?;
    info!(
        path = %path.display(),
        data_dir = %config.storage.data_dir.display(),
        recency_capacity = config.memory.recency_capacity.get(),
        top_k = config.memory.relevant_top_k,
        "configuration loaded"
    );
    Ok(config)
}

fn read_file(path: &Path) -> ConfigResult<CompanionConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found; using defaults");
        return Ok(CompanionConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Applies `COMPANION_*` overrides read through `lookup`.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when an override does not parse.
pub fn apply_overrides<F>(config: &mut CompanionConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_DATA_DIR).filter(|dir| !dir.trim().is_empty()) {
        config.storage.data_dir = PathBuf::from(dir);
    }
    if let Some(raw) = lookup(ENV_RECENCY_CAPACITY) {
        config.memory.recency_capacity = raw
            .trim()
            .parse::<NonZeroUsize>()
            .map_err(|_| {
                ConfigError::Invalid("COMPANION_RECENCY_CAPACITY must be a positive integer")
            })?;
    }
    if let Some(raw) = lookup(ENV_TOP_K) {
        config.memory.relevant_top_k = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("COMPANION_TOP_K must be a non-negative integer"))?;
    }
    Ok(())
}
