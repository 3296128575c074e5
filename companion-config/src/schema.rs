//! Strongly typed configuration schema.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use companion_adapters::GenerationOptions;
use companion_prompts::PersonalityConfig;
use companion_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

/// Root configuration. Every field has a default, so an empty JSON object is
/// a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Memory tier settings.
    pub memory: MemorySection,
    /// Reply generation settings.
    pub generation: GenerationSection,
    /// Profile extraction settings.
    pub profile: ProfileSection,
    /// On-disk storage settings.
    pub storage: StorageSection,
    /// Companion character.
    pub personality: PersonalityConfig,
    /// Logging settings.
    pub telemetry: TelemetryConfig,
}

impl CompanionConfig {
    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.memory.embedding_dimensions == 0 {
            return Err(ConfigError::Invalid("memory.embedding_dimensions must be > 0"));
        }
        if self.memory.embedding_timeout_ms == 0 {
            return Err(ConfigError::Invalid("memory.embedding_timeout_ms must be > 0"));
        }
        if self.generation.max_output_tokens == 0 {
            return Err(ConfigError::Invalid("generation.max_output_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(
                "generation.temperature must be within 0.0..=2.0",
            ));
        }
        if self.generation.timeout_secs == 0 {
            return Err(ConfigError::Invalid("generation.timeout_secs must be > 0"));
        }
        if self.profile.extraction_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "profile.extraction_timeout_secs must be > 0",
            ));
        }
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.data_dir must not be empty"));
        }
        Ok(())
    }
}

/// Two-tier memory settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// Recency buffer capacity.
    pub recency_capacity: NonZeroUsize,
    /// Relevant messages retrieved per turn.
    pub relevant_top_k: usize,
    /// Dimensions of the local hashing embedder.
    pub embedding_dimensions: usize,
    /// Deadline for one embedding call.
    pub embedding_timeout_ms: u64,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            recency_capacity: NonZeroUsize::new(20).expect("non-zero"),
            relevant_top_k: 3,
            embedding_dimensions: 256,
            embedding_timeout_ms: 5_000,
        }
    }
}

impl MemorySection {
    /// Embedding deadline as a [`Duration`].
    #[must_use]
    pub const fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }
}

/// Reply generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    /// Output token budget per reply.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Deadline for one reply.
    pub timeout_secs: u64,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            max_output_tokens: 250,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

impl GenerationSection {
    /// Options passed with every reply request.
    #[must_use]
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions::new()
            .with_max_output_tokens(self.max_output_tokens)
            .with_temperature(self.temperature)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// Profile extraction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSection {
    /// Deadline for one extraction call.
    pub extraction_timeout_secs: u64,
}

impl Default for ProfileSection {
    fn default() -> Self {
        Self {
            extraction_timeout_secs: 60,
        }
    }
}

impl ProfileSection {
    /// Options passed with every extraction request.
    #[must_use]
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions::new()
            .with_temperature(0.0)
            .with_timeout(Duration::from_secs(self.extraction_timeout_secs))
    }
}

/// On-disk storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Root directory for per-user data.
    pub data_dir: PathBuf,
    /// Keep a message journal so the recency window survives restarts.
    pub persist_history: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            persist_history: true,
        }
    }
}
