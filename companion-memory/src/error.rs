//! Error types for the memory subsystem.

use std::time::Duration;

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by memory components.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The provided configuration was invalid.
    #[error("invalid memory configuration: {0}")]
    InvalidConfig(&'static str),
    /// The embedding capability could not produce a vector.
    #[error("embedding unavailable: {reason}")]
    EmbeddingUnavailable {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// The recency buffer grew past its capacity. Indicates a bug.
    #[error("recency buffer holds {len} messages, capacity is {capacity}")]
    CapacityViolation {
        /// Observed buffer length.
        len: usize,
        /// Configured capacity.
        capacity: usize,
    },
    /// An embedding did not match the dimensionality of the index.
    #[error("embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch {
        /// Dimensionality fixed by the first stored record.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },
    /// Underlying I/O failure while reading or writing persisted files.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// Operation that requires a semantic index was invoked without one.
    #[error("semantic index not configured")]
    MissingSemanticIndex,
    /// Message or record failed validation.
    #[error("invalid memory record: {0}")]
    InvalidRecord(&'static str),
}

impl MemoryError {
    /// Helper to construct embedding failures from string-like values.
    #[must_use]
    pub fn embedding_unavailable(reason: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable {
            reason: reason.into(),
        }
    }

    /// Embedding failure for a capability call that exceeded its deadline.
    #[must_use]
    pub fn embedding_timeout(after: Duration) -> Self {
        Self::embedding_unavailable(format!("embedding timed out after {after:?}"))
    }
}

/// Result type alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
