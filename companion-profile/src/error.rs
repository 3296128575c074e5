//! Error types for profile storage, extraction and scheduling.

use companion_adapters::GenerationError;
use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by profile components.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The model answered, but not with a usable profile object.
    #[error("profile extraction returned unusable data: {reason}")]
    ExtractionParseError {
        /// Why the response was rejected.
        reason: String,
    },
    /// The generation capability could not run the extraction.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Underlying I/O failure while reading or writing profile files.
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
}

impl ProfileError {
    /// Helper to construct parse errors from string-like values.
    #[must_use]
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::ExtractionParseError {
            reason: reason.into(),
        }
    }
}

/// Result type alias for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;
