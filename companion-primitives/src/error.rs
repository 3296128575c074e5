//! Shared error definitions for companion primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the companion runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided message identifier could not be parsed.
    #[error("invalid message id: {source}")]
    InvalidMessageId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Session identifier failed validation.
    #[error("invalid session id `{id}`: {reason}")]
    InvalidSessionId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: &'static str,
    },
}
