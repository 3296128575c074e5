//! Error types for sessions and turns.

use companion_adapters::GenerationError;
use companion_memory::MemoryError;
use thiserror::Error;

/// Errors surfaced to the caller of a single turn.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The user message was empty after trimming; nothing was recorded.
    #[error("user message is empty")]
    EmptyMessage,
    /// No reply could be produced. The user message stays recorded.
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(#[from] GenerationError),
    /// A memory invariant was violated. Indicates a bug.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Result alias for turn processing.
pub type TurnResult<T> = Result<T, TurnError>;

/// Errors raised while building or opening a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The user or session id is not usable.
    #[error(transparent)]
    InvalidSessionId(#[from] companion_primitives::Error),
    /// A required builder component was not supplied.
    #[error("session builder is missing {0}")]
    Missing(&'static str),
    /// Memory storage could not be opened.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// The session directory could not be prepared.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
}

/// Result alias for session construction.
pub type SessionResult<T> = Result<T, SessionError>;
