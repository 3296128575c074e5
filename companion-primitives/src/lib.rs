//! Core shared types for the companion runtime.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;

/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Identifiers for conversation sessions and stored messages.
pub use ids::{MessageId, SessionId};
