//! Conversation sessions for the companion.
//!
//! A [`CompanionSession`] runs the turn pipeline for one user: record the user
//! message, fuse recent and relevant memory with the profile and personality,
//! generate a reply, record it, then let the profile scheduler decide whether
//! to re-extract the user profile. A [`SessionRegistry`] keeps sessions of
//! different users fully isolated.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod registry;
mod session;

pub use error::{SessionError, SessionResult, TurnError, TurnResult};
pub use registry::{SessionRegistry, StorageMode};
pub use session::{CompanionSession, CompanionSessionBuilder, TurnOutcome};
