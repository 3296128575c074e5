//! User profile learning for the companion.
//!
//! A [`ProfileManager`] owns one user's [`UserProfile`] and persists it through
//! a [`ProfileStore`]. The [`ProfileUpdateScheduler`] counts completed turns
//! and, on an adaptive cadence, asks a [`ProfileExtractor`] to derive new facts
//! from the recent conversation.

#![warn(missing_docs, clippy::pedantic)]

mod error;

pub mod extractor;
pub mod manager;
pub mod profile;
pub mod scheduler;
pub mod store;

pub use error::{ProfileError, ProfileResult};
pub use extractor::{ProfileExtractor, parse_extraction};
pub use manager::ProfileManager;
pub use profile::{ProfileExtraction, UserProfile};
pub use scheduler::{
    ProfileUpdateCycle, ProfileUpdateScheduler, SchedulerPhase, UpdateOutcome, threshold,
};
pub use store::{FileProfileStore, InMemoryProfileStore, ProfileStore};
