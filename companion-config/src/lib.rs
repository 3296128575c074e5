//! Configuration for the companion runtime.
//!
//! [`CompanionConfig`] is read from a JSON file, adjusted by `COMPANION_*`
//! environment variables and validated before use.

#![warn(missing_docs, clippy::pedantic)]

mod error;

pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides, load_from_path};
pub use schema::{
    CompanionConfig, GenerationSection, MemorySection, ProfileSection, StorageSection,
};
