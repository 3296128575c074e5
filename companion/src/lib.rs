//! Stateful conversational companion core.
//!
//! Bundles the companion crates behind feature flags: two-tier conversation
//! memory, user profile learning, context assembly and the per-user session
//! pipeline tying them together.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use companion_primitives as primitives;

/// Generation capability contract (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use companion_adapters as adapters;

/// Recency buffer, semantic index and memory coordinator (enabled by `memory` feature).
#[cfg(feature = "memory")]
pub use companion_memory as memory;

/// User profile store, extraction and scheduling (enabled by `profile` feature).
#[cfg(feature = "profile")]
pub use companion_profile as profile;

/// Personality and context assembly (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use companion_prompts as prompts;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use companion_config as config;

/// Tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use companion_telemetry as telemetry;

/// Sessions and the turn pipeline (enabled by `session` feature).
#[cfg(feature = "session")]
pub use companion_session as session;
