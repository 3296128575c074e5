//! Context assembly for the companion.
//!
//! [`ContextAssembler`] turns a per-turn [`ConversationContext`] (recent and
//! relevant messages plus profile and personality snapshots) into the system
//! prompt and ordered message list handed to the generation capability.

#![warn(missing_docs, clippy::pedantic)]

pub mod assembler;
pub mod context;
pub mod personality;

pub use assembler::{AssembledPrompt, ContextAssembler};
pub use context::ConversationContext;
pub use personality::{DEFAULT_PERSONALITY, PersonalityConfig};
