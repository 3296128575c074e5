//! Generation capability adapters used by the companion runtime.
//!
//! Providers are opaque to the core: anything that can turn a system prompt and
//! an ordered message list into text implements
//! [`traits::GenerationCapability`]. The [`mock`] module ships a deterministic
//! offline provider for demos and load tests.

#![warn(missing_docs, clippy::pedantic)]

pub mod mock;
pub mod traits;

pub use mock::MockGenerator;
pub use traits::{
    AdapterMetadata, DEFAULT_GENERATION_TIMEOUT, GenerationCapability, GenerationError,
    GenerationOptions, GenerationResult, MessageRole, PromptMessage, generate_with_deadline,
};
