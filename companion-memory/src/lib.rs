//! Two-tier conversation memory.
//!
//! Short-term memory is a bounded [`RecencyBuffer`]; long-term memory is a
//! [`SemanticIndex`] over every message ever recorded. The
//! [`MemoryCoordinator`] writes both tiers together and fuses them into a
//! [`MemoryContext`] per turn.

#![warn(missing_docs, clippy::pedantic)]

mod coordinator;
mod error;

pub mod embeddings;
pub mod journal;
pub mod message;
pub mod recency;
pub mod semantic;
pub mod vector_log;
pub mod vector_store_api;

pub use coordinator::{MemoryContext, MemoryCoordinator, MemoryCoordinatorBuilder};
pub use embeddings::{EmbeddingCapability, EmbeddingVector, HashingEmbedder};
pub use error::{MemoryError, MemoryResult};
pub use journal::{FileJournal, Journal};
pub use message::{Message, MessageBuilder, Role};
pub use recency::{RecencyBuffer, RecencyConfig};
pub use semantic::SemanticIndex;
pub use vector_log::FileVectorStore;
pub use vector_store_api::{
    LocalVectorStore, SemanticRecord, VectorMatch, VectorQuery, VectorStoreClient,
};
