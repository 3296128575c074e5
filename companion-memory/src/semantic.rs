//! Semantic index adapter: embeds messages and retrieves them by similarity.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::embeddings::{EmbeddingCapability, EmbeddingVector};
use crate::message::Message;
use crate::vector_store_api::{SemanticRecord, VectorMatch, VectorQuery, VectorStoreClient};
use crate::{MemoryError, MemoryResult};

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(5);

/// Long-term memory tier pairing an embedding capability with a vector store.
#[derive(Clone)]
pub struct SemanticIndex {
    embedder: Arc<dyn EmbeddingCapability>,
    store: Arc<dyn VectorStoreClient>,
    embed_timeout: Duration,
}

impl SemanticIndex {
    /// Creates an index over the supplied capability and store.
    #[must_use]
    pub fn new(embedder: Arc<dyn EmbeddingCapability>, store: Arc<dyn VectorStoreClient>) -> Self {
        Self {
            embedder,
            store,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }

    /// Bounds how long a single embedding call may take.
    #[must_use]
    pub fn with_embed_timeout(mut self, embed_timeout: Duration) -> Self {
        self.embed_timeout = embed_timeout;
        self
    }

    /// Returns the backing vector store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStoreClient> {
        &self.store
    }

    /// Embeds `message.content` and stores the record under the message id,
    /// replacing any previous record with that id.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EmbeddingUnavailable`] when the capability fails or
    /// times out, or the store's error when persisting fails.
    pub async fn upsert(&self, message: &Message) -> MemoryResult<()> {
        let embedding = self.embed(message.content()).await?;
        self.store
            .upsert(SemanticRecord::new(message.clone(), embedding))
            .await?;
        debug!(message_id = %message.id(), "indexed message");
        Ok(())
    }

    /// Returns up to `top_k` stored messages most similar to `query_text`.
    ///
    /// The query is embedded exactly once and the index is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EmbeddingUnavailable`] when the query cannot be
    /// embedded, or the store's error.
    pub async fn search(&self, query_text: &str, top_k: usize) -> MemoryResult<Vec<VectorMatch>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embed(query_text).await?;
        self.store.query(&VectorQuery::new(embedding, top_k)).await
    }

    /// Number of indexed messages.
    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector> {
        match timeout(self.embed_timeout, self.embedder.embed(text)).await {
            Ok(Ok(embedding)) => Ok(embedding),
            Ok(Err(err @ MemoryError::EmbeddingUnavailable { .. })) => Err(err),
            Ok(Err(other)) => Err(MemoryError::embedding_unavailable(other.to_string())),
            Err(_) => Err(MemoryError::embedding_timeout(self.embed_timeout)),
        }
    }
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("dimensions", &self.embedder.dimensions())
            .field("embed_timeout", &self.embed_timeout)
            .finish_non_exhaustive()
    }
}
