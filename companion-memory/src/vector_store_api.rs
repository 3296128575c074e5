//! Vector store traits and a local in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use companion_primitives::MessageId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::embeddings::EmbeddingVector;
use crate::message::Message;
use crate::{MemoryError, MemoryResult};

/// A stored message together with the embedding of its content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticRecord {
    message: Message,
    embedding: EmbeddingVector,
}

impl SemanticRecord {
    /// Pairs a message with its embedding.
    #[must_use]
    pub fn new(message: Message, embedding: EmbeddingVector) -> Self {
        Self { message, embedding }
    }

    /// Returns the key of this record.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.message.id()
    }

    /// Returns the stored message.
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns the embedding reference.
    #[must_use]
    pub fn embedding(&self) -> &EmbeddingVector {
        &self.embedding
    }
}

/// Query parameters for retrieving similar records.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    embedding: EmbeddingVector,
    top_k: usize,
}

impl VectorQuery {
    /// Creates a new query request. A `top_k` of zero yields no matches.
    #[must_use]
    pub fn new(embedding: EmbeddingVector, top_k: usize) -> Self {
        Self { embedding, top_k }
    }

    /// Returns the embedding driving the query.
    #[must_use]
    pub fn embedding(&self) -> &EmbeddingVector {
        &self.embedding
    }

    /// Returns the desired number of results.
    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

/// Match returned from a vector store query.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    message: Message,
    score: f32,
}

impl VectorMatch {
    /// Creates a match structure.
    #[must_use]
    pub fn new(message: Message, score: f32) -> Self {
        Self { message, score }
    }

    /// Returns the matched message.
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Consumes the match, returning the message.
    #[must_use]
    pub fn into_message(self) -> Message {
        self.message
    }

    /// Returns the cosine similarity score.
    #[must_use]
    pub fn score(&self) -> f32 {
        self.score
    }
}

/// Interface for vector store clients.
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    /// Inserts or replaces the record keyed by its message id.
    async fn upsert(&self, record: SemanticRecord) -> MemoryResult<()>;

    /// Removes a record if present.
    async fn remove(&self, id: MessageId) -> MemoryResult<()>;

    /// Returns up to `top_k` matches ordered by descending cosine similarity,
    /// ties broken by newer timestamp first and then by message id.
    async fn query(&self, query: &VectorQuery) -> MemoryResult<Vec<VectorMatch>>;

    /// Number of stored records.
    async fn len(&self) -> usize;
}

#[derive(Debug, Default)]
struct LocalInner {
    dimensions: Option<usize>,
    records: HashMap<MessageId, SemanticRecord>,
}

/// Simple in-memory vector store using cosine similarity.
///
/// The first stored record fixes the dimensionality; later records and
/// queries with a different length are rejected.
#[derive(Debug, Default)]
pub struct LocalVectorStore {
    inner: RwLock<LocalInner>,
}

impl LocalVectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the dimensionality fixed by the first record, if any.
    pub async fn dimensions(&self) -> Option<usize> {
        self.inner.read().await.dimensions
    }

    /// Returns a copy of every stored record.
    pub async fn records(&self) -> Vec<SemanticRecord> {
        self.inner.read().await.records.values().cloned().collect()
    }
}

#[async_trait]
impl VectorStoreClient for LocalVectorStore {
    async fn upsert(&self, record: SemanticRecord) -> MemoryResult<()> {
        let mut guard = self.inner.write().await;
        let actual = record.embedding().len();
        match guard.dimensions {
            Some(expected) if expected != actual => {
                return Err(MemoryError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => guard.dimensions = Some(actual),
        }
        guard.records.insert(record.id(), record);
        Ok(())
    }

    async fn remove(&self, id: MessageId) -> MemoryResult<()> {
        let mut guard = self.inner.write().await;
        guard.records.remove(&id);
        Ok(())
    }

    async fn query(&self, query: &VectorQuery) -> MemoryResult<Vec<VectorMatch>> {
        let guard = self.inner.read().await;
        if query.top_k() == 0 || guard.records.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = guard.dimensions {
            let actual = query.embedding().len();
            if expected != actual {
                return Err(MemoryError::DimensionMismatch { expected, actual });
            }
        }

        let mut matches: Vec<VectorMatch> = guard
            .records
            .values()
            .map(|record| {
                let score = record.embedding().cosine_similarity(query.embedding());
                VectorMatch::new(record.message().clone(), score)
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.message.timestamp().cmp(&a.message.timestamp()))
                .then_with(|| a.message.id().cmp(&b.message.id()))
        });
        matches.truncate(query.top_k());
        Ok(matches)
    }

    async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::message::Role;

    fn record(content: &str, values: Vec<f32>) -> SemanticRecord {
        SemanticRecord::new(
            Message::user(content),
            EmbeddingVector::new(values).unwrap(),
        )
    }

    #[tokio::test]
    async fn basic_query() {
        let store = LocalVectorStore::new();
        store.upsert(record("alpha", vec![1.0, 0.0, 0.0])).await.unwrap();
        store.upsert(record("beta", vec![0.0, 1.0, 0.0])).await.unwrap();

        let query = VectorQuery::new(EmbeddingVector::new(vec![1.0, 0.0, 0.0]).unwrap(), 1);
        let matches = store.query(&query).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].message().content(), "alpha");
        assert!((matches[0].score() - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn returns_fewer_than_top_k() {
        let store = LocalVectorStore::new();
        let query = VectorQuery::new(EmbeddingVector::new(vec![1.0]).unwrap(), 3);
        assert!(store.query(&query).await.unwrap().is_empty());

        store.upsert(record("only", vec![1.0])).await.unwrap();
        assert_eq!(store.query(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_same_id_overwrites() {
        let store = LocalVectorStore::new();
        let message = Message::user("v1");
        let embedding = EmbeddingVector::new(vec![1.0, 0.0]).unwrap();
        store
            .upsert(SemanticRecord::new(message.clone(), embedding.clone()))
            .await
            .unwrap();
        store
            .upsert(SemanticRecord::new(message, embedding))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn ties_prefer_newer_messages() {
        let store = LocalVectorStore::new();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        for (offset, content) in [(0, "old"), (2, "newest"), (1, "middle")] {
            let message = Message::builder(Role::User, content)
                .timestamp(base + Duration::from_secs(offset))
                .build();
            store
                .upsert(SemanticRecord::new(
                    message,
                    EmbeddingVector::new(vec![0.5, 0.5]).unwrap(),
                ))
                .await
                .unwrap();
        }

        let query = VectorQuery::new(EmbeddingVector::new(vec![1.0, 1.0]).unwrap(), 3);
        let order: Vec<_> = store
            .query(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message().content().to_owned())
            .collect();
        assert_eq!(order, ["newest", "middle", "old"]);
    }

    #[tokio::test]
    async fn rejects_dimension_changes() {
        let store = LocalVectorStore::new();
        store.upsert(record("a", vec![1.0, 0.0])).await.unwrap();
        let err = store
            .upsert(record("b", vec![1.0, 0.0, 0.0]))
            .await
            .expect_err("dimension mismatch");
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(store.dimensions().await, Some(2));
    }
}
