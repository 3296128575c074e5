//! Coordinates the recency buffer, semantic index and history journal.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future;
use tracing::{debug, error, warn};

use crate::journal::Journal;
use crate::message::Message;
use crate::recency::{RecencyBuffer, RecencyConfig};
use crate::semantic::SemanticIndex;
use crate::vector_store_api::VectorMatch;
use crate::{MemoryError, MemoryResult};

const DEFAULT_TOP_K: usize = 3;

/// Messages retrieved for one turn: the recency window plus semantically
/// relevant history that is not already in the window.
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    /// Recency buffer snapshot, oldest first.
    pub recent: Vec<Message>,
    /// Similar historical messages, most similar first, disjoint from `recent`.
    pub relevant: Vec<Message>,
}

/// Builder for [`MemoryCoordinator`] instances.
pub struct MemoryCoordinatorBuilder {
    recency_config: RecencyConfig,
    semantic: Option<SemanticIndex>,
    journal: Option<Arc<dyn Journal>>,
    top_k: usize,
}

impl MemoryCoordinatorBuilder {
    /// Starts a new builder using the supplied recency config.
    #[must_use]
    pub fn new(recency_config: RecencyConfig) -> Self {
        Self {
            recency_config,
            semantic: None,
            journal: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Installs the semantic index. This is required before calling [`build`](Self::build).
    #[must_use]
    pub fn with_semantic_index(mut self, semantic: SemanticIndex) -> Self {
        self.semantic = Some(semantic);
        self
    }

    /// Installs an optional history journal used to rebuild the recency window.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Sets how many relevant messages are retrieved per turn.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Builds the [`MemoryCoordinator`].
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::MissingSemanticIndex`] when no index was provided.
    pub fn build(self) -> MemoryResult<MemoryCoordinator> {
        let semantic = self.semantic.ok_or(MemoryError::MissingSemanticIndex)?;
        Ok(MemoryCoordinator {
            recency: Arc::new(RecencyBuffer::new(self.recency_config)),
            semantic,
            journal: self.journal,
            top_k: self.top_k,
        })
    }
}

/// Two-tier memory facade used by a conversation session.
///
/// Every message is written to both tiers together. The recency write always
/// happens first and never fails, so short-term continuity survives
/// long-term memory outages.
#[derive(Clone)]
pub struct MemoryCoordinator {
    recency: Arc<RecencyBuffer>,
    semantic: SemanticIndex,
    journal: Option<Arc<dyn Journal>>,
    top_k: usize,
}

impl MemoryCoordinator {
    /// Creates a builder for a coordinator.
    #[must_use]
    pub fn builder(config: RecencyConfig) -> MemoryCoordinatorBuilder {
        MemoryCoordinatorBuilder::new(config)
    }

    /// Returns the shared recency buffer.
    #[must_use]
    pub fn recency(&self) -> &Arc<RecencyBuffer> {
        &self.recency
    }

    /// Returns the semantic index.
    #[must_use]
    pub fn semantic(&self) -> &SemanticIndex {
        &self.semantic
    }

    /// Returns the configured number of relevant messages per turn.
    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Records a message in both tiers.
    ///
    /// Embedding and journal failures are logged and swallowed: the message
    /// stays in the recency buffer regardless.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CapacityViolation`] if the recency buffer ends up
    /// larger than its capacity, which indicates a bug.
    pub async fn add_message(&self, message: Message) -> MemoryResult<()> {
        self.recency.push(message.clone()).await;
        let len = self.recency.len().await;
        let capacity = self.recency.capacity();
        if len > capacity {
            error!(len, capacity, "recency buffer exceeded capacity");
            return Err(MemoryError::CapacityViolation { len, capacity });
        }

        let journal_write = async {
            match &self.journal {
                Some(journal) => journal.append(&message).await,
                None => Ok(()),
            }
        };
        let (journaled, indexed) =
            future::join(journal_write, self.semantic.upsert(&message)).await;

        if let Err(err) = journaled {
            warn!(message_id = %message.id(), ?err, "failed to journal message");
        }
        if let Err(err) = indexed {
            warn!(
                message_id = %message.id(),
                ?err,
                "semantic index unavailable; message kept in recency buffer only"
            );
        }
        Ok(())
    }

    /// Builds the memory part of a turn's context.
    ///
    /// The recency snapshot and the similarity search run concurrently. A
    /// failed search degrades to an empty `relevant` list. Messages already in
    /// the recency window are never repeated in `relevant`.
    pub async fn get_context_for_ai(&self, query_text: &str) -> MemoryContext {
        let capacity = self.recency.capacity();
        // Over-fetch by the window size so de-duplication can still fill top_k.
        let fetch = if self.top_k == 0 {
            0
        } else {
            self.top_k + capacity
        };
        let (recent, searched) = future::join(
            self.recency.snapshot(),
            self.semantic.search(query_text, fetch),
        )
        .await;

        let matches = searched.unwrap_or_else(|err| {
            warn!(?err, "semantic search unavailable; using recency window only");
            Vec::new()
        });

        let recent_ids: HashSet<_> = recent.iter().map(Message::id).collect();
        let relevant: Vec<Message> = matches
            .into_iter()
            .map(VectorMatch::into_message)
            .filter(|message| !recent_ids.contains(&message.id()))
            .take(self.top_k)
            .collect();

        debug!(
            recent = recent.len(),
            relevant = relevant.len(),
            "assembled memory context"
        );
        MemoryContext { recent, relevant }
    }

    /// Refills the recency buffer from the journal tail.
    ///
    /// Returns the number of restored messages; zero without a journal.
    ///
    /// # Errors
    ///
    /// Propagates journal read and decode failures.
    pub async fn restore_recent(&self) -> MemoryResult<usize> {
        let Some(journal) = &self.journal else {
            return Ok(0);
        };
        let history = journal.tail(self.recency.capacity()).await?;
        let restored = history.len();
        self.recency.restore(history).await;
        debug!(restored, "restored recency buffer from journal");
        Ok(restored)
    }

    /// Clears the recency window at a session reset. Long-term memory is kept.
    pub async fn reset_session(&self) {
        self.recency.clear().await;
    }
}

impl std::fmt::Debug for MemoryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCoordinator")
            .field("capacity", &self.recency.capacity())
            .field("top_k", &self.top_k)
            .field("journal", &self.journal.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::path::PathBuf;

    use async_trait::async_trait;

    use super::*;
    use crate::embeddings::{EmbeddingCapability, EmbeddingVector, HashingEmbedder};
    use crate::journal::FileJournal;
    use crate::vector_store_api::LocalVectorStore;

    struct OfflineEmbedder;

    #[async_trait]
    impl EmbeddingCapability for OfflineEmbedder {
        fn dimensions(&self) -> usize {
            16
        }

        async fn embed(&self, _text: &str) -> MemoryResult<EmbeddingVector> {
            Err(MemoryError::embedding_unavailable("provider offline"))
        }
    }

    fn temp_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("coordinator-{}.log", uuid::Uuid::new_v4()));
        path
    }

    fn coordinator(capacity: usize, embedder: Arc<dyn EmbeddingCapability>) -> MemoryCoordinator {
        let semantic = SemanticIndex::new(embedder, Arc::new(LocalVectorStore::new()));
        MemoryCoordinator::builder(RecencyConfig::new(NonZeroUsize::new(capacity).unwrap()))
            .with_semantic_index(semantic)
            .build()
            .unwrap()
    }

    #[test]
    fn missing_semantic_index_errors() {
        let err = MemoryCoordinator::builder(RecencyConfig::default())
            .build()
            .expect_err("semantic index required");
        assert!(matches!(err, MemoryError::MissingSemanticIndex));
    }

    #[tokio::test]
    async fn writes_both_tiers() {
        let memory = coordinator(4, Arc::new(HashingEmbedder::default()));
        memory.add_message(Message::user("hello")).await.unwrap();

        assert_eq!(memory.recency().len().await, 1);
        assert_eq!(memory.semantic().len().await, 1);
    }

    #[tokio::test]
    async fn relevant_never_repeats_recent() {
        let memory = coordinator(3, Arc::new(HashingEmbedder::default()));
        for i in 0..10 {
            memory
                .add_message(Message::user(format!("gardening tomatoes note {i}")))
                .await
                .unwrap();
        }

        let context = memory.get_context_for_ai("gardening tomatoes").await;
        assert_eq!(context.recent.len(), 3);
        assert_eq!(context.relevant.len(), 3);
        let recent_ids: HashSet<_> = context.recent.iter().map(Message::id).collect();
        assert!(context.relevant.iter().all(|m| !recent_ids.contains(&m.id())));
    }

    #[tokio::test]
    async fn degraded_mode_keeps_recency() {
        let memory = coordinator(5, Arc::new(OfflineEmbedder));
        let message = Message::user("remember this even when embeddings fail");
        memory.add_message(message.clone()).await.unwrap();

        let context = memory.get_context_for_ai("remember").await;
        assert_eq!(context.recent, vec![message]);
        assert!(context.relevant.is_empty());
        assert_eq!(memory.semantic().len().await, 0);
    }

    #[tokio::test]
    async fn restores_recent_from_journal() {
        let path = temp_path();
        let journal: Arc<dyn Journal> = Arc::new(FileJournal::open(&path).await.unwrap());
        let semantic = SemanticIndex::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(LocalVectorStore::new()),
        );
        let memory = MemoryCoordinator::builder(RecencyConfig::new(NonZeroUsize::new(2).unwrap()))
            .with_semantic_index(semantic.clone())
            .with_journal(Arc::clone(&journal))
            .build()
            .unwrap();
        for content in ["a", "b", "c"] {
            memory.add_message(Message::user(content)).await.unwrap();
        }

        let rebuilt = MemoryCoordinator::builder(RecencyConfig::new(NonZeroUsize::new(2).unwrap()))
            .with_semantic_index(semantic)
            .with_journal(journal)
            .build()
            .unwrap();
        assert_eq!(rebuilt.restore_recent().await.unwrap(), 2);
        let contents: Vec<_> = rebuilt
            .recency()
            .snapshot()
            .await
            .iter()
            .map(|m| m.content().to_owned())
            .collect();
        assert_eq!(contents, ["b", "c"]);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn reset_session_clears_window_only() {
        let memory = coordinator(4, Arc::new(HashingEmbedder::default()));
        memory.add_message(Message::user("kept long term")).await.unwrap();
        memory.reset_session().await;
        assert!(memory.recency().is_empty().await);
        assert_eq!(memory.semantic().len().await, 1);
    }
}
