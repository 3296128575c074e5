//! Multi-user session registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use companion_adapters::GenerationCapability;
use companion_config::CompanionConfig;
use companion_memory::{
    EmbeddingCapability, FileJournal, FileVectorStore, LocalVectorStore, MemoryCoordinator,
    RecencyConfig, SemanticIndex, VectorStoreClient,
};
use companion_primitives::SessionId;
use companion_profile::{FileProfileStore, InMemoryProfileStore, ProfileManager, ProfileStore};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::SessionResult;
use crate::session::CompanionSession;

const USERS_DIR: &str = "users";
const VECTORS_FILE: &str = "vectors.jsonl";
const HISTORY_FILE: &str = "history.jsonl";

/// Where session state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Per-user files under `<data_dir>/users/<id>/`.
    Disk,
    /// Process memory only; nothing survives a restart.
    InMemory,
}

/// Lazily opens one isolated [`CompanionSession`] per user id.
///
/// Sessions are cached, so repeated lookups for the same id return the same
/// session and therefore share its turn serialisation.
pub struct SessionRegistry {
    config: CompanionConfig,
    mode: StorageMode,
    generator: Arc<dyn GenerationCapability>,
    embedder: Arc<dyn EmbeddingCapability>,
    profiles: Arc<dyn ProfileStore>,
    sessions: RwLock<HashMap<SessionId, Arc<CompanionSession>>>,
}

impl SessionRegistry {
    /// Creates a registry storing sessions under `config.storage.data_dir`.
    #[must_use]
    pub fn new(
        config: CompanionConfig,
        generator: Arc<dyn GenerationCapability>,
        embedder: Arc<dyn EmbeddingCapability>,
    ) -> Self {
        let profiles = Arc::new(FileProfileStore::new(
            config.storage.data_dir.join(USERS_DIR),
        ));
        Self::with_storage(config, StorageMode::Disk, generator, embedder, profiles)
    }

    /// Creates a registry that keeps everything in memory.
    #[must_use]
    pub fn in_memory(
        config: CompanionConfig,
        generator: Arc<dyn GenerationCapability>,
        embedder: Arc<dyn EmbeddingCapability>,
    ) -> Self {
        let profiles = Arc::new(InMemoryProfileStore::new());
        Self::with_storage(config, StorageMode::InMemory, generator, embedder, profiles)
    }

    fn with_storage(
        config: CompanionConfig,
        mode: StorageMode,
        generator: Arc<dyn GenerationCapability>,
        embedder: Arc<dyn EmbeddingCapability>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            config,
            mode,
            generator,
            embedder,
            profiles,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the storage mode.
    #[must_use]
    pub const fn mode(&self) -> StorageMode {
        self.mode
    }

    /// Returns the registry configuration.
    #[must_use]
    pub fn config(&self) -> &CompanionConfig {
        &self.config
    }

    /// Returns the session for `user_id`, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidSessionId`](crate::SessionError::InvalidSessionId)
    /// for ids that are not path-safe, or storage errors while opening.
    pub async fn session(&self, user_id: &str) -> SessionResult<Arc<CompanionSession>> {
        let id = SessionId::new(user_id)?;
        if let Some(session) = self.sessions.read().await.get(&id) {
            return Ok(Arc::clone(session));
        }

        // Opened outside the map lock so a slow open only delays this user.
        // If two first lookups race, the session inserted first wins.
        let opened = Arc::new(self.open(id.clone()).await?);
        let mut sessions = self.sessions.write().await;
        Ok(Arc::clone(sessions.entry(id).or_insert(opened)))
    }

    /// Drops a cached session. Its stored data is kept.
    pub async fn close(&self, user_id: &str) -> bool {
        let Ok(id) = SessionId::new(user_id) else {
            return false;
        };
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Ids of the currently open sessions, sorted.
    pub async fn open_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Directory holding the files of `id` in disk mode.
    #[must_use]
    pub fn user_dir(&self, id: &SessionId) -> PathBuf {
        self.config
            .storage
            .data_dir
            .join(USERS_DIR)
            .join(id.as_str())
    }

    async fn open(&self, id: SessionId) -> SessionResult<CompanionSession> {
        let memory_config = &self.config.memory;
        let mut journal = None;
        let store: Arc<dyn VectorStoreClient> = match self.mode {
            StorageMode::Disk => {
                let dir = self.user_dir(&id);
                fs::create_dir_all(&dir).await?;
                if self.config.storage.persist_history {
                    journal = Some(Arc::new(FileJournal::open(dir.join(HISTORY_FILE)).await?));
                }
                Arc::new(FileVectorStore::open(dir.join(VECTORS_FILE)).await?)
            }
            StorageMode::InMemory => Arc::new(LocalVectorStore::new()),
        };

        let semantic = SemanticIndex::new(Arc::clone(&self.embedder), store)
            .with_embed_timeout(memory_config.embedding_timeout());
        let mut builder =
            MemoryCoordinator::builder(RecencyConfig::new(memory_config.recency_capacity))
                .with_semantic_index(semantic)
                .with_top_k(memory_config.relevant_top_k);
        if let Some(journal) = journal {
            builder = builder.with_journal(journal);
        }
        let memory = builder.build()?;
        match memory.restore_recent().await {
            Ok(0) => {}
            Ok(restored) => info!(session = %id, restored, "restored recent conversation"),
            Err(err) => warn!(session = %id, ?err, "could not restore recent conversation"),
        }

        let profile = ProfileManager::load(id.clone(), Arc::clone(&self.profiles)).await;
        let session = CompanionSession::builder(id)
            .memory(memory)
            .profile(Arc::new(profile))
            .generator(Arc::clone(&self.generator))
            .generation_options(self.config.generation.options())
            .extraction_options(self.config.profile.options())
            .personality(self.config.personality.clone())
            .build()?;
        info!(session = %session.id(), mode = ?self.mode, "session opened");
        Ok(session)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("mode", &self.mode)
            .field("data_dir", &self.config.storage.data_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use companion_adapters::MockGenerator;
    use companion_memory::HashingEmbedder;
    use companion_profile::{ProfileResult, UserProfile};
    use tokio::sync::Notify;

    use super::*;

    /// Holds profile loads for one user until released.
    struct GatedStore {
        stalled: SessionId,
        release: Notify,
        inner: InMemoryProfileStore,
    }

    #[async_trait]
    impl ProfileStore for GatedStore {
        async fn load(&self, session: &SessionId) -> ProfileResult<Option<UserProfile>> {
            if *session == self.stalled {
                self.release.notified().await;
            }
            self.inner.load(session).await
        }

        async fn save(&self, session: &SessionId, profile: &UserProfile) -> ProfileResult<()> {
            self.inner.save(session, profile).await
        }
    }

    fn registry(profiles: Arc<dyn ProfileStore>) -> SessionRegistry {
        SessionRegistry::with_storage(
            CompanionConfig::default(),
            StorageMode::InMemory,
            Arc::new(MockGenerator::new()),
            Arc::new(HashingEmbedder::default()),
            profiles,
        )
    }

    #[tokio::test]
    async fn slow_open_does_not_block_other_users() {
        let store = Arc::new(GatedStore {
            stalled: SessionId::new("slow").unwrap(),
            release: Notify::new(),
            inner: InMemoryProfileStore::new(),
        });
        let registry = Arc::new(registry(Arc::clone(&store) as Arc<dyn ProfileStore>));

        let pending = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.session("slow").await.map(|s| s.id().clone()) }
        });
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(Duration::from_secs(5), registry.session("fast"))
            .await
            .expect("lookup blocked by another user's open")
            .unwrap();
        assert_eq!(fast.id().as_str(), "fast");

        store.release.notify_one();
        let slow = pending.await.unwrap().unwrap();
        assert_eq!(slow.as_str(), "slow");
        assert_eq!(registry.open_sessions().await.len(), 2);
    }

    #[tokio::test]
    async fn racing_first_lookups_share_one_session() {
        let registry = registry(Arc::new(InMemoryProfileStore::new()));
        let (first, second) = tokio::join!(registry.session("ada"), registry.session("ada"));
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
        assert_eq!(registry.open_sessions().await.len(), 1);
    }
}
