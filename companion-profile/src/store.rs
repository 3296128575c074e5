//! Profile persistence backends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use companion_primitives::SessionId;
use tokio::fs;
use tokio::sync::RwLock;

use crate::ProfileResult;
use crate::profile::UserProfile;

const PROFILE_FILE: &str = "profile.json";

/// Trait implemented by profile persistence backends.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Loads the stored profile for `session`, if any.
    async fn load(&self, session: &SessionId) -> ProfileResult<Option<UserProfile>>;

    /// Replaces the stored profile for `session`.
    async fn save(&self, session: &SessionId, profile: &UserProfile) -> ProfileResult<()>;
}

/// Stores each profile as pretty JSON at `<root>/<session>/profile.json`.
///
/// Writes go to a temporary sibling file that is then renamed over the
/// previous version, so a crash never leaves a half-written profile.
#[derive(Debug, Clone)]
pub struct FileProfileStore {
    root: PathBuf,
}

impl FileProfileStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the profile path for `session`.
    #[must_use]
    pub fn profile_path(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.as_str()).join(PROFILE_FILE)
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn load(&self, session: &SessionId) -> ProfileResult<Option<UserProfile>> {
        let path = self.profile_path(session);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = fs::read(&path).await?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    async fn save(&self, session: &SessionId, profile: &UserProfile) -> ProfileResult<()> {
        let path = self.profile_path(session);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(profile)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// In-memory store, mainly for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<SessionId, UserProfile>>,
    saves: AtomicUsize,
}

impl InMemoryProfileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load(&self, session: &SessionId) -> ProfileResult<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(session).cloned())
    }

    async fn save(&self, session: &SessionId, profile: &UserProfile) -> ProfileResult<()> {
        self.profiles
            .write()
            .await
            .insert(session.clone(), profile.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn file_store_round_trips_and_replaces() {
        let root = std::env::temp_dir().join(format!("profiles-{}", Uuid::new_v4()));
        let store = FileProfileStore::new(&root);
        let session = SessionId::new("alex").unwrap();

        assert!(store.load(&session).await.unwrap().is_none());

        let mut profile = UserProfile::default();
        profile.name = Some("Alex".to_owned());
        profile.conversation_count = 3;
        store.save(&session, &profile).await.unwrap();

        profile.conversation_count = 4;
        store.save(&session, &profile).await.unwrap();

        let loaded = store.load(&session).await.unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert!(!store.profile_path(&session).with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_files() {
        let root = std::env::temp_dir().join(format!("profiles-{}", Uuid::new_v4()));
        let store = FileProfileStore::new(&root);
        let session = SessionId::new("broken").unwrap();
        let path = store.profile_path(&session);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();

        assert!(store.load(&session).await.is_err());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn memory_store_counts_saves() {
        let store = InMemoryProfileStore::new();
        let session = SessionId::new("s1").unwrap();
        store.save(&session, &UserProfile::default()).await.unwrap();
        assert_eq!(store.saves(), 1);
        assert!(store.load(&session).await.unwrap().is_some());
    }
}
