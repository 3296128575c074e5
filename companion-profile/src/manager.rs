//! Owns the live profile of one session and persists every mutation.

use std::sync::Arc;

use chrono::Utc;
use companion_primitives::SessionId;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::ProfileResult;
use crate::profile::{ProfileExtraction, UserProfile};
use crate::store::ProfileStore;

/// Holds the in-memory profile and writes it through to a [`ProfileStore`].
pub struct ProfileManager {
    session: SessionId,
    store: Arc<dyn ProfileStore>,
    profile: RwLock<UserProfile>,
}

impl ProfileManager {
    /// Loads the stored profile for `session`, or starts an empty one.
    ///
    /// An unreadable profile is logged and replaced by an empty profile; it is
    /// overwritten on the next persisted mutation.
    pub async fn load(session: SessionId, store: Arc<dyn ProfileStore>) -> Self {
        let profile = match store.load(&session).await {
            Ok(Some(profile)) => {
                info!(session = %session, summary = %profile.summary(), "loaded user profile");
                profile
            }
            Ok(None) => UserProfile::default(),
            Err(err) => {
                warn!(session = %session, ?err, "failed to load user profile; starting fresh");
                UserProfile::default()
            }
        };

        Self {
            session,
            store,
            profile: RwLock::new(profile),
        }
    }

    /// Returns the owning session id.
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Returns a copy of the current profile.
    pub async fn snapshot(&self) -> UserProfile {
        self.profile.read().await.clone()
    }

    /// Adds completed turns to `conversation_count`.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures. The in-memory count is updated
    /// regardless.
    pub async fn record_turns(&self, turns: u32) -> ProfileResult<u64> {
        let mut profile = self.profile.write().await;
        profile.conversation_count += u64::from(turns);
        let count = profile.conversation_count;
        self.persist(&mut profile).await?;
        Ok(count)
    }

    /// Merges extraction results and persists the profile if anything changed.
    ///
    /// Returns whether the profile changed.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn apply_extraction(&self, extraction: ProfileExtraction) -> ProfileResult<bool> {
        let mut profile = self.profile.write().await;
        if !profile.merge(extraction) {
            debug!(session = %self.session, "extraction added nothing new");
            return Ok(false);
        }
        self.persist(&mut profile).await?;
        info!(session = %self.session, summary = %profile.summary(), "user profile updated");
        Ok(true)
    }

    /// Applies a manual edit and persists the result.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn edit<F>(&self, edit: F) -> ProfileResult<UserProfile>
    where
        F: FnOnce(&mut UserProfile) + Send,
    {
        let mut profile = self.profile.write().await;
        edit(&mut profile);
        self.persist(&mut profile).await?;
        Ok(profile.clone())
    }

    /// Replaces the profile with an empty one and persists it.
    ///
    /// The version counter keeps increasing across resets.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn reset(&self) -> ProfileResult<()> {
        let mut profile = self.profile.write().await;
        let version = profile.version;
        *profile = UserProfile {
            version,
            ..UserProfile::default()
        };
        self.persist(&mut profile).await?;
        info!(session = %self.session, "user profile reset");
        Ok(())
    }

    async fn persist(&self, profile: &mut UserProfile) -> ProfileResult<()> {
        profile.version += 1;
        profile.last_updated = Utc::now();
        self.store.save(&self.session, profile).await
    }
}

impl std::fmt::Debug for ProfileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileManager")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryProfileStore;

    async fn manager() -> (ProfileManager, Arc<InMemoryProfileStore>) {
        let store = Arc::new(InMemoryProfileStore::new());
        let manager =
            ProfileManager::load(SessionId::new("user-1").unwrap(), store.clone()).await;
        (manager, store)
    }

    #[tokio::test]
    async fn every_mutation_is_persisted() {
        let (manager, store) = manager().await;

        assert_eq!(manager.record_turns(1).await.unwrap(), 1);
        assert_eq!(manager.record_turns(2).await.unwrap(), 3);
        let changed = manager
            .apply_extraction(ProfileExtraction {
                name: Some("Sam".to_owned()),
                ..ProfileExtraction::default()
            })
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(store.saves(), 3);

        let stored = store.load(manager.session()).await.unwrap().unwrap();
        assert_eq!(stored.name.as_deref(), Some("Sam"));
        assert_eq!(stored.conversation_count, 3);
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn empty_extraction_skips_persistence() {
        let (manager, store) = manager().await;
        let changed = manager
            .apply_extraction(ProfileExtraction::default())
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn edit_and_reset() {
        let (manager, store) = manager().await;
        manager
            .edit(|profile| {
                profile.goals.push("write a novel".to_owned());
            })
            .await
            .unwrap();
        manager.record_turns(4).await.unwrap();

        manager.reset().await.unwrap();
        let profile = manager.snapshot().await;
        assert!(profile.is_empty());
        assert_eq!(profile.conversation_count, 0);
        assert_eq!(profile.version, 3);
        assert_eq!(store.saves(), 3);
    }

    #[tokio::test]
    async fn reloads_existing_profile() {
        let store = Arc::new(InMemoryProfileStore::new());
        let session = SessionId::new("returning").unwrap();
        {
            let manager = ProfileManager::load(session.clone(), store.clone()).await;
            manager
                .edit(|profile| profile.name = Some("Robin".to_owned()))
                .await
                .unwrap();
        }

        let manager = ProfileManager::load(session, store).await;
        assert_eq!(manager.snapshot().await.name.as_deref(), Some("Robin"));
    }
}
