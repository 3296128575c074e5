//! Per-turn conversation context.

use companion_memory::{MemoryContext, Message};
use companion_profile::UserProfile;

use crate::personality::PersonalityConfig;

/// Everything the assembler needs for one turn. Rebuilt every turn and never
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    /// Recency window, oldest first.
    pub recent: Vec<Message>,
    /// Semantically relevant history, most similar first.
    pub relevant: Vec<Message>,
    /// Profile snapshot.
    pub profile: UserProfile,
    /// Personality snapshot.
    pub personality: PersonalityConfig,
}

impl ConversationContext {
    /// Combines retrieved memory with profile and personality snapshots.
    #[must_use]
    pub fn new(memory: MemoryContext, profile: UserProfile, personality: PersonalityConfig) -> Self {
        Self {
            recent: memory.recent,
            relevant: memory.relevant,
            profile,
            personality,
        }
    }
}
