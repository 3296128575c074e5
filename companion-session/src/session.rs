//! Per-user conversation session and its turn pipeline.

use std::sync::Arc;

use companion_adapters::{
    DEFAULT_GENERATION_TIMEOUT, GenerationCapability, GenerationOptions, generate_with_deadline,
};
use companion_memory::{MemoryCoordinator, Message};
use companion_primitives::SessionId;
use companion_profile::{
    ProfileExtractor, ProfileManager, ProfileResult, ProfileUpdateScheduler, UpdateOutcome,
    UserProfile,
};
use companion_prompts::{ContextAssembler, ConversationContext, PersonalityConfig};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult, TurnError, TurnResult};

/// Result of one completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Recorded user message.
    pub user_message: Message,
    /// Recorded assistant reply.
    pub reply: Message,
    /// What the profile scheduler did after the turn.
    pub profile_update: UpdateOutcome,
}

/// Builder for [`CompanionSession`].
pub struct CompanionSessionBuilder {
    id: SessionId,
    memory: Option<MemoryCoordinator>,
    profile: Option<Arc<ProfileManager>>,
    generator: Option<Arc<dyn GenerationCapability>>,
    extraction_generator: Option<Arc<dyn GenerationCapability>>,
    extraction_options: GenerationOptions,
    generation_options: GenerationOptions,
    personality: PersonalityConfig,
}

impl CompanionSessionBuilder {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            memory: None,
            profile: None,
            generator: None,
            extraction_generator: None,
            extraction_options: GenerationOptions::new()
                .with_temperature(0.0)
                .with_timeout(DEFAULT_GENERATION_TIMEOUT),
            generation_options: GenerationOptions::new().with_timeout(DEFAULT_GENERATION_TIMEOUT),
            personality: PersonalityConfig::default(),
        }
    }

    /// Installs the two-tier memory. Required.
    #[must_use]
    pub fn memory(mut self, memory: MemoryCoordinator) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Installs the profile manager. Required.
    #[must_use]
    pub fn profile(mut self, profile: Arc<ProfileManager>) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Installs the reply generator. Required.
    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn GenerationCapability>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Uses a separate generator for profile extraction. Defaults to the
    /// reply generator.
    #[must_use]
    pub fn extraction_generator(mut self, generator: Arc<dyn GenerationCapability>) -> Self {
        self.extraction_generator = Some(generator);
        self
    }

    /// Options for reply generation. Without a deadline,
    /// [`DEFAULT_GENERATION_TIMEOUT`] applies.
    #[must_use]
    pub fn generation_options(mut self, options: GenerationOptions) -> Self {
        self.generation_options = options.or_timeout(DEFAULT_GENERATION_TIMEOUT);
        self
    }

    /// Options for profile extraction. Without a deadline,
    /// [`DEFAULT_GENERATION_TIMEOUT`] applies.
    #[must_use]
    pub fn extraction_options(mut self, options: GenerationOptions) -> Self {
        self.extraction_options = options.or_timeout(DEFAULT_GENERATION_TIMEOUT);
        self
    }

    /// Sets the companion personality.
    #[must_use]
    pub fn personality(mut self, personality: PersonalityConfig) -> Self {
        self.personality = personality;
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Missing`] when memory, profile or generator
    /// were not supplied.
    pub fn build(self) -> SessionResult<CompanionSession> {
        let memory = self.memory.ok_or(SessionError::Missing("memory"))?;
        let profile = self.profile.ok_or(SessionError::Missing("profile"))?;
        let generator = self.generator.ok_or(SessionError::Missing("generator"))?;

        let extractor = ProfileExtractor::new(
            self.extraction_generator
                .unwrap_or_else(|| Arc::clone(&generator)),
        )
        .with_options(self.extraction_options);
        let scheduler = ProfileUpdateScheduler::new(
            Arc::clone(memory.recency()),
            Arc::clone(&profile),
            extractor,
        );
        let assembler = self
            .generation_options
            .max_output_tokens()
            .map_or_else(ContextAssembler::default, ContextAssembler::new);

        Ok(CompanionSession {
            id: self.id,
            memory,
            profile,
            scheduler,
            generator,
            generation_options: self.generation_options,
            assembler,
            personality: RwLock::new(self.personality),
            turn: Mutex::new(()),
        })
    }
}

/// One user's conversation: memory, profile and the turn pipeline.
///
/// Turns on the same session never interleave. Separate sessions share no
/// state.
pub struct CompanionSession {
    id: SessionId,
    memory: MemoryCoordinator,
    profile: Arc<ProfileManager>,
    scheduler: ProfileUpdateScheduler,
    generator: Arc<dyn GenerationCapability>,
    generation_options: GenerationOptions,
    assembler: ContextAssembler,
    personality: RwLock<PersonalityConfig>,
    turn: Mutex<()>,
}

impl CompanionSession {
    /// Starts building a session for `id`.
    #[must_use]
    pub fn builder(id: SessionId) -> CompanionSessionBuilder {
        CompanionSessionBuilder::new(id)
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the session memory.
    #[must_use]
    pub fn memory(&self) -> &MemoryCoordinator {
        &self.memory
    }

    /// Returns the profile manager.
    #[must_use]
    pub fn profile(&self) -> &Arc<ProfileManager> {
        &self.profile
    }

    /// Returns the profile update scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &ProfileUpdateScheduler {
        &self.scheduler
    }

    /// Returns a copy of the current personality.
    pub async fn personality(&self) -> PersonalityConfig {
        self.personality.read().await.clone()
    }

    /// Replaces the personality used from the next turn on.
    pub async fn set_personality(&self, personality: PersonalityConfig) {
        *self.personality.write().await = personality;
        info!(session = %self.id, "personality updated");
    }

    /// Runs one turn: records the user message, builds context, generates a
    /// reply, records it and lets the profile scheduler run.
    ///
    /// If the turn is cancelled or generation fails, the user message stays
    /// recorded and the turn does not count towards profile updates.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::EmptyMessage`] for blank input,
    /// [`TurnError::GenerationUnavailable`] when no reply could be produced and
    /// [`TurnError::Memory`] on memory invariant violations.
    pub async fn respond(&self, text: &str) -> TurnResult<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let _turn = self.turn.lock().await;

        let user_message = Message::user(text);
        self.memory.add_message(user_message.clone()).await?;

        let retrieved = self.memory.get_context_for_ai(text).await;
        let context = ConversationContext::new(
            retrieved,
            self.profile.snapshot().await,
            self.personality().await,
        );
        let prompt = self.assembler.build(&context);

        let reply_text = generate_with_deadline(
            self.generator.as_ref(),
            &prompt.messages,
            &prompt.system_prompt,
            &self.generation_options,
        )
        .await
        .map_err(|err| {
            warn!(
                session = %self.id,
                message_id = %user_message.id(),
                ?err,
                "generation failed; user message kept"
            );
            TurnError::GenerationUnavailable(err)
        })?;

        let reply = Message::assistant(reply_text.trim());
        self.memory.add_message(reply.clone()).await?;
        debug!(session = %self.id, reply_id = %reply.id(), "turn recorded");

        let profile_update = self.scheduler.on_turn_completed().await;
        Ok(TurnOutcome {
            user_message,
            reply,
            profile_update,
        })
    }

    /// Returns a copy of the user profile.
    pub async fn user_profile(&self) -> UserProfile {
        self.profile.snapshot().await
    }

    /// Applies a manual profile edit.
    ///
    /// # Errors
    ///
    /// Propagates profile persistence failures.
    pub async fn edit_profile<F>(&self, edit: F) -> ProfileResult<UserProfile>
    where
        F: FnOnce(&mut UserProfile) + Send,
    {
        self.profile.edit(edit).await
    }

    /// Clears the recency window. Long-term memory and the profile are kept.
    pub async fn reset_conversation(&self) {
        let _turn = self.turn.lock().await;
        self.memory.reset_session().await;
        info!(session = %self.id, "conversation window cleared");
    }
}

impl std::fmt::Debug for CompanionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanionSession")
            .field("id", &self.id)
            .field("memory", &self.memory)
            .field("provider", &self.generator.metadata().provider())
            .finish_non_exhaustive()
    }
}
