//! Adaptive scheduling of profile extraction passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use companion_memory::RecencyBuffer;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::ProfileError;
use crate::extractor::ProfileExtractor;
use crate::manager::ProfileManager;

/// Turns that must accumulate before the next extraction.
///
/// Every 5 turns for the first four passes, every 10 for the next three, and
/// every 15 afterwards.
#[must_use]
pub const fn threshold(total_updates_performed: u32) -> u32 {
    match total_updates_performed {
        0..=3 => 5,
        4..=6 => 10,
        _ => 15,
    }
}

/// Counters driving the extraction cadence of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdateCycle {
    /// Turns completed since the last successful extraction.
    pub turns_since_last_update: u32,
    /// Successful extractions so far.
    pub total_updates_performed: u32,
}

impl ProfileUpdateCycle {
    /// Turns required before the next extraction.
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        threshold(self.total_updates_performed)
    }

    /// Returns `true` once enough turns have accumulated.
    #[must_use]
    pub const fn is_due(&self) -> bool {
        self.turns_since_last_update >= self.threshold()
    }
}

/// Observable phase of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Waiting for the threshold.
    Idle,
    /// An extraction pass is in flight.
    Extracting,
}

/// Result of reporting one completed turn.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// Threshold not reached yet.
    Waiting {
        /// Turns counted so far in this cycle.
        turns_since_last_update: u32,
        /// Turns required for the next extraction.
        threshold: u32,
    },
    /// An extraction pass completed and the cycle restarted.
    Updated {
        /// Whether the profile gained new information.
        changed: bool,
        /// Successful extractions including this one.
        total_updates_performed: u32,
    },
    /// The extraction pass failed; the next turn retries it.
    Failed(ProfileError),
}

/// Decides after each turn whether to run a profile extraction and runs it.
///
/// At most one extraction is in flight per profile. Turns reported while an
/// extraction runs are queued and counted once it finishes.
pub struct ProfileUpdateScheduler {
    recency: Arc<RecencyBuffer>,
    profile: Arc<ProfileManager>,
    extractor: ProfileExtractor,
    cycle: Mutex<ProfileUpdateCycle>,
    queued_turns: AtomicU32,
    extracting: AtomicBool,
}

impl ProfileUpdateScheduler {
    /// Creates a scheduler reading the extraction window from `recency`.
    #[must_use]
    pub fn new(
        recency: Arc<RecencyBuffer>,
        profile: Arc<ProfileManager>,
        extractor: ProfileExtractor,
    ) -> Self {
        Self {
            recency,
            profile,
            extractor,
            cycle: Mutex::new(ProfileUpdateCycle::default()),
            queued_turns: AtomicU32::new(0),
            extracting: AtomicBool::new(false),
        }
    }

    /// Returns the profile manager fed by this scheduler.
    #[must_use]
    pub fn profile(&self) -> &Arc<ProfileManager> {
        &self.profile
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        if self.extracting.load(Ordering::Acquire) {
            SchedulerPhase::Extracting
        } else {
            SchedulerPhase::Idle
        }
    }

    /// Turns reported but not yet counted, non-zero only while an extraction
    /// is in flight.
    #[must_use]
    pub fn queued_turns(&self) -> u32 {
        self.queued_turns.load(Ordering::Acquire)
    }

    /// Returns the cycle counters, waiting for any in-flight extraction.
    pub async fn cycle(&self) -> ProfileUpdateCycle {
        *self.cycle.lock().await
    }

    /// Records one completed turn and runs an extraction when due.
    ///
    /// Failures never propagate: they are logged, the turn counter is kept,
    /// and the next turn tries again.
    pub async fn on_turn_completed(&self) -> UpdateOutcome {
        self.queued_turns.fetch_add(1, Ordering::AcqRel);
        let mut cycle = self.cycle.lock().await;

        let turns = self.queued_turns.swap(0, Ordering::AcqRel);
        if turns == 0 {
            // An earlier caller already counted this turn.
            return UpdateOutcome::Waiting {
                turns_since_last_update: cycle.turns_since_last_update,
                threshold: cycle.threshold(),
            };
        }

        cycle.turns_since_last_update += turns;
        if let Err(err) = self.profile.record_turns(turns).await {
            warn!(session = %self.profile.session(), ?err, "failed to persist conversation count");
        }

        if !cycle.is_due() {
            debug!(
                turns = cycle.turns_since_last_update,
                threshold = cycle.threshold(),
                "profile update not due"
            );
            return UpdateOutcome::Waiting {
                turns_since_last_update: cycle.turns_since_last_update,
                threshold: cycle.threshold(),
            };
        }

        info!(
            session = %self.profile.session(),
            turns = cycle.turns_since_last_update,
            pass = cycle.total_updates_performed + 1,
            "starting profile extraction"
        );
        let result = {
            let _phase = ExtractingPhase::enter(&self.extracting);
            self.run_extraction().await
        };

        match result {
            Ok(changed) => {
                cycle.turns_since_last_update = 0;
                cycle.total_updates_performed += 1;
                info!(
                    session = %self.profile.session(),
                    changed,
                    total = cycle.total_updates_performed,
                    next_threshold = cycle.threshold(),
                    "profile extraction completed"
                );
                UpdateOutcome::Updated {
                    changed,
                    total_updates_performed: cycle.total_updates_performed,
                }
            }
            Err(err) => {
                warn!(
                    session = %self.profile.session(),
                    ?err,
                    turns = cycle.turns_since_last_update,
                    "profile extraction failed; retrying next turn"
                );
                UpdateOutcome::Failed(err)
            }
        }
    }

    async fn run_extraction(&self) -> Result<bool, ProfileError> {
        let window = self.recency.snapshot().await;
        let known = self.profile.snapshot().await;
        let extraction = self.extractor.extract(&window, &known).await?;
        self.profile.apply_extraction(extraction).await
    }
}

impl std::fmt::Debug for ProfileUpdateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileUpdateScheduler")
            .field("session", self.profile.session())
            .field("phase", &self.phase())
            .field("queued_turns", &self.queued_turns())
            .finish_non_exhaustive()
    }
}

/// Marks the scheduler as extracting until dropped, including on cancellation.
struct ExtractingPhase<'a>(&'a AtomicBool);

impl<'a> ExtractingPhase<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ExtractingPhase<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use companion_adapters::{
        AdapterMetadata, GenerationCapability, GenerationError, GenerationOptions,
        GenerationResult, PromptMessage,
    };
    use companion_memory::{Message, RecencyConfig};
    use companion_primitives::SessionId;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::store::InMemoryProfileStore;

    /// Replies from a script; an exhausted script answers with `{}`.
    struct ScriptedGenerator {
        metadata: AdapterMetadata,
        script: std::sync::Mutex<VecDeque<GenerationResult<String>>>,
        gate: Option<Arc<Semaphore>>,
        calls: AtomicU32,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<GenerationResult<String>>) -> Self {
            Self {
                metadata: AdapterMetadata::new("scripted", "test"),
                script: std::sync::Mutex::new(script.into()),
                gate: None,
                calls: AtomicU32::new(0),
            }
        }

        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationCapability for ScriptedGenerator {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }

        async fn generate(
            &self,
            _messages: &[PromptMessage],
            _system_prompt: &str,
            _options: &GenerationOptions,
        ) -> GenerationResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok("{}".to_owned()))
        }
    }

    async fn scheduler(generator: Arc<ScriptedGenerator>) -> ProfileUpdateScheduler {
        let recency = Arc::new(RecencyBuffer::new(RecencyConfig::default()));
        recency.push(Message::user("my name is Kai")).await;
        let profile = Arc::new(
            ProfileManager::load(
                SessionId::new("sched").unwrap(),
                Arc::new(InMemoryProfileStore::new()),
            )
            .await,
        );
        ProfileUpdateScheduler::new(recency, profile, ProfileExtractor::new(generator))
    }

    #[test]
    fn threshold_tiers() {
        let observed: Vec<_> = (0..=8).map(threshold).collect();
        assert_eq!(observed, [5, 5, 5, 5, 10, 10, 10, 15, 15]);
        assert_eq!(threshold(100), 15);
    }

    #[tokio::test]
    async fn extracts_on_tiered_cadence() {
        let generator = Arc::new(ScriptedGenerator::new(Vec::new()));
        let scheduler = scheduler(generator.clone()).await;

        let mut extraction_turns = Vec::new();
        for turn in 1..=65 {
            if let UpdateOutcome::Updated { .. } = scheduler.on_turn_completed().await {
                extraction_turns.push(turn);
            }
        }

        assert_eq!(extraction_turns, [5, 10, 15, 20, 30, 40, 50, 65]);
        assert_eq!(generator.calls(), 8);
        let cycle = scheduler.cycle().await;
        assert_eq!(cycle.total_updates_performed, 8);
        assert_eq!(cycle.turns_since_last_update, 0);
        assert_eq!(scheduler.profile().snapshot().await.conversation_count, 65);
    }

    #[tokio::test]
    async fn failed_extraction_retries_next_turn() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("not json at all".to_owned()),
            Ok("{\"name\": \"Kai\"}".to_owned()),
        ]));
        let scheduler = scheduler(generator.clone()).await;

        for _ in 0..4 {
            scheduler.on_turn_completed().await;
        }
        let outcome = scheduler.on_turn_completed().await;
        assert!(matches!(
            outcome,
            UpdateOutcome::Failed(ProfileError::ExtractionParseError { .. })
        ));
        let cycle = scheduler.cycle().await;
        assert_eq!(cycle.turns_since_last_update, 5);
        assert_eq!(cycle.total_updates_performed, 0);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);

        let outcome = scheduler.on_turn_completed().await;
        assert!(matches!(
            outcome,
            UpdateOutcome::Updated {
                changed: true,
                total_updates_performed: 1
            }
        ));
        assert_eq!(generator.calls(), 2);
        assert_eq!(scheduler.cycle().await.turns_since_last_update, 0);
        assert_eq!(
            scheduler.profile().snapshot().await.name.as_deref(),
            Some("Kai")
        );
    }

    #[tokio::test]
    async fn provider_failure_is_contained() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(GenerationError::provider(
            "offline",
        ))]));
        let scheduler = scheduler(generator).await;
        for _ in 0..4 {
            scheduler.on_turn_completed().await;
        }
        assert!(matches!(
            scheduler.on_turn_completed().await,
            UpdateOutcome::Failed(ProfileError::Generation(_))
        ));
    }

    #[tokio::test]
    async fn turns_queue_behind_inflight_extraction() {
        let gate = Arc::new(Semaphore::new(0));
        let generator = Arc::new(ScriptedGenerator::gated(gate.clone()));
        let scheduler = Arc::new(scheduler(generator.clone()).await);

        for _ in 0..4 {
            scheduler.on_turn_completed().await;
        }
        let fifth = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.on_turn_completed().await }
        });
        wait_until(|| generator.calls() == 1).await;
        assert_eq!(scheduler.phase(), SchedulerPhase::Extracting);

        let sixth = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.on_turn_completed().await }
        });
        wait_until(|| scheduler.queued_turns() == 1).await;
        assert_eq!(generator.calls(), 1, "only one extraction in flight");

        gate.add_permits(1);
        assert!(matches!(
            fifth.await.unwrap(),
            UpdateOutcome::Updated { .. }
        ));
        assert!(matches!(
            sixth.await.unwrap(),
            UpdateOutcome::Waiting {
                turns_since_last_update: 1,
                threshold: 5
            }
        ));

        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.queued_turns(), 0);
        assert_eq!(scheduler.profile().snapshot().await.conversation_count, 6);
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition reached");
    }
}
