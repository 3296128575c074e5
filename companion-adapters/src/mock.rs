//! Deterministic offline provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::traits::{
    AdapterMetadata, GenerationCapability, GenerationOptions, GenerationResult, MessageRole,
    PromptMessage,
};

const OPENERS: &[&str] = &[
    "That's an interesting question! Let me think about that...",
    "I understand what you're asking. Here's my perspective:",
    "Thanks for sharing that with me.",
    "That's a thoughtful point.",
    "I appreciate you asking.",
];

const CLOSERS: &[&str] = &[
    "There are many ways to approach this.",
    "Let's explore this together.",
    "I'm here to help you think through this.",
    "I'd love to hear more about it.",
];

/// Provider that answers from canned phrases without any network access.
///
/// Replies rotate through a fixed set of openers and closers, so a sequence of
/// calls is reproducible. Requests asking for a JSON object get `{}`. An
/// optional delay simulates provider latency.
#[derive(Debug)]
pub struct MockGenerator {
    metadata: AdapterMetadata,
    cursor: AtomicUsize,
    delay: Option<Duration>,
}

impl MockGenerator {
    /// Creates a mock provider with no simulated latency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: AdapterMetadata::new("mock", "mock-model"),
            cursor: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Adds a fixed delay before every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationCapability for MockGenerator {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn generate(
        &self,
        messages: &[PromptMessage],
        system_prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationResult<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        // Structured requests get a valid, empty answer.
        if system_prompt.contains("JSON object") {
            return Ok("{}".to_owned());
        }

        let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
        let opener = OPENERS[turn % OPENERS.len()];
        let closer = CLOSERS[turn % CLOSERS.len()];
        let topic = messages
            .iter()
            .rev()
            .find(|message| message.role() == MessageRole::User)
            .map(|message| {
                message
                    .content()
                    .split_whitespace()
                    .take(6)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|topic| !topic.is_empty());

        let mut reply = match topic {
            Some(topic) => format!("{opener} About \"{topic}\": {closer}"),
            None => format!("{opener} {closer}"),
        };

        // Roughly two characters per budgeted token keeps replies short.
        if let Some(budget) = options.max_output_tokens() {
            let limit = usize::try_from(budget).unwrap_or(usize::MAX).saturating_mul(2);
            if reply.chars().count() > limit {
                reply = reply.chars().take(limit).collect::<String>() + "...";
            }
        }

        Ok(reply)
    }
}
