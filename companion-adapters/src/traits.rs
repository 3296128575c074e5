//! Shared generation capability traits and data structures.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

/// Result alias used by generation providers.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Error type shared by generation providers.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The provider failed to produce a response (network, auth, server error).
    #[error("generation provider error: {reason}")]
    Provider {
        /// Additional context about the error.
        reason: String,
    },

    /// The provider did not answer within the caller's deadline.
    #[error("generation timed out after {after:?}")]
    Timeout {
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The provider rejected the request due to rate limiting.
    #[error("generation rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The supplied request was invalid for the target provider.
    #[error("invalid generation request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be processed.
        reason: String,
    },
}

impl GenerationError {
    /// Convenience constructor for provider failures.
    #[must_use]
    pub fn provider(reason: impl Into<String>) -> Self {
        Self::Provider {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Returns `true` for the transient kinds where no response could be
    /// produced right now: provider errors, timeouts and rate limits.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        !matches!(self, Self::InvalidRequest { .. })
    }
}

/// Minimal metadata describing a provider instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterMetadata {
    provider: &'static str,
    model: String,
}

impl AdapterMetadata {
    /// Creates metadata for the supplied provider and model identifier.
    #[must_use]
    pub fn new(provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Returns the provider identifier (e.g., "mock").
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Returns the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Roles supported in chat-style prompts.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System messages steer the assistant behaviour.
    System,
    /// User-authored content.
    User,
    /// Assistant (model) responses.
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// Represents an instruction or message in a chat-style prompt.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PromptMessage {
    role: MessageRole,
    content: String,
}

impl PromptMessage {
    /// Creates a new prompt message.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Returns the message role.
    #[must_use]
    pub const fn role(&self) -> MessageRole {
        self.role
    }

    /// Returns the message content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Deadline applied when a caller configures none.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling and deadline options passed alongside a generation request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationOptions {
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout: Option<Duration>,
}

impl GenerationOptions {
    /// Creates options with every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum output token budget.
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Bounds how long callers wait for the provider.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets `timeout` only when no deadline is configured yet.
    #[must_use]
    pub fn or_timeout(mut self, timeout: Duration) -> Self {
        self.timeout.get_or_insert(timeout);
        self
    }

    /// Returns the configured maximum output tokens.
    #[must_use]
    pub const fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }

    /// Returns the configured sampling temperature.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Returns the configured deadline.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Trait implemented by every text generation provider.
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    /// Returns basic metadata describing the provider instance.
    fn metadata(&self) -> &AdapterMetadata;

    /// Produces a completion for the ordered message list under the system prompt.
    async fn generate(
        &self,
        messages: &[PromptMessage],
        system_prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationResult<String>;
}

/// Invokes `capability`, enforcing the deadline carried by `options`.
///
/// # Errors
///
/// Returns [`GenerationError::InvalidRequest`] for an empty message list,
/// [`GenerationError::Timeout`] when the deadline elapses, and otherwise
/// propagates the provider's error.
pub async fn generate_with_deadline(
    capability: &dyn GenerationCapability,
    messages: &[PromptMessage],
    system_prompt: &str,
    options: &GenerationOptions,
) -> GenerationResult<String> {
    if messages.is_empty() {
        return Err(GenerationError::invalid_request(
            "generation request requires at least one message",
        ));
    }

    let call = capability.generate(messages, system_prompt, options);
    let Some(limit) = options.timeout() else {
        return call.await;
    };

    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            debug!(
                provider = capability.metadata().provider(),
                ?limit,
                "generation deadline elapsed"
            );
            Err(GenerationError::Timeout { after: limit })
        }
    }
}
