//! Bounded FIFO window over the most recent conversation messages.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use tokio::sync::RwLock;

use crate::message::Message;

const DEFAULT_CAPACITY: usize = 20;

/// Configuration for the recency buffer.
#[derive(Debug, Clone, Copy)]
pub struct RecencyConfig {
    capacity: NonZeroUsize,
}

impl RecencyConfig {
    /// Creates a configuration with the provided capacity.
    #[must_use]
    pub const fn new(capacity: NonZeroUsize) -> Self {
        Self { capacity }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(self) -> NonZeroUsize {
        self.capacity
    }
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).expect("non-zero"))
    }
}

/// Window retaining the last `capacity` messages in insertion order.
///
/// Eviction is strict FIFO: reading the buffer never changes which entry is
/// evicted next.
#[derive(Debug)]
pub struct RecencyBuffer {
    config: RecencyConfig,
    entries: RwLock<VecDeque<Message>>,
}

impl RecencyBuffer {
    /// Creates an empty buffer using the supplied configuration.
    #[must_use]
    pub fn new(config: RecencyConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(VecDeque::with_capacity(config.capacity().get() + 1)),
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity().get()
    }

    /// Appends a message, evicting the oldest entries beyond capacity.
    pub async fn push(&self, message: Message) {
        let mut guard = self.entries.write().await;
        guard.push_back(message);
        while guard.len() > self.capacity() {
            guard.pop_front();
        }
    }

    /// Returns the buffered messages, oldest first.
    #[must_use]
    pub async fn snapshot(&self) -> Vec<Message> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Returns the number of buffered messages.
    #[must_use]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when nothing has been pushed since the last clear.
    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Empties the buffer.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Replaces the contents with the last `capacity` of `messages`.
    pub async fn restore(&self, messages: Vec<Message>) {
        let skip = messages.len().saturating_sub(self.capacity());
        let mut guard = self.entries.write().await;
        guard.clear();
        guard.extend(messages.into_iter().skip(skip));
    }
}
