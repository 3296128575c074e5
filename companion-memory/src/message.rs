//! The immutable conversation message stored by both memory tiers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

use companion_primitives::MessageId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{MemoryError, MemoryResult};

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Message typed by the user.
    User,
    /// Reply produced by the companion.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// A single conversation message.
///
/// Messages are immutable once built. Identity is the [`MessageId`]: two values
/// with the same id compare equal. Ordering is chronological, with the id as a
/// tie-breaker so that sorting is total and deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
    timestamp: SystemTime,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl Message {
    /// Creates a builder for a new message.
    #[must_use]
    pub fn builder(role: Role, content: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            id: MessageId::random(),
            role,
            content: content.into(),
            timestamp: SystemTime::now(),
            metadata: Map::new(),
        }
    }

    /// Shorthand for a user message stamped with the current time.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::builder(Role::User, content).build()
    }

    /// Shorthand for an assistant message stamped with the current time.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::builder(Role::Assistant, content).build()
    }

    /// Returns the unique identifier for this message.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the author role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Returns the scalar metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Message {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Builder type used to assemble [`Message`] instances safely.
#[derive(Debug)]
pub struct MessageBuilder {
    id: MessageId,
    role: Role,
    content: String,
    timestamp: SystemTime,
    metadata: Map<String, Value>,
}

impl MessageBuilder {
    /// Overrides the message identifier.
    #[must_use]
    pub fn id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    /// Sets the timestamp for the message.
    #[must_use]
    pub fn timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds a metadata entry after checking that the value is a scalar.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] when the key is empty or the value
    /// is an array or object.
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> MemoryResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(MemoryError::InvalidRecord("metadata keys must not be empty"));
        }
        if value.is_array() || value.is_object() {
            return Err(MemoryError::InvalidRecord("metadata values must be scalars"));
        }
        self.metadata.insert(key, value);
        Ok(self)
    }

    /// Finalises the builder and produces the message.
    #[must_use]
    pub fn build(self) -> Message {
        Message {
            id: self.id,
            role: self.role,
            content: self.content,
            timestamp: self.timestamp,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn builder_rejects_structured_metadata() {
        let err = Message::builder(Role::User, "hi")
            .metadata("tags", Value::Array(vec![]))
            .expect_err("arrays are not scalars");
        assert!(matches!(err, MemoryError::InvalidRecord(_)));

        let err = Message::builder(Role::User, "hi")
            .metadata(" ", Value::from(1))
            .expect_err("blank key should fail");
        assert!(matches!(err, MemoryError::InvalidRecord(_)));
    }

    #[test]
    fn builder_constructs_message() {
        let message = Message::builder(Role::Assistant, "hello")
            .metadata("mood", Value::from("cheerful"))
            .unwrap()
            .build();

        assert_eq!(message.role(), Role::Assistant);
        assert_eq!(message.content(), "hello");
        assert_eq!(message.metadata().get("mood").unwrap(), "cheerful");
    }

    #[test]
    fn identity_is_the_id() {
        let original = Message::user("same");
        let copy = original.clone();
        assert_eq!(original, copy);
        assert_ne!(original, Message::user("same"));
    }

    #[test]
    fn orders_chronologically() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let older = Message::builder(Role::User, "a").timestamp(start).build();
        let newer = Message::builder(Role::User, "b")
            .timestamp(start + Duration::from_secs(1))
            .build();

        let mut messages = vec![newer.clone(), older.clone()];
        messages.sort();
        assert_eq!(messages, vec![older, newer]);
    }
}
