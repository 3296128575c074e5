//! Session and message identifier types.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::Error;

const MAX_SESSION_ID_LEN: usize = 128;

/// Unique identifier for a single stored message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a random message identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::random()
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for MessageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(Error::from)?;
        Ok(Self::from_uuid(uuid))
    }
}

/// Identifier of a conversation session, one per user.
///
/// Session identifiers double as directory names for per-user persisted state,
/// so only ASCII alphanumerics, `-`, `_` and `.` are accepted and the value may
/// not start with a dot.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Validates and wraps the supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSessionId`] when the value is empty, too long,
    /// starts with a dot, or contains characters outside `[A-Za-z0-9._-]`.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("session id must not be empty")
        } else if id.len() > MAX_SESSION_ID_LEN {
            Some("session id exceeds 128 characters")
        } else if id.starts_with('.') {
            Some("session id must not start with '.'")
        } else if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            Some("session id may only contain ASCII alphanumerics, '-', '_' or '.'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidSessionId { id, reason }),
            None => Ok(Self(id)),
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_message_id() {
        let id = MessageId::random();
        let parsed = id.to_string().parse::<MessageId>().expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn accepts_plain_session_ids() {
        let id = SessionId::new("user_42.main-session").unwrap();
        assert_eq!(id.as_str(), "user_42.main-session");
    }

    #[test]
    fn rejects_path_like_session_ids() {
        for bad in ["", "../etc", ".hidden", "a/b", "with space"] {
            let err = SessionId::new(bad).expect_err("should reject");
            assert!(matches!(err, Error::InvalidSessionId { .. }), "{bad}");
        }
    }

    #[test]
    fn deserialization_validates() {
        let err = serde_json::from_str::<SessionId>("\"a/b\"");
        assert!(err.is_err());
        let ok: SessionId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
    }
}
