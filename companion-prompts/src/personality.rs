//! Companion character configuration.

use serde::{Deserialize, Serialize};

/// Personality used when none is configured.
pub const DEFAULT_PERSONALITY: &str = "You are a warm, curious and supportive AI companion. \
You remember what the user shares, follow up on things that matter to them, \
and speak naturally like a close friend.";

/// Describes the companion's character. Empty fields are left out of the
/// system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityConfig {
    /// Core personality description.
    pub personality: String,
    /// Background story of the character.
    pub backstory: String,
    /// Character traits, free text.
    pub traits: String,
    /// Character likes and dislikes, free text.
    pub preferences: String,
    /// Example reply that the model must imitate.
    pub output_example: String,
    /// Mandatory response notes such as length or tone rules.
    pub notes: String,
    /// World background the character lives in.
    pub worldview_background: String,
    /// Current setting within that world.
    pub worldview_setting: String,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self::with_personality(DEFAULT_PERSONALITY)
    }
}

impl PersonalityConfig {
    /// Creates a config with only the core personality set.
    #[must_use]
    pub fn with_personality(personality: impl Into<String>) -> Self {
        Self {
            personality: personality.into(),
            backstory: String::new(),
            traits: String::new(),
            preferences: String::new(),
            output_example: String::new(),
            notes: String::new(),
            worldview_background: String::new(),
            worldview_setting: String::new(),
        }
    }

    /// Returns `true` when explicit output rules replace the default
    /// response guidelines.
    #[must_use]
    pub fn has_output_rules(&self) -> bool {
        !self.output_example.trim().is_empty() || !self.notes.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config: PersonalityConfig =
            serde_json::from_str(r#"{"backstory": "Grew up by the sea."}"#).unwrap();
        assert_eq!(config.personality, DEFAULT_PERSONALITY);
        assert_eq!(config.backstory, "Grew up by the sea.");
        assert!(!config.has_output_rules());
    }

    #[test]
    fn notes_count_as_output_rules() {
        let config = PersonalityConfig {
            notes: "Answer in one sentence.".to_owned(),
            ..PersonalityConfig::default()
        };
        assert!(config.has_output_rules());
    }
}
