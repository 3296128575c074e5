//! Structured facts about the user and the rules for merging new findings.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persistent profile of a single user.
///
/// `version` increases on every persisted mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    /// Preferred name, if the user shared one.
    pub name: Option<String>,
    /// Observed personality traits.
    pub traits: BTreeSet<String>,
    /// Notable facts keyed by subject.
    pub facts: Map<String, Value>,
    /// Stated goals, oldest first.
    pub goals: Vec<String>,
    /// Things the user committed to doing, oldest first.
    pub commitments: Vec<String>,
    /// Likes and dislikes keyed by category.
    pub preferences: Map<String, Value>,
    /// Dates that matter to the user, keyed by event.
    pub significant_dates: BTreeMap<String, NaiveDate>,
    /// Completed conversation turns.
    pub conversation_count: u64,
    /// Persisted mutation counter.
    pub version: u64,
    /// Time of the last persisted mutation.
    pub last_updated: DateTime<Utc>,
    /// Time the profile was first created.
    pub created_at: DateTime<Utc>,
}

impl Default for UserProfile {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            name: None,
            traits: BTreeSet::new(),
            facts: Map::new(),
            goals: Vec::new(),
            commitments: Vec::new(),
            preferences: Map::new(),
            significant_dates: BTreeMap::new(),
            conversation_count: 0,
            version: 0,
            last_updated: now,
            created_at: now,
        }
    }
}

impl UserProfile {
    /// Returns `true` when nothing has been learned about the user yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.traits.is_empty()
            && self.facts.is_empty()
            && self.goals.is_empty()
            && self.commitments.is_empty()
            && self.preferences.is_empty()
            && self.significant_dates.is_empty()
    }

    /// Merges an extraction into the profile.
    ///
    /// Sets and lists only grow, mappings gain or update keys, and `name` and
    /// dates are overwritten only by non-empty values. Returns `true` when
    /// anything changed.
    pub fn merge(&mut self, extraction: ProfileExtraction) -> bool {
        let mut changed = false;

        if let Some(name) = non_empty(extraction.name.as_deref()) {
            if self.name.as_deref() != Some(name) {
                self.name = Some(name.to_owned());
                changed = true;
            }
        }

        for trait_name in extraction.traits {
            if let Some(trait_name) = non_empty(Some(&trait_name)) {
                changed |= self.traits.insert(trait_name.to_owned());
            }
        }

        changed |= merge_scalars(&mut self.facts, extraction.facts);
        changed |= merge_scalars(&mut self.preferences, extraction.preferences);
        changed |= append_unique(&mut self.goals, extraction.goals);
        changed |= append_unique(&mut self.commitments, extraction.commitments);

        for (event, raw) in extraction.significant_dates {
            let (Some(event), Some(raw)) = (non_empty(Some(&event)), non_empty(Some(&raw))) else {
                continue;
            };
            match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
                Ok(date) => {
                    if self.significant_dates.get(event) != Some(&date) {
                        self.significant_dates.insert(event.to_owned(), date);
                        changed = true;
                    }
                }
                // Free-form dates ("mid March") are still worth remembering.
                Err(_) => {
                    let value = Value::from(raw);
                    if self.facts.get(event) != Some(&value) {
                        self.facts.insert(event.to_owned(), value);
                        changed = true;
                    }
                }
            }
        }

        changed
    }

    /// Renders the profile for inclusion in a system prompt.
    ///
    /// Returns an empty string for an empty profile.
    #[must_use]
    pub fn to_prompt_text(&self) -> String {
        let mut parts = Vec::new();

        if let Some(name) = &self.name {
            parts.push(format!("User's name: {name}"));
        }
        if !self.traits.is_empty() {
            let traits: Vec<_> = self.traits.iter().map(String::as_str).collect();
            parts.push(format!("User's personality traits: {}", traits.join(", ")));
        }
        if !self.preferences.is_empty() {
            parts.push(bullets("User's preferences:", scalar_lines(&self.preferences)));
        }
        if !self.goals.is_empty() {
            parts.push(bullets("User's goals:", self.goals.clone()));
        }
        if !self.commitments.is_empty() {
            parts.push(bullets("User's commitments:", self.commitments.clone()));
        }
        if !self.significant_dates.is_empty() {
            let dates = self
                .significant_dates
                .iter()
                .map(|(event, date)| format!("{event}: {}", date.format(DATE_FORMAT)))
                .collect();
            parts.push(bullets("Important dates:", dates));
        }
        if !self.facts.is_empty() {
            parts.push(bullets("Other important facts:", scalar_lines(&self.facts)));
        }

        parts.join("\n\n")
    }

    /// One-line summary for logs and status displays.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return format!(
                "User profile is empty | Conversations: {}",
                self.conversation_count
            );
        }

        let mut summary = String::new();
        if let Some(name) = &self.name {
            let _ = write!(summary, "Name: {name} | ");
        }
        if !self.traits.is_empty() {
            let traits: Vec<_> = self.traits.iter().take(3).map(String::as_str).collect();
            let _ = write!(summary, "Traits: {} | ", traits.join(", "));
        }
        if !self.goals.is_empty() {
            let _ = write!(summary, "Goals: {} items | ", self.goals.len());
        }
        if !self.preferences.is_empty() {
            let _ = write!(summary, "Preferences: {} items | ", self.preferences.len());
        }
        let _ = write!(summary, "Conversations: {}", self.conversation_count);
        summary
    }
}

/// Profile fields recovered from one extraction pass.
///
/// Dates are kept as the raw strings the model produced; [`UserProfile::merge`]
/// decides how to store them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileExtraction {
    /// Name, if mentioned.
    pub name: Option<String>,
    /// Personality traits.
    pub traits: Vec<String>,
    /// Facts keyed by subject.
    pub facts: Map<String, Value>,
    /// Goals.
    pub goals: Vec<String>,
    /// Commitments.
    pub commitments: Vec<String>,
    /// Preferences keyed by category.
    pub preferences: Map<String, Value>,
    /// Event to raw date text.
    pub significant_dates: BTreeMap<String, String>,
}

impl ProfileExtraction {
    /// Returns `true` when the extraction carries no information.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.traits.is_empty()
            && self.facts.is_empty()
            && self.goals.is_empty()
            && self.commitments.is_empty()
            && self.preferences.is_empty()
            && self.significant_dates.is_empty()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn is_meaningful_scalar(value: &Value) -> bool {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn merge_scalars(target: &mut Map<String, Value>, incoming: Map<String, Value>) -> bool {
    let mut changed = false;
    for (key, value) in incoming {
        let key = key.trim();
        if key.is_empty() || !is_meaningful_scalar(&value) {
            continue;
        }
        if target.get(key) != Some(&value) {
            target.insert(key.to_owned(), value);
            changed = true;
        }
    }
    changed
}

fn append_unique(target: &mut Vec<String>, incoming: Vec<String>) -> bool {
    let mut changed = false;
    for item in incoming {
        let Some(item) = non_empty(Some(&item)) else {
            continue;
        };
        if !target.iter().any(|existing| existing == item) {
            target.push(item.to_owned());
            changed = true;
        }
    }
    changed
}

fn scalar_lines(map: &Map<String, Value>) -> Vec<String> {
    map.iter()
        .map(|(key, value)| match value {
            Value::Bool(true) => key.clone(),
            Value::String(text) => format!("{key}: {text}"),
            other => format!("{key}: {other}"),
        })
        .collect()
}

fn bullets(heading: &str, lines: Vec<String>) -> String {
    format!("{heading}\n  - {}", lines.join("\n  - "))
}
