//! Builds the system prompt and message list sent to the generation capability.

use std::collections::HashSet;

use companion_adapters::{MessageRole, PromptMessage};
use companion_memory::{Message, Role};
use tracing::{debug, warn};

use crate::context::ConversationContext;
use crate::personality::PersonalityConfig;

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 250;

/// Final payload for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    /// System prompt text.
    pub system_prompt: String,
    /// Relevant history followed by the recency window, both oldest first.
    pub messages: Vec<PromptMessage>,
}

/// Turns a [`ConversationContext`] into an [`AssembledPrompt`].
///
/// System prompt sections, in order: output example and notes, personality,
/// user profile, relevant memory hint, response guidelines.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    max_output_tokens: u32,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_TOKENS)
    }
}

impl ContextAssembler {
    /// Creates an assembler that sizes reply guidelines for `max_output_tokens`.
    #[must_use]
    pub const fn new(max_output_tokens: u32) -> Self {
        Self { max_output_tokens }
    }

    /// Builds the prompt for one turn.
    ///
    /// Relevant messages already present in the recency window are dropped.
    #[must_use]
    pub fn build(&self, context: &ConversationContext) -> AssembledPrompt {
        let recent_ids: HashSet<_> = context.recent.iter().map(Message::id).collect();
        let mut relevant: Vec<&Message> = context
            .relevant
            .iter()
            .filter(|message| !recent_ids.contains(&message.id()))
            .collect();
        if relevant.len() != context.relevant.len() {
            warn!(
                dropped = context.relevant.len() - relevant.len(),
                "relevant history overlapped the recency window"
            );
        }
        relevant.sort();

        let messages: Vec<PromptMessage> = relevant
            .iter()
            .copied()
            .chain(context.recent.iter())
            .map(to_prompt_message)
            .collect();
        let system_prompt = self.system_prompt(context, relevant.len());

        debug!(
            relevant = relevant.len(),
            recent = context.recent.len(),
            system_prompt_len = system_prompt.len(),
            "assembled prompt"
        );
        AssembledPrompt {
            system_prompt,
            messages,
        }
    }

    fn system_prompt(&self, context: &ConversationContext, relevant: usize) -> String {
        let personality = &context.personality;
        let mut parts = output_rules(personality);
        parts.extend(character_sections(personality));

        let profile = context.profile.to_prompt_text();
        if !profile.is_empty() {
            parts.push(format!("What you know about the user:\n{profile}"));
        }

        if relevant > 0 {
            parts.push(format!(
                "Relevant memory: the first {relevant} message(s) of the conversation below are \
                 earlier exchanges recalled because they relate to the current topic. \
                 The rest is the recent conversation."
            ));
        }

        if !personality.has_output_rules() {
            parts.push(self.guidelines());
        }

        parts.join("\n\n")
    }

    fn guidelines(&self) -> String {
        let (sentences, words) = match self.max_output_tokens {
            0..=100 => ("1-2", "30-50"),
            101..=200 => ("2-3", "50-80"),
            _ => ("2-4", "80-120"),
        };
        format!(
            "Guidelines:\n\
             - Use what you know about the user naturally in conversation\n\
             - Refer back to earlier conversations when it helps\n\
             - Stay consistent with your personality\n\
             - Be proactive and caring\n\
             - Keep replies concise ({sentences} sentences, {words} words) and finish every \
             thought instead of trailing off"
        )
    }
}

fn output_rules(personality: &PersonalityConfig) -> Vec<String> {
    let example = personality.output_example.trim();
    let notes = personality.notes.trim();
    let mut parts = Vec::new();

    if !example.is_empty() {
        parts.push(format!(
            "CRITICAL - Output example and style requirements (follow exactly):\n{example}"
        ));
    }
    if !notes.is_empty() {
        let heading = if example.is_empty() {
            "CRITICAL - Response guidelines (must follow)"
        } else {
            "CRITICAL - Additional notes (must follow)"
        };
        parts.push(format!("{heading}:\n{notes}"));
    }
    parts
}

fn character_sections(personality: &PersonalityConfig) -> Vec<String> {
    let core = if personality.personality.trim().is_empty() {
        crate::personality::DEFAULT_PERSONALITY
    } else {
        personality.personality.trim()
    };
    let mut parts = vec![format!("Personality: {core}")];

    let optional = [
        ("Backstory", &personality.backstory),
        ("Traits", &personality.traits),
        ("Preferences", &personality.preferences),
        ("Worldview background", &personality.worldview_background),
        ("Worldview setting", &personality.worldview_setting),
    ];
    parts.extend(
        optional
            .into_iter()
            .map(|(label, value)| (label, value.trim()))
            .filter(|(_, value)| !value.is_empty())
            .map(|(label, value)| format!("{label}: {value}")),
    );
    parts
}

fn to_prompt_message(message: &Message) -> PromptMessage {
    let role = match message.role() {
        Role::User => MessageRole::User,
        Role::Assistant => MessageRole::Assistant,
    };
    PromptMessage::new(role, message.content())
}
