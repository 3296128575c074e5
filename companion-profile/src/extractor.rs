//! Model-driven extraction of profile facts from recent conversation.

use std::collections::BTreeMap;
use std::sync::Arc;

use companion_adapters::{
    DEFAULT_GENERATION_TIMEOUT, GenerationCapability, GenerationOptions, MessageRole,
    PromptMessage, generate_with_deadline,
};
use companion_memory::{Message, Role};
use serde_json::{Map, Value};
use tracing::debug;

use crate::profile::{ProfileExtraction, UserProfile};
use crate::{ProfileError, ProfileResult};

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You maintain a structured profile of the user from their conversations.

Reply with a single JSON object and nothing else: no prose, no markdown fences.

Use exactly these keys, leaving a key empty when the conversation says nothing about it:
{
  "name": "the user's name, or null",
  "traits": ["observable personality traits"],
  "preferences": {"category": "specific like or dislike"},
  "goals": ["stated goals or aspirations"],
  "commitments": ["things the user said they will do"],
  "significant_dates": {"event": "YYYY-MM-DD when known, otherwise the date as stated"},
  "facts": {"subject": "other notable information"}
}

Only record what the user stated explicitly. Do not guess.
Do not repeat facts that the known profile already contains."#;

const PREVIEW_CHARS: usize = 200;

/// Runs profile extraction passes against a [`GenerationCapability`].
#[derive(Clone)]
pub struct ProfileExtractor {
    generator: Arc<dyn GenerationCapability>,
    options: GenerationOptions,
}

impl ProfileExtractor {
    /// Creates an extractor with temperature `0.0` and the default deadline.
    #[must_use]
    pub fn new(generator: Arc<dyn GenerationCapability>) -> Self {
        Self {
            generator,
            options: GenerationOptions::new()
                .with_temperature(0.0)
                .with_timeout(DEFAULT_GENERATION_TIMEOUT),
        }
    }

    /// Overrides the generation options. Options without a deadline get
    /// [`DEFAULT_GENERATION_TIMEOUT`].
    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options.or_timeout(DEFAULT_GENERATION_TIMEOUT);
        self
    }

    /// Asks the model for profile updates based on `window` and the known profile.
    ///
    /// An empty window yields an empty extraction without calling the model.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Generation`] when the capability fails and
    /// [`ProfileError::ExtractionParseError`] when the reply is not a profile
    /// object.
    pub async fn extract(
        &self,
        window: &[Message],
        profile: &UserProfile,
    ) -> ProfileResult<ProfileExtraction> {
        if window.is_empty() {
            return Ok(ProfileExtraction::default());
        }

        let request = [PromptMessage::new(
            MessageRole::User,
            extraction_request(window, profile),
        )];
        let reply = generate_with_deadline(
            self.generator.as_ref(),
            &request,
            EXTRACTION_SYSTEM_PROMPT,
            &self.options,
        )
        .await?;

        debug!(
            provider = self.generator.metadata().provider(),
            reply_len = reply.len(),
            "received profile extraction reply"
        );
        parse_extraction(&reply)
    }
}

impl std::fmt::Debug for ProfileExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileExtractor")
            .field("provider", &self.generator.metadata().provider())
            .field("options", &self.options)
            .finish()
    }
}

fn extraction_request(window: &[Message], profile: &UserProfile) -> String {
    let known = if profile.is_empty() {
        "(nothing yet)".to_owned()
    } else {
        profile.to_prompt_text()
    };
    let transcript = window
        .iter()
        .map(|message| {
            let speaker = match message.role() {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{speaker}: {}", message.content())
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Known profile:\n{known}\n\nConversation:\n{transcript}\n\nReturn only the JSON object."
    )
}

/// Parses a model reply into a [`ProfileExtraction`].
///
/// Markdown code fences are tolerated, as is prose around a single JSON
/// object. Fields with the wrong type are ignored individually.
///
/// # Errors
///
/// Returns [`ProfileError::ExtractionParseError`] for empty replies, replies
/// without a JSON object, and JSON that is not an object.
pub fn parse_extraction(reply: &str) -> ProfileResult<ProfileExtraction> {
    let body = strip_code_fence(reply.trim());
    if body.is_empty() {
        return Err(ProfileError::parse("empty reply"));
    }

    let value = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(_) => outermost_object(body)
            .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
            .ok_or_else(|| {
                ProfileError::parse(format!("no JSON object in reply: {}", preview(body)))
            })?,
    };

    let Value::Object(fields) = value else {
        return Err(ProfileError::parse("reply is not a JSON object"));
    };
    Ok(from_fields(fields))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_owned();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

fn from_fields(mut fields: Map<String, Value>) -> ProfileExtraction {
    let mut take = |primary: &str, alias: &str| {
        fields
            .remove(primary)
            .or_else(|| fields.remove(alias))
            .unwrap_or(Value::Null)
    };

    let name = match take("name", "user_name") {
        Value::String(name) => Some(name),
        _ => None,
    };
    let traits = string_list(take("traits", "personality_traits"));
    let goals = string_list(take("goals", "aspirations"));
    let commitments = string_list(take("commitments", "promises"));
    let preferences = scalar_map(take("preferences", "likes"));
    let significant_dates = date_map(take("significant_dates", "important_dates"));
    let facts = match take("facts", "other_facts") {
        // A bare list of statements is stored with each statement as its own key.
        Value::Array(items) => string_list(Value::Array(items))
            .into_iter()
            .map(|fact| (fact, Value::Bool(true)))
            .collect(),
        other => scalar_map(other),
    };

    ProfileExtraction {
        name,
        traits,
        facts,
        goals,
        commitments,
        preferences,
        significant_dates,
    }
}

fn string_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn scalar_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .filter(|(_, value)| !matches!(value, Value::Array(_) | Value::Object(_)))
            .collect(),
        _ => Map::new(),
    }
}

fn date_map(value: Value) -> BTreeMap<String, String> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(event, date)| match date {
                Value::String(date) => Some((event, date)),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::time::Duration;

    use companion_adapters::{AdapterMetadata, GenerationError, GenerationResult, MockGenerator};
    use tokio::sync::Mutex;

    use super::*;

    struct CannedGenerator {
        metadata: AdapterMetadata,
        reply: GenerationResult<String>,
        seen: Mutex<Vec<String>>,
    }

    impl CannedGenerator {
        fn new(reply: GenerationResult<String>) -> Self {
            Self {
                metadata: AdapterMetadata::new("canned", "test"),
                reply,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationCapability for CannedGenerator {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }

        async fn generate(
            &self,
            messages: &[PromptMessage],
            _system_prompt: &str,
            _options: &GenerationOptions,
        ) -> GenerationResult<String> {
            self.seen.lock().await.push(messages[0].content().to_owned());
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(_) => Err(GenerationError::provider("offline")),
            }
        }
    }

    #[test]
    fn parses_fenced_json_with_aliases() {
        let reply = "```json\n{\"name\": \"Alex\", \"personality_traits\": [\"curious\", 3], \
                     \"important_dates\": {\"birthday\": \"1995-03-15\"}, \
                     \"facts\": [\"has a cat\"], \"goals\": \"not a list\"}\n```";
        let extraction = parse_extraction(reply).unwrap();

        assert_eq!(extraction.name.as_deref(), Some("Alex"));
        assert_eq!(extraction.traits, ["curious"]);
        assert_eq!(extraction.significant_dates["birthday"], "1995-03-15");
        assert_eq!(extraction.facts["has a cat"], Value::Bool(true));
        assert!(extraction.goals.is_empty());
    }

    #[test]
    fn finds_object_inside_prose() {
        let reply = "Sure! Here is the profile: {\"preferences\": {\"food\": \"ramen\"}} Hope it helps.";
        let extraction = parse_extraction(reply).unwrap();
        assert_eq!(extraction.preferences["food"], "ramen");
    }

    #[test]
    fn rejects_unusable_replies() {
        for reply in ["", "   ", "I could not find anything.", "[1, 2, 3]", "{broken"] {
            let err = parse_extraction(reply).expect_err(reply);
            assert!(matches!(err, ProfileError::ExtractionParseError { .. }), "{reply}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_hits_default_deadline() {
        let generator = MockGenerator::new().with_delay(Duration::from_secs(3_600));
        let extractor =
            ProfileExtractor::new(Arc::new(generator)).with_options(GenerationOptions::new());
        let window = [Message::user("I'm Ada")];

        let err = extractor
            .extract(&window, &UserProfile::default())
            .await
            .expect_err("deadline");
        assert!(matches!(
            err,
            ProfileError::Generation(GenerationError::Timeout { after })
                if after == DEFAULT_GENERATION_TIMEOUT
        ));
    }

    #[tokio::test]
    async fn sends_window_and_known_profile() {
        let generator = Arc::new(CannedGenerator::new(Ok(
            "{\"goals\": [\"run a marathon\"]}".to_owned()
        )));
        let extractor = ProfileExtractor::new(generator.clone());
        let mut profile = UserProfile::default();
        profile.name = Some("Jo".to_owned());

        let window = [
            Message::user("I want to run a marathon"),
            Message::assistant("That's a great goal!"),
        ];
        let extraction = extractor.extract(&window, &profile).await.unwrap();
        assert_eq!(extraction.goals, ["run a marathon"]);

        let seen = generator.seen.lock().await;
        assert!(seen[0].contains("User's name: Jo"));
        assert!(seen[0].contains("User: I want to run a marathon"));
        assert!(seen[0].contains("Assistant: That's a great goal!"));
    }

    #[tokio::test]
    async fn generation_failure_is_reported() {
        let generator = Arc::new(CannedGenerator::new(Err(GenerationError::provider("x"))));
        let extractor = ProfileExtractor::new(generator);
        let err = extractor
            .extract(&[Message::user("hi")], &UserProfile::default())
            .await
            .expect_err("provider offline");
        assert!(matches!(err, ProfileError::Generation(_)));
    }

    #[tokio::test]
    async fn empty_window_skips_the_model() {
        let generator = Arc::new(CannedGenerator::new(Ok("{}".to_owned())));
        let extractor = ProfileExtractor::new(generator.clone());
        let extraction = extractor.extract(&[], &UserProfile::default()).await.unwrap();
        assert!(extraction.is_empty());
        assert!(generator.seen.lock().await.is_empty());
    }
}
