//! Generative text and image collaborators.
//!
//! The entry pipeline only sees the [`TextGenerator`] and [`ImageGenerator`]
//! ports. [`OpenAiClient`] talks to an OpenAI-compatible HTTP API and
//! [`PlaceholderGenerator`] returns deterministic output for test mode.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use daybook_shared::constants::DEFAULT_AUTHOR_STYLE;
use daybook_store::UserProfile;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generative API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generative API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Generative API returned an unreadable payload: {0}")]
    Decode(String),

    #[error("Generative API response had no {0}")]
    MissingOutput(&'static str),
}

/// Title and illustration prompt derived from an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescription {
    pub title: String,
    pub image_prompt: String,
}

/// Entry content rewritten in the manner of a named author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylizedContent {
    pub content: String,
    pub author_style: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Derive a short title and an image prompt, biased by profile hints.
    async fn describe(
        &self,
        content: &str,
        profile: &UserProfile,
    ) -> Result<EntryDescription, GenerationError>;

    async fn stylize(&self, content: &str) -> Result<StylizedContent, GenerationError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image and return a (possibly short-lived) URL to it.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

const DESCRIBE_INSTRUCTIONS: &str = "You turn diary entries into illustrations. \
Given a moment someone lived, reply with a JSON object with two fields: \
\"title\", a short evocative title of at most eight words, and \"imagePrompt\", \
an image generation prompt whose mood, style and aesthetics match the moment. \
Be creative and artistic, but stay true to the moment.";

const STYLIZE_INSTRUCTIONS: &str = "You rewrite diary entries in the voice of a \
well-known author whose style suits the entry. Reply with a JSON object with two \
fields: \"content\", the rewritten entry of similar length, and \"authorStyle\", \
a label such as \"In the style of Virginia Woolf\".";

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    image_model: String,
}

impl OpenAiClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(
        base_url: &str,
        api_key: &str,
        chat_model: &str,
        image_model: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            chat_model: chat_model.to_string(),
            image_model: image_model.to_string(),
        })
    }

    /// Run one chat completion in JSON mode and decode the reply into `T`.
    async fn chat_json<T: for<'de> Deserialize<'de>>(
        &self,
        instructions: &str,
        user_message: String,
    ) -> Result<T, GenerationError> {
        let body = json!({
            "model": self.chat_model,
            "messages": [
                { "role": "system", "content": instructions },
                { "role": "user", "content": user_message },
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.8,
        });

        let response: ChatResponse = self.post("chat/completions", &body).await?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GenerationError::MissingOutput("message content"))?;

        serde_json::from_str(&text).map_err(|e| GenerationError::Decode(e.to_string()))
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GenerationError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionReply {
    #[serde(default)]
    title: String,
    #[serde(default)]
    image_prompt: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StylizedReply {
    #[serde(default)]
    content: String,
    #[serde(default)]
    author_style: String,
}

#[derive(Deserialize)]
struct ImagesResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn describe(
        &self,
        content: &str,
        profile: &UserProfile,
    ) -> Result<EntryDescription, GenerationError> {
        let reply: DescriptionReply = self
            .chat_json(DESCRIBE_INSTRUCTIONS, describe_message(content, profile))
            .await?;

        let title = reply.title.trim();
        let image_prompt = reply.image_prompt.trim();
        if title.is_empty() {
            return Err(GenerationError::MissingOutput("title"));
        }
        if image_prompt.is_empty() {
            return Err(GenerationError::MissingOutput("image prompt"));
        }

        Ok(EntryDescription {
            title: title.to_string(),
            image_prompt: image_prompt.to_string(),
        })
    }

    async fn stylize(&self, content: &str) -> Result<StylizedContent, GenerationError> {
        let reply: StylizedReply = self
            .chat_json(STYLIZE_INSTRUCTIONS, format!("Here's my entry: \"{content}\""))
            .await?;

        if reply.content.trim().is_empty() {
            return Err(GenerationError::MissingOutput("stylized content"));
        }
        let author_style = match reply.author_style.trim() {
            "" => DEFAULT_AUTHOR_STYLE.to_string(),
            style => style.to_string(),
        };

        Ok(StylizedContent {
            content: reply.content.trim().to_string(),
            author_style,
        })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
        });

        let response: ImagesResponse = self.post("images/generations", &body).await?;
        response
            .data
            .into_iter()
            .next()
            .and_then(|datum| datum.url)
            .filter(|url| !url.is_empty())
            .ok_or(GenerationError::MissingOutput("image url"))
    }
}

/// User message for the describe step. Profile hints are only mentioned when
/// the user filled them in.
fn describe_message(content: &str, profile: &UserProfile) -> String {
    let hints: Vec<String> = [
        ("gender", profile.gender.trim()),
        ("age range", profile.age_range.trim()),
        ("ethnicity", profile.ethnicity.trim()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(label, value)| format!("{label}: {value}"))
    .collect();

    if hints.is_empty() {
        format!("Here's my moment: \"{content}\"")
    } else {
        format!(
            "Here's my moment: \"{content}\"\nIf people appear in the image, the diarist is ({}).",
            hints.join(", ")
        )
    }
}

// ---------------------------------------------------------------------------
// Placeholder
// ---------------------------------------------------------------------------

const PLACEHOLDER_PROMPT: &str = "A soft watercolor scrapbook illustration of an everyday moment";
const PLACEHOLDER_IMAGE_URL: &str = "https://placehold.co/1024x1024/png?text=Daybook";
const PLACEHOLDER_TITLE_WORDS: usize = 5;

/// Deterministic stand-in used when test mode is on or no API key exists.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderGenerator;

#[async_trait]
impl TextGenerator for PlaceholderGenerator {
    async fn describe(
        &self,
        content: &str,
        _profile: &UserProfile,
    ) -> Result<EntryDescription, GenerationError> {
        let words: Vec<&str> = content.split_whitespace().collect();
        let mut title = words
            .iter()
            .take(PLACEHOLDER_TITLE_WORDS)
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if words.len() > PLACEHOLDER_TITLE_WORDS {
            title.push_str("...");
        }
        if title.is_empty() {
            return Err(GenerationError::MissingOutput("title"));
        }

        Ok(EntryDescription {
            title,
            image_prompt: PLACEHOLDER_PROMPT.to_string(),
        })
    }

    async fn stylize(&self, content: &str) -> Result<StylizedContent, GenerationError> {
        Ok(StylizedContent {
            content: content.to_string(),
            author_style: DEFAULT_AUTHOR_STYLE.to_string(),
        })
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Ok(PLACEHOLDER_IMAGE_URL.to_string())
    }
}
