//! Core message types for the chat session

use serde::{Deserialize, Serialize};

/// Text of the fixed greeting entry at the head of every history.
pub const WELCOME_TEXT: &str = "How may I assist you?";

/// Who authored a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The greeting entry pinned at index 0 of history. Never sent
    /// outbound and never persisted.
    Welcome,
    User,
    Assistant,
}

/// One segment of a multimodal user turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    /// An inline image payload (data URL) or a remote image URL
    ImageRef { url: String },
}

/// Message content: plain text, or ordered multimodal parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<Part>),
}

impl Content {
    /// Get the combined text, ignoring image parts
    pub fn text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    Part::ImageRef { .. } => None,
                })
                .collect(),
        }
    }

    /// Append a streamed fragment to the trailing text segment.
    ///
    /// `Parts` content grows its last `Text` part, or gains one if the
    /// sequence ends with an image reference.
    pub fn push_fragment(&mut self, fragment: &str) {
        match self {
            Content::Text(text) => text.push_str(fragment),
            Content::Parts(parts) => match parts.last_mut() {
                Some(Part::Text { text }) => text.push_str(fragment),
                _ => parts.push(Part::Text {
                    text: fragment.to_string(),
                }),
            },
        }
    }

    /// Whether no text or parts have been written yet
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.is_empty(),
            Content::Parts(parts) => parts.is_empty(),
        }
    }
}

/// A single entry in the session history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    /// The greeting message seeded at index 0 of a fresh history
    pub fn welcome() -> Self {
        Self {
            role: Role::Welcome,
            content: Content::Text(WELCOME_TEXT.to_string()),
        }
    }

    /// Create a plain-text user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    /// Create a multimodal user message: text plus an inline image
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Parts(vec![
                Part::Text { text: text.into() },
                Part::ImageRef {
                    url: image_url.into(),
                },
            ]),
        }
    }

    /// Create the empty assistant placeholder appended at turn start
    pub fn assistant_empty() -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(String::new()),
        }
    }

    /// Create a finalized assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
        }
    }

    /// Get the combined text content
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// OpenAI credential triple. All three fields must be present for the
/// session to be chattable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub organization: String,
    pub project: String,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        organization: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            organization: organization.into(),
            project: project.into(),
        }
    }

    /// Whether every credential field is non-empty
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.organization.is_empty() && !self.project.is_empty()
    }
}

/// Request for a single image generation
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: crate::models::ImageModel,
    pub prompt: String,
    pub size: crate::models::ImageSize,
}

/// Response from a single image generation
#[derive(Debug, Clone, Deserialize)]
pub struct ImageResponse {
    pub url: String,
    #[serde(default)]
    pub revised_prompt: String,
}
