//! OpenAI Chat Completions and Images API client

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    models::{ChatModel, ImageModel, ImageSize},
    stream::{CompletionStream, StreamEvent},
    types::{Content, Credentials, ImageRequest, ImageResponse, Message, Part, Role},
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client
pub struct OpenAiClient {
    client: reqwest::Client,
    credentials: Credentials,
    base_url: String,
}

impl OpenAiClient {
    /// Create a new client with a credential triple
    pub fn new(credentials: Credentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (for compatible endpoints)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", self.credentials.api_key)
            .parse()
            .map_err(|_| Error::MissingCredentials)?;
        headers.insert("Authorization", auth);
        headers.insert(
            "OpenAI-Organization",
            self.credentials
                .organization
                .parse()
                .map_err(|_| Error::MissingCredentials)?,
        );
        headers.insert(
            "OpenAI-Project",
            self.credentials
                .project
                .parse()
                .map_err(|_| Error::MissingCredentials)?,
        );
        headers.insert(
            "content-type",
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        Ok(headers)
    }

    /// Open a completion stream for an ordered list of messages
    pub async fn stream_chat(
        &self,
        model: ChatModel,
        messages: &[Message],
    ) -> Result<CompletionStream> {
        if !self.credentials.is_configured() {
            return Err(Error::MissingCredentials);
        }

        tracing::debug!(
            model = model.id(),
            messages = messages.len(),
            "opening completion stream"
        );

        let request = ChatRequest {
            model: model.id(),
            messages: wire_messages(messages),
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };
        let url = format!("{}/chat/completions", self.base_url);

        let request_builder = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }

    /// Issue a single non-streaming image generation
    pub async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse> {
        if !self.credentials.is_configured() {
            return Err(Error::MissingCredentials);
        }

        let url = format!("{}/images/generations", self.base_url);
        let body = ImagesRequest {
            model: request.model,
            prompt: &request.prompt,
            n: 1,
            size: request.size,
        };

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_str().to_string(), text));
        }

        let images: ImagesResponse = response.json().await?;
        images
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnexpectedResponse("empty image data".to_string()))
    }
}

fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = StreamEvent> {
    stream! {
        let mut total_tokens: Option<u32> = None;

        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    let chunk: std::result::Result<StreamChunk, _> =
                        serde_json::from_str(&msg.data);
                    match chunk {
                        Ok(chunk) => {
                            for choice in &chunk.choices {
                                if let Some(ref content) = choice.delta.content {
                                    if !content.is_empty() {
                                        yield StreamEvent::Delta {
                                            text: content.clone(),
                                        };
                                    }
                                }
                            }

                            // Usage arrives in the final chunk when
                            // stream_options.include_usage is set
                            if let Some(ref usage) = chunk.usage {
                                total_tokens = Some(usage.total_tokens);
                            }
                        }
                        Err(e) => {
                            yield StreamEvent::Error {
                                message: format!("Failed to parse chunk: {}", e),
                            };
                            return;
                        }
                    }
                }
                Err(e) => {
                    yield StreamEvent::Error {
                        message: format!("SSE error: {}", e),
                    };
                    return;
                }
            }
        }

        // The metering fragment is always terminal
        if let Some(total_tokens) = total_tokens {
            yield StreamEvent::Usage { total_tokens };
        }
    }
}

/// Convert session messages to the Chat Completions wire format
fn wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                // The welcome entry is filtered upstream; treat a stray
                // one as assistant prose
                Role::Assistant | Role::Welcome => "assistant",
            };
            let content = match &msg.content {
                Content::Text(text) => WireContent::Text(text.clone()),
                Content::Parts(parts) => WireContent::Parts(
                    parts
                        .iter()
                        .map(|part| match part {
                            Part::Text { text } => WirePart::Text { text: text.clone() },
                            Part::ImageRef { url } => WirePart::ImageUrl {
                                image_url: WireImageUrl { url: url.clone() },
                            },
                        })
                        .collect(),
                ),
            };
            WireMessage { role, content }
        })
        .collect()
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ImagesRequest<'a> {
    model: ImageModel,
    prompt: &'a str,
    n: u8,
    size: ImageSize,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageResponse>,
}
