//! Completion-service boundary

use async_trait::async_trait;
use penny_ai::{ChatModel, CompletionStream, ImageRequest, ImageResponse, Message, OpenAiClient};

/// The completion client as seen by the session engine: an opaque
/// request/stream primitive plus a single-shot image generation call.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open a lazy fragment stream for (model, ordered messages)
    async fn stream_chat(
        &self,
        model: ChatModel,
        messages: Vec<Message>,
    ) -> penny_ai::Result<CompletionStream>;

    /// Issue one non-streaming image generation
    async fn generate_image(&self, request: ImageRequest) -> penny_ai::Result<ImageResponse>;
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream_chat(
        &self,
        model: ChatModel,
        messages: Vec<Message>,
    ) -> penny_ai::Result<CompletionStream> {
        OpenAiClient::stream_chat(self, model, &messages).await
    }

    async fn generate_image(&self, request: ImageRequest) -> penny_ai::Result<ImageResponse> {
        OpenAiClient::generate_image(self, &request).await
    }
}
