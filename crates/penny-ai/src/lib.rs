//! penny-ai: OpenAI client layer
//!
//! This crate provides the wire types, model registry, and streaming
//! client used by the session engine to talk to the completion and
//! image-generation services.

pub mod error;
pub mod models;
pub mod openai;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use models::{ChatModel, ImageModel, ImageSize};
pub use openai::OpenAiClient;
pub use stream::{CompletionStream, StreamEvent};
pub use types::*;
