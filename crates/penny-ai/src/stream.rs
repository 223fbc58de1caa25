//! Streaming fragment types

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Fragments yielded while a completion streams in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A content delta, appended verbatim to the in-flight message
    Delta { text: String },
    /// Terminal metering fragment, rendered as a footer rather than prose
    Usage { total_tokens: u32 },
    /// The stream failed; content already delivered stays as-is
    Error { message: String },
}

/// A lazy, finite sequence of completion fragments
pub type CompletionStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;
