//! Events broadcast to the rendering collaborator

use penny_ai::Message;
use serde::{Deserialize, Serialize};

use crate::engine::SessionStatus;

/// Events emitted by the session engine. The rendering layer subscribes
/// and redraws; it never mutates history itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The status machine moved to a new state
    Status { status: SessionStatus },

    /// History changed structurally (turn appended, cleared, restored)
    HistoryChanged,

    /// The message at `index` was mutated in place. Emitted once per
    /// stream fragment, no coalescing.
    MessageUpdate { index: usize, message: Message },

    /// A user-visible notice (rejected submission, stream failure)
    Notice { message: String },
}
