//! Outbound context construction

use penny_ai::{Message, Role};

use crate::history::HistoryStore;

/// How many trailing non-welcome messages are retained per turn.
/// Fixed to bound token cost when context retention is enabled.
pub const CONTEXT_WINDOW: usize = 6;

/// Text of the synthetic user message that marks a page-summarization
/// turn in history.
pub const SUMMARY_MARKER: &str = "Summary Contents";

/// Compute the exact message list sent to the completion service for a
/// new turn.
///
/// With retention off the new message goes out alone. With retention on
/// the last [`CONTEXT_WINDOW`] messages are prepended, minus the first
/// summary marker/response pair found in the window: summarization
/// turns are cost-heavy and must not compound across turns. The welcome
/// message is never included.
pub fn build_context(history: &HistoryStore, retain: bool, new_message: &Message) -> Vec<Message> {
    if !retain {
        return vec![new_message.clone()];
    }

    let mut window: Vec<Message> = history.tail(CONTEXT_WINDOW).to_vec();

    if let Some(i) = window
        .iter()
        .position(|m| m.role == Role::User && m.text() == SUMMARY_MARKER)
    {
        // Only a complete marker/response pair is pruned; a marker
        // whose reply fell outside the window stays put
        if window
            .get(i + 1)
            .is_some_and(|m| m.role == Role::Assistant)
        {
            window.drain(i..=i + 1);
        }
    }

    window.push(new_message.clone());
    window
}
