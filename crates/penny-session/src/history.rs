//! The ordered, mutable log of all turns

use penny_ai::{Message, Role};

/// Session history. Index 0 is always the welcome message; it is never
/// sent outbound and never persisted.
#[derive(Debug)]
pub struct HistoryStore {
    messages: Vec<Message>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self {
            messages: vec![Message::welcome()],
        }
    }
}

impl HistoryStore {
    /// Create a fresh history holding only the welcome message
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild history from persisted (non-welcome) messages, prepending
    /// the welcome entry
    pub fn from_persisted(messages: Vec<Message>) -> Self {
        let mut all = vec![Message::welcome()];
        all.extend(messages);
        Self { messages: all }
    }

    /// Append a message, returning the new length
    pub fn append(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len()
    }

    /// Atomically append a user message and an empty assistant
    /// placeholder. Returns the placeholder's index for the reconciler
    /// to target.
    pub fn append_turn(&mut self, user_message: Message) -> usize {
        self.messages.push(user_message);
        self.messages.push(Message::assistant_empty());
        self.messages.len() - 1
    }

    /// Replace the entire history wholesale. The welcome entry is
    /// re-pinned at index 0 if the replacement lacks one.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        if messages.first().is_none_or(|m| m.role != Role::Welcome) {
            let mut all = vec![Message::welcome()];
            all.extend(messages);
            self.messages = all;
        } else {
            self.messages = messages;
        }
    }

    /// Reset to the single welcome message
    pub fn reset(&mut self) {
        self.replace_all(vec![Message::welcome()]);
    }

    /// The last `n` non-welcome messages
    pub fn tail(&self, n: usize) -> &[Message] {
        let rest = &self.messages[1..];
        let start = rest.len().saturating_sub(n);
        &rest[start..]
    }

    /// All messages, welcome included
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The messages eligible for persistence (welcome excluded)
    pub fn persistable(&self) -> &[Message] {
        &self.messages[1..]
    }

    /// Look up a message by index
    pub fn message(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Append a streamed fragment to the message at `index`
    pub fn push_fragment(&mut self, index: usize, fragment: &str) {
        if let Some(message) = self.messages.get_mut(index) {
            message.content.push_fragment(fragment);
        }
    }

    /// Overwrite the content of the message at `index` in one update
    pub fn set_content(&mut self, index: usize, content: penny_ai::Content) {
        if let Some(message) = self.messages.get_mut(index) {
            message.content = content;
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
