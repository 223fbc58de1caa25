//! penny-session: the session engine
//!
//! Owns message history, builds the bounded outbound context for each
//! turn, reconciles streamed fragments into the in-flight assistant
//! message, and persists session state across reloads.

pub mod client;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod persist;
pub mod reconcile;

pub use client::CompletionClient;
pub use config::{SUMMARY_LANGUAGE_AUTO, SessionConfig};
pub use context::{CONTEXT_WINDOW, SUMMARY_MARKER, build_context};
pub use engine::{PageSource, SessionEngine, SessionStatus};
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use history::HistoryStore;
pub use persist::{FileGateway, PersistenceGateway, StoredState};
