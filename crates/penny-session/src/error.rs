//! Error types for penny-session

use thiserror::Error;

use crate::engine::SessionStatus;

/// Result type alias using penny-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during session operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the completion client layer
    #[error(transparent)]
    Ai(#[from] penny_ai::Error),

    /// Submission rejected because credentials are absent
    #[error("credentials are not configured")]
    NotConfigured,

    /// Submission rejected because a turn is already in flight
    #[error("a turn is already in flight (status: {0})")]
    Busy(SessionStatus),

    /// The fragment stream failed mid-turn; partial content retained
    #[error("stream failed: {0}")]
    Stream(String),

    /// Persistence gateway failure
    #[error("persistence error: {0}")]
    Persistence(String),
}
