//! Session configuration, seeded from the persistence gateway

use penny_ai::{ChatModel, Credentials};
use serde::{Deserialize, Serialize};

/// Summary-language value that asks the model to infer the language
/// from the page content.
pub const SUMMARY_LANGUAGE_AUTO: &str = "auto";

/// Configuration consumed read-only by the engine during turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// OpenAI credential triple
    pub credentials: Credentials,
    /// Model used for chat turns
    pub model: ChatModel,
    /// Whether trailing history is retained in outbound context
    pub retain_context: bool,
    /// Target language for page summaries ("auto" infers from content)
    pub summary_language: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            model: ChatModel::default(),
            retain_context: false,
            summary_language: SUMMARY_LANGUAGE_AUTO.to_string(),
        }
    }
}

impl SessionConfig {
    /// Whether the credential triple is complete enough to chat
    pub fn is_configured(&self) -> bool {
        self.credentials.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.model, ChatModel::Gpt4oMini);
        assert!(!config.retain_context);
        assert_eq!(config.summary_language, SUMMARY_LANGUAGE_AUTO);
        assert!(!config.is_configured());
    }
}
