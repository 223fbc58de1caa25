//! Persistence gateway: durable session state across reloads

use async_trait::async_trait;
use penny_ai::{Credentials, Message};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Everything the gateway durably stores: configuration plus the
/// non-welcome message history.
#[derive(Debug, Clone, Default)]
pub struct StoredState {
    pub config: SessionConfig,
    pub messages: Vec<Message>,
}

/// Durable mapping from session state to storage. Loaded once at
/// startup; written after each completed primary turn and on clear.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Load persisted state, falling back to defaults for missing keys
    async fn load(&self) -> Result<StoredState>;

    /// Write the full non-welcome history
    async fn save_messages(&self, messages: &[Message]) -> Result<()>;
}

/// Settings file layout. Every key is optional so a first run (or a
/// partially written file) falls back to defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SettingsFile {
    api_key: Option<String>,
    organization: Option<String>,
    project: Option<String>,
    model: Option<String>,
    retain_context: Option<bool>,
    summary_language: Option<String>,
}

impl SettingsFile {
    fn into_config(self) -> SessionConfig {
        let defaults = SessionConfig::default();
        let model = match self.model {
            Some(ref id) => id.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown model '{}' in settings, using default", id);
                defaults.model
            }),
            None => defaults.model,
        };
        SessionConfig {
            credentials: Credentials {
                api_key: self.api_key.unwrap_or_default(),
                organization: self.organization.unwrap_or_default(),
                project: self.project.unwrap_or_default(),
            },
            model,
            retain_context: self.retain_context.unwrap_or(defaults.retain_context),
            summary_language: self.summary_language.unwrap_or(defaults.summary_language),
        }
    }

    fn from_config(config: &SessionConfig) -> Self {
        Self {
            api_key: Some(config.credentials.api_key.clone()),
            organization: Some(config.credentials.organization.clone()),
            project: Some(config.credentials.project.clone()),
            model: Some(config.model.id().to_string()),
            retain_context: Some(config.retain_context),
            summary_language: Some(config.summary_language.clone()),
        }
    }
}

/// File-backed gateway: `settings.toml` for credentials and
/// preferences, `messages.json` for history.
pub struct FileGateway {
    dir: PathBuf,
}

impl FileGateway {
    /// Gateway rooted at the default config directory
    /// (`$PENNY_CONFIG_DIR` or the platform config dir under `penny/`)
    pub fn new() -> Self {
        Self {
            dir: Self::default_dir(),
        }
    }

    /// Gateway rooted at an explicit directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn default_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("PENNY_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("penny")
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join("settings.toml")
    }

    fn messages_path(&self) -> PathBuf {
        self.dir.join("messages.json")
    }

    /// Write credentials and preferences (used by the configure command)
    pub async fn save_settings(&self, config: &SessionConfig) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        let content = toml::to_string_pretty(&SettingsFile::from_config(config))
            .map_err(|e| Error::Persistence(e.to_string()))?;
        tokio::fs::write(self.settings_path(), content)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }
}

impl Default for FileGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    async fn load(&self) -> Result<StoredState> {
        let config = match tokio::fs::read_to_string(self.settings_path()).await {
            Ok(content) => match toml::from_str::<SettingsFile>(&content) {
                Ok(settings) => settings.into_config(),
                Err(e) => {
                    tracing::warn!("Failed to parse settings file: {}", e);
                    SessionConfig::default()
                }
            },
            Err(_) => SessionConfig::default(),
        };

        let messages = match tokio::fs::read_to_string(self.messages_path()).await {
            Ok(content) => match serde_json::from_str::<Vec<Message>>(&content) {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!("Failed to parse persisted messages: {}", e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Ok(StoredState { config, messages })
    }

    async fn save_messages(&self, messages: &[Message]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        let content =
            serde_json::to_string_pretty(messages).map_err(|e| Error::Persistence(e.to_string()))?;
        tokio::fs::write(self.messages_path(), content)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }
}

/// In-memory gateway for tests: records every save for assertions.
#[cfg(test)]
pub(crate) struct MemoryGateway {
    pub(crate) state: parking_lot::Mutex<StoredState>,
    pub(crate) saves: parking_lot::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl MemoryGateway {
    pub(crate) fn new(state: StoredState) -> Self {
        Self {
            state: parking_lot::Mutex::new(state),
            saves: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn last_save(&self) -> Option<Vec<Message>> {
        self.saves.lock().last().cloned()
    }

    pub(crate) fn save_count(&self) -> usize {
        self.saves.lock().len()
    }
}

#[cfg(test)]
#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn load(&self) -> Result<StoredState> {
        Ok(self.state.lock().clone())
    }

    async fn save_messages(&self, messages: &[Message]) -> Result<()> {
        self.saves.lock().push(messages.to_vec());
        Ok(())
    }
}
