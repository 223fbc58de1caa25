//! Supported model identifiers

use serde::{Deserialize, Serialize};

/// Chat completion models
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatModel {
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    /// The cheapest variant; the default when nothing is configured
    #[default]
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "o1-preview")]
    O1Preview,
}

impl ChatModel {
    /// The identifier sent over the wire
    pub fn id(&self) -> &'static str {
        match self {
            ChatModel::Gpt4o => "gpt-4o",
            ChatModel::Gpt4oMini => "gpt-4o-mini",
            ChatModel::O1Preview => "o1-preview",
        }
    }

    /// All supported chat models
    pub fn all() -> &'static [ChatModel] {
        &[ChatModel::Gpt4o, ChatModel::Gpt4oMini, ChatModel::O1Preview]
    }
}

impl std::fmt::Display for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for ChatModel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpt-4o" => Ok(ChatModel::Gpt4o),
            "gpt-4o-mini" => Ok(ChatModel::Gpt4oMini),
            "o1-preview" => Ok(ChatModel::O1Preview),
            _ => Err(crate::Error::ModelNotFound(s.to_string())),
        }
    }
}

/// Image generation model variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageModel {
    #[serde(rename = "dall-e-2")]
    DallE2,
    #[default]
    #[serde(rename = "dall-e-3")]
    DallE3,
}

impl ImageModel {
    pub fn id(&self) -> &'static str {
        match self {
            ImageModel::DallE2 => "dall-e-2",
            ImageModel::DallE3 => "dall-e-3",
        }
    }
}

impl std::fmt::Display for ImageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for ImageModel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dall-e-2" => Ok(ImageModel::DallE2),
            "dall-e-3" => Ok(ImageModel::DallE3),
            _ => Err(crate::Error::ModelNotFound(s.to_string())),
        }
    }
}

/// Generated image dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1792x1024")]
    Wide,
    #[serde(rename = "1024x1792")]
    Tall,
}

impl ImageSize {
    pub fn id(&self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Wide => "1792x1024",
            ImageSize::Tall => "1024x1792",
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
