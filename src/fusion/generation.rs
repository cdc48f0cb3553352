//! Fixed generation parameters sent with every fusion request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FusionError;

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeminiModel {
    /// Gemini 2.0 Flash image generation preview.
    #[default]
    #[serde(rename = "gemini-2.0-flash-preview-image-generation", alias = "flash-preview")]
    FlashImagePreview,
    /// Gemini 2.5 Flash Image.
    #[serde(rename = "gemini-2.5-flash-image", alias = "flash")]
    FlashImage,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlashImagePreview => "gemini-2.0-flash-preview-image-generation",
            Self::FlashImage => "gemini-2.5-flash-image",
        }
    }
}

impl fmt::Display for GeminiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeminiModel {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini-2.0-flash-preview-image-generation" | "flash-preview" => {
                Ok(Self::FlashImagePreview)
            }
            "gemini-2.5-flash-image" | "flash" => Ok(Self::FlashImage),
            other => Err(FusionError::Config(format!("unknown model: {other}"))),
        }
    }
}

/// Harm categories with configurable thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmCategory {
    /// Hate speech.
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    /// Dangerous content.
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
    /// Harassment.
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    /// Sexually explicit content.
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
}

/// Blocking thresholds, from most to least permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    /// Never block.
    BlockNone,
    /// Block only high-probability harm.
    BlockOnlyHigh,
    /// Block medium and high.
    BlockMediumAndAbove,
    /// Block low, medium and high.
    BlockLowAndAbove,
}

/// A single category/threshold pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    /// Category the threshold applies to.
    pub category: HarmCategory,
    /// Threshold for the category.
    pub threshold: HarmBlockThreshold,
}

/// Safety thresholds applied to every fusion.
pub const SAFETY_SETTINGS: [SafetySetting; 4] = [
    SafetySetting {
        category: HarmCategory::HateSpeech,
        threshold: HarmBlockThreshold::BlockOnlyHigh,
    },
    SafetySetting {
        category: HarmCategory::DangerousContent,
        threshold: HarmBlockThreshold::BlockNone,
    },
    SafetySetting {
        category: HarmCategory::Harassment,
        threshold: HarmBlockThreshold::BlockMediumAndAbove,
    },
    SafetySetting {
        category: HarmCategory::SexuallyExplicit,
        threshold: HarmBlockThreshold::BlockLowAndAbove,
    },
];

/// Output modalities the model may respond with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    /// Text output.
    Text,
    /// Image output.
    Image,
}

/// Process-wide generation parameters. Not user-controlled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Model to call.
    pub model: GeminiModel,
    /// Safety thresholds.
    pub safety_settings: Vec<SafetySetting>,
    /// Requested output modalities.
    pub response_modalities: Vec<ResponseModality>,
}

impl GenerationConfig {
    /// Fixed config for the given model.
    pub fn for_model(model: GeminiModel) -> Self {
        Self {
            model,
            safety_settings: SAFETY_SETTINGS.to_vec(),
            response_modalities: vec![ResponseModality::Text, ResponseModality::Image],
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::for_model(GeminiModel::default())
    }
}
