//! Emoji fusion: request building, remote backends and result types.

mod backend;
pub mod backends;
mod builder;
mod generation;
mod types;

pub use backend::{FusionBackend, FusionBackendExt, FusionState};
pub use builder::{
    is_pictographic, is_single_emoji, RequestBuilder, DEFAULT_MAX_IMAGE_BYTES, FUSION_DIRECTIVE,
};
pub use generation::{
    GeminiModel, GenerationConfig, HarmBlockThreshold, HarmCategory, ResponseModality,
    SafetySetting, SAFETY_SETTINGS,
};
pub use types::{
    FusionInput, FusionItem, FusionResult, ImageFormat, ItemField, PromptMessage, PromptPart,
    RenderedPrompt, Role,
};
