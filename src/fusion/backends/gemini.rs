//! Gemini (Google) fusion backend.

use crate::error::{parse_retry_after, sanitize_error_message, FusionError, Result};
use crate::fusion::backend::FusionBackend;
use crate::fusion::generation::{GeminiModel, GenerationConfig, ResponseModality, SafetySetting};
use crate::fusion::types::{FusionResult, PromptPart, RenderedPrompt, Role};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Builder for GeminiBackend.
#[derive(Debug, Clone, Default)]
pub struct GeminiBackendBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl GeminiBackendBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY`, then `GEMINI_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the REST endpoint (e.g. for a proxy).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets a transport timeout. None by default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the backend, resolving the API key.
    pub fn build(self) -> Result<GeminiBackend> {
        let api_key = self
            .api_key
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            })
            .ok_or_else(|| {
                FusionError::Auth("GOOGLE_API_KEY not set and no API key provided".into())
            })?;

        let mut client = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }

        Ok(GeminiBackend {
            client: client.build()?,
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            config: GenerationConfig::for_model(self.model),
        })
    }
}

/// Fuses emojis with a Gemini image model.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    config: GenerationConfig,
}

impl GeminiBackend {
    /// Creates a new `GeminiBackendBuilder`.
    pub fn builder() -> GeminiBackendBuilder {
        GeminiBackendBuilder::new()
    }

    /// Returns the fixed generation config.
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    async fn fuse_impl(&self, prompt: &RenderedPrompt) -> Result<FusionResult> {
        let start = Instant::now();
        let model = self.config.model.as_str();
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let body = GeminiRequest::new(prompt, &self.config);
        tracing::debug!(model, parts = body.part_count(), "submitting fusion request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            FusionError::MalformedResponse(format!("could not parse Gemini response: {e}"))
        })?;

        let mut result = extract_result(gemini_response)?;
        let duration_ms = start.elapsed().as_millis() as u64;
        result.model = Some(model.to_string());
        result.duration_ms = Some(duration_ms);

        tracing::info!(model, duration_ms, mime_type = %result.mime_type, "fusion complete");
        Ok(result)
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> FusionError {
    let text = sanitize_error_message(text);
    if status == 404 {
        return FusionError::Upstream {
            status,
            message: "Model not found. Verify the model name is correct.".into(),
        };
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(Duration::from_secs);
        return FusionError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return FusionError::Auth(text);
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        tracing::warn!(status, "fusion blocked by upstream safety filter");
        return FusionError::SafetyBlocked(text);
    }
    FusionError::Upstream {
        status,
        message: text,
    }
}

/// Unwraps a successful `generateContent` response into a single image.
fn extract_result(response: GeminiResponse) -> Result<FusionResult> {
    // Blocks come back as HTTP 200 with prompt feedback.
    if let Some(feedback) = response.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            tracing::warn!(%reason, "prompt blocked by Gemini");
            let msg = feedback
                .block_reason_message
                .unwrap_or_else(|| format!("Prompt blocked: {reason}"));
            return Err(FusionError::SafetyBlocked(msg));
        }
    }

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        FusionError::MalformedResponse("No candidates in Gemini response".into())
    })?;

    if let Some(ref finish_reason) = candidate.finish_reason {
        match finish_reason.as_str() {
            "SAFETY"
            | "IMAGE_SAFETY"
            | "IMAGE_PROHIBITED_CONTENT"
            | "IMAGE_RECITATION"
            | "RECITATION"
            | "PROHIBITED_CONTENT"
            | "BLOCKLIST"
            | "SPII" => {
                tracing::warn!(%finish_reason, "fusion blocked by Gemini safety filter");
                return Err(FusionError::SafetyBlocked(format!(
                    "Content blocked by Gemini safety filter: {finish_reason}"
                )));
            }
            "IMAGE_OTHER" | "NO_IMAGE" => {
                return Err(FusionError::MalformedResponse(format!(
                    "Generation failed: {finish_reason}. Try a different pair."
                )));
            }
            _ => {}
        }
    }

    let content = candidate.content.ok_or_else(|| {
        FusionError::MalformedResponse("No content in Gemini candidate".into())
    })?;

    let mut commentary = Vec::new();
    let mut image = None;
    for part in content.parts {
        if let Some(text) = part.text {
            commentary.push(text);
        }
        if image.is_none() {
            image = part.inline_data;
        }
    }

    let inline_data = image.ok_or_else(|| {
        FusionError::MalformedResponse("No image data in Gemini response".into())
    })?;

    if !inline_data.mime_type.starts_with("image/") {
        return Err(FusionError::MalformedResponse(format!(
            "Expected an image, got {}",
            inline_data.mime_type
        )));
    }
    if inline_data.data.is_empty() {
        return Err(FusionError::MalformedResponse("Empty image data".into()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(&inline_data.data)
        .map_err(|e| FusionError::MalformedResponse(format!("invalid base64 image: {e}")))?;

    let commentary = commentary.join("").trim().to_string();
    if !commentary.is_empty() {
        tracing::debug!(%commentary, "model returned text alongside the image");
    }

    let mut result = FusionResult::new(inline_data.mime_type, inline_data.data);
    result.commentary = Some(commentary).filter(|c| !c.is_empty());
    Ok(result)
}

#[async_trait]
impl FusionBackend for GeminiBackend {
    async fn fuse(&self, prompt: &RenderedPrompt) -> Result<FusionResult> {
        self.fuse_impl(prompt).await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, self.config.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(FusionError::Auth("Invalid API key".into())),
            404 => Err(FusionError::Upstream {
                status: 404,
                message: "Model not found. Verify the model name is correct.".into(),
            }),
            s if !(200..300).contains(&s) => Err(FusionError::Upstream {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    safety_settings: Vec<SafetySetting>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: Role,
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_modalities: Vec<ResponseModality>,
}

impl GeminiRequest {
    fn new(prompt: &RenderedPrompt, config: &GenerationConfig) -> Self {
        let contents = prompt
            .messages
            .iter()
            .map(|message| GeminiContent {
                role: message.role,
                parts: message
                    .parts
                    .iter()
                    .map(|part| match part {
                        PromptPart::Text(text) => GeminiRequestPart::Text { text: text.clone() },
                        PromptPart::Media { mime_type, data } => GeminiRequestPart::InlineData {
                            inline_data: GeminiInlineData {
                                mime_type: mime_type.clone(),
                                data: data.clone(),
                            },
                        },
                    })
                    .collect(),
            })
            .collect();

        Self {
            contents,
            safety_settings: config.safety_settings.clone(),
            generation_config: GeminiGenerationConfig {
                response_modalities: config.response_modalities.clone(),
            },
        }
    }

    fn part_count(&self) -> usize {
        self.contents.iter().map(|c| c.parts.len()).sum()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}
