//! Core types for emoji fusion.

use crate::error::{FusionError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// MIME type used when an uploaded file's format cannot be detected.
const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

/// Which of the two input items a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemField {
    /// The first item.
    #[serde(rename = "emoji1")]
    First,
    /// The second item.
    #[serde(rename = "emoji2")]
    Second,
}

impl ItemField {
    /// Returns the field name used in error messages and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "emoji1",
            Self::Second => "emoji2",
        }
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image formats accepted as fusion input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format.
    Png,
    /// JPEG format.
    Jpeg,
    /// GIF format.
    Gif,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }

    /// Looks up a supported format by MIME type.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        None
    }

    /// Checks if the given data matches this format's magic bytes.
    pub fn matches_bytes(&self, data: &[u8]) -> bool {
        Self::from_magic_bytes(data) == Some(*self)
    }
}

/// One of the two things to fuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FusionItem {
    /// A single emoji, e.g. `"🚀"`.
    Emoji(String),
    /// An encoded image as a data URI: `data:<mime>;base64,<body>`.
    Image(String),
}

impl FusionItem {
    /// Creates an emoji item.
    pub fn emoji(value: impl Into<String>) -> Self {
        Self::Emoji(value.into())
    }

    /// Creates an image item from an already-encoded data URI.
    pub fn data_uri(value: impl Into<String>) -> Self {
        Self::Image(value.into())
    }

    /// Creates an image item from raw bytes, detecting the MIME type.
    ///
    /// Undetectable content is still wrapped (as `application/octet-stream`)
    /// so that validation reports it against the right field.
    pub fn from_image_bytes(data: &[u8]) -> Self {
        let mime = ImageFormat::from_magic_bytes(data)
            .map(|f| f.mime_type())
            .unwrap_or(UNKNOWN_MIME_TYPE);
        let body = base64::engine::general_purpose::STANDARD.encode(data);
        Self::Image(format!("data:{mime};base64,{body}"))
    }

    /// Reads an image file into an image item.
    pub fn from_image_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::from_image_bytes(&data))
    }

    /// Returns the item kind as a string.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Emoji(_) => "emoji",
            Self::Image(_) => "image",
        }
    }
}

/// The pair of items submitted for one fusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionInput {
    /// First item.
    pub first: FusionItem,
    /// Second item.
    pub second: FusionItem,
}

impl FusionInput {
    /// Creates a new input pair.
    pub fn new(first: FusionItem, second: FusionItem) -> Self {
        Self { first, second }
    }

    /// Convenience constructor for two emojis.
    pub fn emojis(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::new(FusionItem::emoji(first), FusionItem::emoji(second))
    }

    /// Returns both items tagged with their field.
    pub fn items(&self) -> [(ItemField, &FusionItem); 2] {
        [(ItemField::First, &self.first), (ItemField::Second, &self.second)]
    }
}

impl Default for FusionInput {
    fn default() -> Self {
        Self::emojis("🚀", "🐸")
    }
}

/// Splits a `data:<mime>;base64,<body>` URI into MIME type and body.
pub(crate) fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, body) = rest.split_once(";base64,")?;
    Some((mime, body))
}

/// Role tag of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user turn.
    User,
    /// Model turn.
    Model,
}

/// A part of a rendered prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptPart {
    /// Plain instruction text.
    Text(String),
    /// An embedded image, carried byte-identically from the input.
    Media {
        /// MIME type, e.g. `image/png`.
        mime_type: String,
        /// Base64 body.
        data: String,
    },
}

/// A role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Who is speaking.
    pub role: Role,
    /// Ordered content parts.
    pub parts: Vec<PromptPart>,
}

/// The validated, rendered instruction sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    /// Messages in conversation order.
    pub messages: Vec<PromptMessage>,
}

impl RenderedPrompt {
    /// Concatenates all text parts.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .flat_map(|m| m.parts.iter())
            .filter_map(|p| match p {
                PromptPart::Text(t) => Some(t.as_str()),
                PromptPart::Media { .. } => None,
            })
            .collect()
    }

    /// Iterates over embedded media as `(mime_type, data)`.
    pub fn media(&self) -> impl Iterator<Item = (&str, &str)> {
        self.messages
            .iter()
            .flat_map(|m| m.parts.iter())
            .filter_map(|p| match p {
                PromptPart::Media { mime_type, data } => Some((mime_type.as_str(), data.as_str())),
                PromptPart::Text(_) => None,
            })
    }
}

/// A fused emoji image returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use = "fused image should be saved or displayed"]
pub struct FusionResult {
    /// MIME type reported by the model.
    pub mime_type: String,
    /// Base64 body, exactly as returned.
    pub data: String,
    /// Model that generated the image.
    pub model: Option<String>,
    /// Remote call duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Any text the model returned alongside the image.
    pub commentary: Option<String>,
}

impl FusionResult {
    /// Creates a result from a MIME type and base64 body.
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
            model: None,
            duration_ms: None,
            commentary: None,
        }
    }

    /// Returns the image as a data URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Decodes the base64 body.
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| FusionError::MalformedResponse(format!("invalid base64 image: {e}")))
    }

    /// Returns a file extension matching the MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "png",
        }
    }

    /// Writes the decoded image to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.decode()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(b"GIF89a\x01\x00"),
            Some(ImageFormat::Gif)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"RIFF\0\0\0\0WEBP"), None);
    }

    #[test]
    fn test_format_from_mime_type() {
        assert_eq!(ImageFormat::from_mime_type("image/png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_mime_type("IMAGE/JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime_type("image/webp"), None);
    }

    #[test]
    fn test_item_field_display() {
        assert_eq!(ItemField::First.to_string(), "emoji1");
        assert_eq!(ItemField::Second.to_string(), "emoji2");
    }

    #[test]
    fn test_from_image_bytes_builds_data_uri() {
        let item = FusionItem::from_image_bytes(&PNG_MAGIC);
        let FusionItem::Image(uri) = item else {
            panic!("expected image item");
        };
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_from_image_bytes_unknown_format() {
        let FusionItem::Image(uri) = FusionItem::from_image_bytes(b"not an image") else {
            panic!("expected image item");
        };
        assert!(uri.starts_with("data:application/octet-stream;base64,"));
    }

    #[test]
    fn test_split_data_uri() {
        assert_eq!(
            split_data_uri("data:image/gif;base64,R0lG"),
            Some(("image/gif", "R0lG"))
        );
        assert_eq!(split_data_uri("image/gif;base64,R0lG"), None);
        assert_eq!(split_data_uri("data:image/gif,R0lG"), None);
    }

    #[test]
    fn test_default_input() {
        let input = FusionInput::default();
        assert_eq!(input.first, FusionItem::emoji("🚀"));
        assert_eq!(input.second, FusionItem::emoji("🐸"));
    }

    #[test]
    fn test_result_data_uri_and_decode() {
        let result = FusionResult::new("image/png", "Zm9v");
        assert_eq!(result.to_data_uri(), "data:image/png;base64,Zm9v");
        assert_eq!(result.decode().unwrap(), b"foo");
        assert_eq!(result.extension(), "png");
    }

    #[test]
    fn test_result_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fused-emoji.png");
        FusionResult::new("image/png", "Zm9v").save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"foo");
    }

    #[test]
    fn test_item_serialization() {
        let json = serde_json::to_value(FusionItem::emoji("🐸")).unwrap();
        assert_eq!(json["kind"], "emoji");
        assert_eq!(json["value"], "🐸");
    }
}
