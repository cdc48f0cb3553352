//! Input validation and prompt rendering.

use crate::error::{ValidationError, ValidationErrors};
use crate::fusion::types::{
    split_data_uri, FusionInput, FusionItem, ImageFormat, ItemField, PromptMessage, PromptPart,
    RenderedPrompt, Role,
};
use base64::Engine;
use std::cmp::Ordering;
use unicode_segmentation::UnicodeSegmentation;

/// Default upper bound on a decoded input image.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

const PREAMBLE: &str = "You are an AI that can fuse two emojis together to create a new emoji.\n\n";

/// Instruction appended after both inputs.
pub const FUSION_DIRECTIVE: &str = "Create a new emoji that is a fusion of the two emojis. \
The output should be an image of the new emoji. It should still look like an emoji - \
a small, simple image with a transparent background. Do not include a border.";

/// Scalars that can start an emoji: Extended_Pictographic plus the
/// Emoji_Presentation-only regional indicators and skin tone modifiers.
/// Sorted, non-overlapping.
const PICTOGRAPHIC_RANGES: &[(u32, u32)] = &[
    (0x00A9, 0x00A9),
    (0x00AE, 0x00AE),
    (0x203C, 0x203C),
    (0x2049, 0x2049),
    (0x2122, 0x2122),
    (0x2139, 0x2139),
    (0x2194, 0x2199),
    (0x21A9, 0x21AA),
    (0x231A, 0x231B),
    (0x2328, 0x2328),
    (0x2388, 0x2388),
    (0x23CF, 0x23CF),
    (0x23E9, 0x23F3),
    (0x23F8, 0x23FA),
    (0x24C2, 0x24C2),
    (0x25AA, 0x25AB),
    (0x25B6, 0x25B6),
    (0x25C0, 0x25C0),
    (0x25FB, 0x25FE),
    (0x2600, 0x2605),
    (0x2607, 0x2612),
    (0x2614, 0x2685),
    (0x2690, 0x2705),
    (0x2708, 0x2712),
    (0x2714, 0x2714),
    (0x2716, 0x2716),
    (0x271D, 0x271D),
    (0x2721, 0x2721),
    (0x2728, 0x2728),
    (0x2733, 0x2734),
    (0x2744, 0x2744),
    (0x2747, 0x2747),
    (0x274C, 0x274C),
    (0x274E, 0x274E),
    (0x2753, 0x2755),
    (0x2757, 0x2757),
    (0x2763, 0x2767),
    (0x2795, 0x2797),
    (0x27A1, 0x27A1),
    (0x27B0, 0x27B0),
    (0x27BF, 0x27BF),
    (0x2934, 0x2935),
    (0x2B05, 0x2B07),
    (0x2B1B, 0x2B1C),
    (0x2B50, 0x2B50),
    (0x2B55, 0x2B55),
    (0x3030, 0x3030),
    (0x303D, 0x303D),
    (0x3297, 0x3297),
    (0x3299, 0x3299),
    (0x1F000, 0x1F0FF),
    (0x1F10D, 0x1F10F),
    (0x1F12F, 0x1F12F),
    (0x1F16C, 0x1F171),
    (0x1F17E, 0x1F17F),
    (0x1F18E, 0x1F18E),
    (0x1F191, 0x1F19A),
    (0x1F1AD, 0x1F1FF),
    (0x1F201, 0x1F20F),
    (0x1F21A, 0x1F21A),
    (0x1F22F, 0x1F22F),
    (0x1F232, 0x1F23A),
    (0x1F23C, 0x1F23F),
    (0x1F249, 0x1F53D),
    (0x1F546, 0x1F64F),
    (0x1F680, 0x1F6FF),
    (0x1F774, 0x1F77F),
    (0x1F7D5, 0x1F7FF),
    (0x1F80C, 0x1F80F),
    (0x1F848, 0x1F84F),
    (0x1F85A, 0x1F85F),
    (0x1F888, 0x1F88F),
    (0x1F8AE, 0x1F8FF),
    (0x1F90C, 0x1F93A),
    (0x1F93C, 0x1F945),
    (0x1F947, 0x1FAFF),
    (0x1FC00, 0x1FFFD),
];

/// Returns true if `c` can begin an emoji grapheme.
pub fn is_pictographic(c: char) -> bool {
    let cp = c as u32;
    PICTOGRAPHIC_RANGES
        .binary_search_by(|&(lo, hi)| {
            if hi < cp {
                Ordering::Less
            } else if lo > cp {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
        .is_ok()
}

/// Returns true if `s` is exactly one pictographic grapheme cluster.
///
/// Skin tones, variation selectors, ZWJ sequences and flags all count as one
/// cluster.
pub fn is_single_emoji(s: &str) -> bool {
    check_emoji(s).is_ok()
}

fn check_emoji(s: &str) -> Result<(), String> {
    let clusters: Vec<&str> = s.graphemes(true).collect();
    match clusters.as_slice() {
        [] => Err("must not be empty".into()),
        [cluster] => match cluster.chars().next() {
            Some(c) if is_pictographic(c) => Ok(()),
            _ => Err(format!("'{cluster}' is not an emoji")),
        },
        many => Err(format!(
            "must be a single emoji, found {} characters",
            many.len()
        )),
    }
}

/// Validates and renders fusion prompts.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    max_image_bytes: usize,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

impl RequestBuilder {
    /// Creates a builder with the default image size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest accepted decoded image, in bytes.
    pub fn max_image_bytes(mut self, max: usize) -> Self {
        self.max_image_bytes = max;
        self
    }

    /// Validates both items and renders the instruction.
    ///
    /// Both items are checked even if the first fails.
    pub fn build(
        &self,
        first: &FusionItem,
        second: &FusionItem,
    ) -> Result<RenderedPrompt, ValidationErrors> {
        let errors: Vec<ValidationError> = [(ItemField::First, first), (ItemField::Second, second)]
            .into_iter()
            .filter_map(|(field, item)| self.validate(field, item).err())
            .collect();

        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }

        let mut parts = PartsWriter::default();
        parts.text(PREAMBLE);
        parts.text("The first emoji is: ");
        parts.item(first);
        parts.text("\nThe second emoji is: ");
        parts.item(second);
        parts.text("\n\n");
        parts.text(FUSION_DIRECTIVE);

        Ok(RenderedPrompt {
            messages: vec![PromptMessage {
                role: Role::User,
                parts: parts.finish(),
            }],
        })
    }

    /// Builds from a [`FusionInput`].
    pub fn build_input(&self, input: &FusionInput) -> Result<RenderedPrompt, ValidationErrors> {
        self.build(&input.first, &input.second)
    }

    /// Validates a single item.
    pub fn validate(&self, field: ItemField, item: &FusionItem) -> Result<(), ValidationError> {
        match item {
            FusionItem::Emoji(value) => {
                check_emoji(value).map_err(|reason| ValidationError::new(field, reason))
            }
            FusionItem::Image(uri) => self
                .check_image(uri)
                .map_err(|reason| ValidationError::new(field, reason)),
        }
    }

    fn check_image(&self, uri: &str) -> Result<(), String> {
        let (mime, body) =
            split_data_uri(uri).ok_or("must be a data:<mime>;base64,<data> image payload")?;

        let format = ImageFormat::from_mime_type(mime)
            .ok_or_else(|| format!("unsupported image type '{mime}' (use PNG, JPEG or GIF)"))?;

        if body.is_empty() {
            return Err("image data is empty".into());
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body)
            .map_err(|e| format!("image data is not valid base64: {e}"))?;

        if bytes.is_empty() {
            return Err("image data is empty".into());
        }

        if !format.matches_bytes(&bytes) {
            return Err(format!("image content does not match declared type '{mime}'"));
        }

        if bytes.len() > self.max_image_bytes {
            return Err(format!(
                "image is {} bytes, larger than the {} byte limit",
                bytes.len(),
                self.max_image_bytes
            ));
        }

        Ok(())
    }
}

/// Accumulates prompt parts, merging adjacent text.
#[derive(Default)]
struct PartsWriter {
    parts: Vec<PromptPart>,
}

impl PartsWriter {
    fn text(&mut self, s: &str) {
        if let Some(PromptPart::Text(last)) = self.parts.last_mut() {
            last.push_str(s);
        } else {
            self.parts.push(PromptPart::Text(s.to_string()));
        }
    }

    fn item(&mut self, item: &FusionItem) {
        match item {
            FusionItem::Emoji(value) => self.text(value),
            FusionItem::Image(uri) => {
                // Validated before rendering.
                if let Some((mime, body)) = split_data_uri(uri) {
                    self.parts.push(PromptPart::Media {
                        mime_type: mime.to_string(),
                        data: body.to_string(),
                    });
                }
            }
        }
    }

    fn finish(self) -> Vec<PromptPart> {
        self.parts
    }
}
