//! Error types for emoji fusion.

use crate::fusion::ItemField;
use std::fmt;
use std::time::Duration;

/// Longest upstream error message kept in an error value.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// A single invalid input item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Which of the two items failed.
    pub field: ItemField,
    /// Human-readable reason.
    pub reason: String,
}

impl ValidationError {
    /// Creates a new validation error for `field`.
    pub fn new(field: ItemField, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Every validation failure found in one input pair.
///
/// Both items are always checked, so a caller can surface both errors at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    /// Returns the error for `field`, if that item failed.
    pub fn for_field(&self, field: ItemField) -> Option<&ValidationError> {
        self.0.iter().find(|e| e.field == field)
    }

    /// Iterates over the individual errors.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// Number of invalid items.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no item failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Errors that can occur while fusing emojis.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    /// One or both input items are malformed. No remote call was made.
    #[error("invalid input: {0}")]
    Validation(ValidationErrors),

    /// The advisory daily usage gate vetoed the request.
    #[error("daily limit of {limit} fusions reached, try again tomorrow")]
    LimitReached { limit: u32 },

    /// API key missing or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network or HTTP transport error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Upstream service returned a non-2xx response.
    #[error("upstream error: {status} - {message}")]
    Upstream { status: u16, message: String },

    /// Upstream rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// The model refused the request on content-safety grounds.
    #[error("content blocked: {0}")]
    SafetyBlocked(String),

    /// The response did not carry a usable image.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The caller cancelled the in-flight request.
    #[error("fusion cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (usage store, saving output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FusionError {
    /// Returns true if this error is likely transient and worth resubmitting.
    ///
    /// Safety blocks are never retryable: the same prompt will be refused again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns the suggested delay before resubmitting, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::Network(_) => Some(Duration::from_secs(2)),
            Self::Upstream { status, .. } if *status >= 500 => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    /// True for any failure of the remote call itself.
    ///
    /// Callers that only want a single "fusion failed" signal can match on this
    /// instead of the individual variants.
    pub fn is_fusion_failure(&self) -> bool {
        matches!(
            self,
            Self::Auth(_)
                | Self::Network(_)
                | Self::Upstream { .. }
                | Self::RateLimited { .. }
                | Self::SafetyBlocked(_)
                | Self::MalformedResponse(_)
        )
    }
}

impl From<ValidationErrors> for FusionError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Result type alias for fusion operations.
pub type Result<T> = std::result::Result<T, FusionError>;

/// Parses a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Redacts API keys and truncates an upstream error body.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            if let Some(pos) = word.find("key=") {
                format!("{}key=[REDACTED]", &word[..pos])
            } else if word.starts_with("AIza") && word.len() > 20 {
                "[REDACTED]".to_string()
            } else {
                word.to_string()
            }
        })
        .collect();
    let joined = redacted.join(" ");

    if joined.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = joined.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(FusionError::RateLimited { retry_after: None }.is_retryable());
        assert!(FusionError::Upstream {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());

        assert!(!FusionError::Upstream {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!FusionError::SafetyBlocked("SAFETY".into()).is_retryable());
        assert!(!FusionError::Auth("bad key".into()).is_retryable());
        assert!(!FusionError::LimitReached { limit: 3 }.is_retryable());
        assert!(!FusionError::Cancelled.is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let rate_limited = FusionError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(60)));

        let no_hint = FusionError::RateLimited { retry_after: None };
        assert_eq!(no_hint.retry_after(), None);

        assert_eq!(FusionError::SafetyBlocked("x".into()).retry_after(), None);
    }

    #[test]
    fn test_fusion_failure_grouping() {
        assert!(FusionError::SafetyBlocked("x".into()).is_fusion_failure());
        assert!(FusionError::MalformedResponse("x".into()).is_fusion_failure());
        assert!(!FusionError::LimitReached { limit: 3 }.is_fusion_failure());
        assert!(!FusionError::Validation(ValidationErrors(vec![])).is_fusion_failure());
        assert!(!FusionError::Cancelled.is_fusion_failure());
    }

    #[test]
    fn test_error_display() {
        let err = FusionError::Upstream {
            status: 404,
            message: "Not found".into(),
        };
        assert_eq!(err.to_string(), "upstream error: 404 - Not found");

        let err = FusionError::Validation(ValidationErrors(vec![
            ValidationError::new(ItemField::First, "must not be empty"),
            ValidationError::new(ItemField::Second, "must be a single emoji"),
        ]));
        assert_eq!(
            err.to_string(),
            "invalid input: emoji1: must not be empty; emoji2: must be a single emoji"
        );
    }

    #[test]
    fn test_validation_errors_for_field() {
        let errors = ValidationErrors(vec![ValidationError::new(ItemField::Second, "nope")]);
        assert!(errors.for_field(ItemField::First).is_none());
        assert_eq!(errors.for_field(ItemField::Second).unwrap().reason, "nope");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_sanitize_redacts_keys() {
        let msg = sanitize_error_message(
            "bad request https://example.com/v1?key=AIzaSyDUMMYDUMMYDUMMY123 failed",
        );
        assert!(!msg.contains("AIzaSy"));
        assert!(msg.contains("key=[REDACTED]"));
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(2000);
        let msg = sanitize_error_message(&long);
        assert!(msg.len() <= MAX_ERROR_MESSAGE_LEN + 3);
        assert!(msg.ends_with("..."));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(30));
    }
}
