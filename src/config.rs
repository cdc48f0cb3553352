//! Settings loading.
//!
//! Resolution order for the config file:
//! 1. Explicit path (e.g. `--config`)
//! 2. `EMOJI_ALCHEMIST_CONFIG` environment variable
//! 3. `<config_dir>/emoji-alchemist/config.toml`, if it exists
//! 4. Built-in defaults

use crate::error::{FusionError, Result};
use crate::fusion::backends::GeminiBackendBuilder;
use crate::fusion::{GeminiModel, RequestBuilder, DEFAULT_MAX_IMAGE_BYTES};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "EMOJI_ALCHEMIST_CONFIG";

const APP_DIR: &str = "emoji-alchemist";

/// User-tunable settings. Generation parameters are not configurable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Model to call.
    pub model: GeminiModel,
    /// Where the usage counter is persisted.
    pub usage_file: PathBuf,
    /// Largest accepted input image, decoded.
    pub max_image_bytes: usize,
    /// Transport timeout. Unset means no timeout.
    pub request_timeout_secs: Option<u64>,
    /// REST endpoint override.
    pub base_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: GeminiModel::default(),
            usage_file: default_usage_file(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            request_timeout_secs: None,
            base_url: None,
        }
    }
}

impl Settings {
    /// Loads settings following the resolution order above.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Self::from_file(Path::new(&path));
            }
        }

        if let Some(path) = default_config_file().filter(|p| p.exists()) {
            return Self::from_file(&path);
        }

        Ok(Self::default())
    }

    /// Parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FusionError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let settings = Self::from_toml(&text).map_err(|e| match e {
            FusionError::Config(msg) => FusionError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(settings)
    }

    /// Parses TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| FusionError::Config(e.to_string()))?;
        if settings.max_image_bytes == 0 {
            return Err(FusionError::Config("max_image_bytes must be positive".into()));
        }
        Ok(settings)
    }

    /// A request builder honoring these settings.
    pub fn request_builder(&self) -> RequestBuilder {
        RequestBuilder::new().max_image_bytes(self.max_image_bytes)
    }

    /// A Gemini backend builder honoring these settings. The API key still
    /// comes from the environment unless set on the returned builder.
    pub fn backend_builder(&self) -> GeminiBackendBuilder {
        let mut builder = GeminiBackendBuilder::new().model(self.model);
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(ref url) = self.base_url {
            builder = builder.base_url(url.clone());
        }
        builder
    }
}

/// Default config file location, if the platform has a config dir.
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Default usage counter location.
pub fn default_usage_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{APP_DIR}")))
        .join("usage.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.model, GeminiModel::FlashImagePreview);
        assert_eq!(settings.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
        assert!(settings.request_timeout_secs.is_none());
        assert!(settings.usage_file.ends_with("usage.json"));
    }

    #[test]
    fn test_from_toml_partial() {
        let settings = Settings::from_toml(
            r#"
            model = "gemini-2.5-flash-image"
            request_timeout_secs = 90
            "#,
        )
        .unwrap();
        assert_eq!(settings.model, GeminiModel::FlashImage);
        assert_eq!(settings.request_timeout_secs, Some(90));
        assert_eq!(settings.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let err = Settings::from_toml("daily_limit = 100").unwrap_err();
        assert!(matches!(err, FusionError::Config(_)));
    }

    #[test]
    fn test_from_toml_rejects_zero_image_limit() {
        assert!(Settings::from_toml("max_image_bytes = 0").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "usage_file = \"/tmp/ea-usage.json\"\nmax_image_bytes = 1024\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.usage_file, PathBuf::from("/tmp/ea-usage.json"));
        assert!(settings
            .request_builder()
            .build_input(&Default::default())
            .is_ok());
        assert_eq!(settings.max_image_bytes, 1024);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = Settings::load(Some(Path::new("/nonexistent/ea.toml"))).unwrap_err();
        assert!(matches!(err, FusionError::Config(_)));
    }
}
