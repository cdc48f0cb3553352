//! Fusion backends.

mod gemini;

pub use gemini::{GeminiBackend, GeminiBackendBuilder, API_KEY_ENV_VARS, DEFAULT_BASE_URL};
