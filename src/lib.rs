#![warn(missing_docs)]
//! Emoji Alchemist - fuse two emojis into a new one with AI image generation.
//!
//! Pick two emojis (or images), and a Gemini image model draws a brand new
//! emoji that combines them.
//!
//! # Quick Start
//!
//! ```no_run
//! use emoji_alchemist::{
//!     FileUsageStore, FusionInput, FusionWorkflow, GeminiBackend, UsageGate,
//! };
//!
//! #[tokio::main]
//! async fn main() -> emoji_alchemist::Result<()> {
//!     let backend = GeminiBackend::builder().build()?;
//!     let gate = UsageGate::new(FileUsageStore::new("usage.json"));
//!     let mut workflow = FusionWorkflow::new(backend, gate);
//!
//!     let fused = workflow.fuse(&FusionInput::emojis("🚀", "🐸")).await?;
//!     fused.save("fused-emoji.png")?;
//!     println!("{}", fused.to_data_uri());
//!     Ok(())
//! }
//! ```
//!
//! # Pieces
//!
//! - [`RequestBuilder`]: validates the two items and renders the prompt.
//! - [`FusionBackend`]: one remote call per fusion; [`GeminiBackend`] is the
//!   provided implementation.
//! - [`UsageGate`]: advisory three-per-day counter over a [`UsageStore`].
//! - [`FusionWorkflow`]: ties them together.
//!
//! # Features
//!
//! - `cli` (default): the `emoji-alchemist` command-line tool.

pub mod config;
mod error;
pub mod fusion;
pub mod usage;
mod workflow;

// Re-export error types at crate root
pub use error::{FusionError, Result, ValidationError, ValidationErrors};

pub use config::Settings;
pub use fusion::backends::{GeminiBackend, GeminiBackendBuilder};
pub use fusion::{
    FusionBackend, FusionBackendExt, FusionInput, FusionItem, FusionResult, FusionState,
    GeminiModel, ImageFormat, ItemField, RenderedPrompt, RequestBuilder,
};
pub use usage::{
    FileUsageStore, GateDecision, MemoryUsageStore, UsageGate, UsageSnapshot, UsageStore,
    DAILY_LIMIT,
};
pub use workflow::FusionWorkflow;

/// Cancellation token accepted by [`FusionWorkflow::run`].
pub use tokio_util::sync::CancellationToken;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{FusionError, Result};
    pub use crate::fusion::backends::GeminiBackend;
    pub use crate::fusion::{FusionBackend, FusionBackendExt, FusionInput, FusionItem, FusionResult};
    pub use crate::usage::{FileUsageStore, UsageGate};
    pub use crate::workflow::FusionWorkflow;
}
