//! Basic emoji fusion example.
//!
//! Run with: `cargo run --example fuse_emojis -- 🐶 🍩`
//!
//! Requires `GOOGLE_API_KEY` environment variable.

use emoji_alchemist::{FusionInput, FusionWorkflow, GeminiBackend, MemoryUsageStore, UsageGate};

#[tokio::main]
async fn main() -> emoji_alchemist::Result<()> {
    let mut args = std::env::args().skip(1);
    let first = args.next().unwrap_or_else(|| "🚀".to_string());
    let second = args.next().unwrap_or_else(|| "🐸".to_string());

    let backend = GeminiBackend::builder().build()?;
    let mut workflow = FusionWorkflow::new(backend, UsageGate::new(MemoryUsageStore::new()));

    let fused = workflow.fuse(&FusionInput::emojis(&first, &second)).await?;
    let path = format!("fused-emoji.{}", fused.extension());
    fused.save(&path)?;
    println!("{first} + {second} -> {path}");

    Ok(())
}
