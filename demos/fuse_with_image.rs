//! Fuses an uploaded image with an emoji.
//!
//! Run with: `cargo run --example fuse_with_image -- <dog.png> 🍩`
//!
//! Requires `GOOGLE_API_KEY` environment variable.

use emoji_alchemist::{
    FusionError, FusionInput, FusionItem, FusionWorkflow, GeminiBackend, MemoryUsageStore,
    UsageGate,
};

#[tokio::main]
async fn main() -> emoji_alchemist::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(image_path) = args.next() else {
        eprintln!("Usage: fuse_with_image <image.png|jpg|gif> [emoji]");
        std::process::exit(1);
    };
    let emoji = args.next().unwrap_or_else(|| "🍩".to_string());

    let input = FusionInput::new(
        FusionItem::from_image_file(&image_path)?,
        FusionItem::emoji(emoji),
    );

    let backend = GeminiBackend::builder().build()?;
    let mut workflow = FusionWorkflow::new(backend, UsageGate::new(MemoryUsageStore::new()));

    match workflow.fuse(&input).await {
        Ok(fused) => {
            fused.save("fused-emoji.png")?;
            println!("Saved fused-emoji.png");
        }
        Err(FusionError::Validation(errors)) => {
            for e in errors.iter() {
                eprintln!("{e}");
            }
        }
        Err(e) => return Err(e),
    }

    Ok(())
}
