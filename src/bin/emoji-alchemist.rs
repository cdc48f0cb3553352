//! CLI for Emoji Alchemist - fuse two emojis into a new one.

use clap::{Args, Parser, Subcommand};
use emoji_alchemist::{
    CancellationToken, FileUsageStore, FusionBackend, FusionError, FusionInput, FusionItem,
    FusionWorkflow, GeminiModel, Settings, UsageGate,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emoji-alchemist")]
#[command(about = "Fuse two emojis (or images) into a brand new emoji with Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (TOML)
    #[arg(long, global = true, env = "EMOJI_ALCHEMIST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse two emojis into a new one
    Fuse(FuseArgs),

    /// Show (or reset) today's usage
    Usage(UsageArgs),

    /// Check that the API key and model are valid
    Check,
}

#[derive(Args)]
struct FuseArgs {
    /// First item: an emoji, a data: URI, or @path/to/image
    #[arg(default_value = "🚀")]
    first: String,

    /// Second item: an emoji, a data: URI, or @path/to/image
    #[arg(default_value = "🐸")]
    second: String,

    /// Output file path (default: fused-emoji.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Model to use (overrides config)
    #[arg(short, long)]
    model: Option<GeminiModel>,
}

#[derive(Args)]
struct UsageArgs {
    /// Reset today's count
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Fuse(args) => fuse(args, settings, cli.json).await?,
        Commands::Usage(args) => usage(args, &settings, cli.json)?,
        Commands::Check => check(&settings, cli.json).await?,
    }

    Ok(())
}

/// Interprets a CLI argument as a fusion item.
fn parse_item(arg: &str) -> anyhow::Result<FusionItem> {
    if arg.starts_with("data:") {
        return Ok(FusionItem::data_uri(arg));
    }
    if let Some(path) = arg.strip_prefix('@') {
        return FusionItem::from_image_file(path)
            .map_err(|e| anyhow::anyhow!("cannot read image {path}: {e}"));
    }
    Ok(FusionItem::emoji(arg))
}

async fn fuse(args: FuseArgs, mut settings: Settings, json_output: bool) -> anyhow::Result<()> {
    if let Some(model) = args.model {
        settings.model = model;
    }

    let input = FusionInput::new(parse_item(&args.first)?, parse_item(&args.second)?);

    let backend = settings.backend_builder().build()?;
    let gate = UsageGate::new(FileUsageStore::new(&settings.usage_file));
    let mut workflow =
        FusionWorkflow::new(backend, gate).with_builder(settings.request_builder());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    if !json_output {
        eprintln!("Fusing...");
    }

    let result = match workflow.run(&input, &cancel).await {
        Ok(result) => result,
        Err(FusionError::Validation(errors)) if json_output => {
            let fields: Vec<_> = errors
                .iter()
                .map(|e| serde_json::json!({ "field": e.field, "reason": e.reason }))
                .collect();
            let out = serde_json::json!({ "success": false, "error": "validation", "fields": fields });
            println!("{}", serde_json::to_string_pretty(&out)?);
            std::process::exit(2);
        }
        Err(e) if json_output => {
            let out = serde_json::json!({
                "success": false,
                "error": e.to_string(),
                "retryable": e.is_retryable(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            std::process::exit(1);
        }
        Err(e) => return Err(describe_failure(e)),
    };

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("fused-emoji.{}", result.extension())));
    result.save(&output)?;

    let snapshot = workflow.gate().snapshot(emoji_alchemist::usage::local_today())?;

    if json_output {
        let out = serde_json::json!({
            "success": true,
            "output": output.display().to_string(),
            "mime_type": result.mime_type,
            "data_uri": result.to_data_uri(),
            "model": result.model,
            "duration_ms": result.duration_ms,
            "commentary": result.commentary,
            "remaining_today": snapshot.remaining(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Fused emoji saved to {}", output.display());
        if let Some(duration) = result.duration_ms {
            println!("Duration: {}ms", duration);
        }
        println!(
            "Fusions left today: {}/{}",
            snapshot.remaining(),
            snapshot.limit
        );
    }

    Ok(())
}

/// Turns a fusion error into a user-facing message.
fn describe_failure(err: FusionError) -> anyhow::Error {
    match err {
        FusionError::Validation(errors) => {
            let lines: Vec<String> = errors.iter().map(|e| format!("  {e}")).collect();
            anyhow::anyhow!("invalid input:\n{}", lines.join("\n"))
        }
        FusionError::LimitReached { limit } => anyhow::anyhow!(
            "You've used all {limit} fusions for today. Come back tomorrow, or run `emoji-alchemist usage --reset`."
        ),
        FusionError::SafetyBlocked(msg) => {
            anyhow::anyhow!("The model refused this pair ({msg}). Try different emojis.")
        }
        FusionError::Cancelled => anyhow::anyhow!("Cancelled."),
        e if e.is_retryable() => {
            anyhow::anyhow!("We couldn't generate your emoji ({e}). Please try again.")
        }
        e => anyhow::Error::new(e),
    }
}

fn usage(args: UsageArgs, settings: &Settings, json_output: bool) -> anyhow::Result<()> {
    let gate = UsageGate::new(FileUsageStore::new(&settings.usage_file));
    let today = emoji_alchemist::usage::local_today();

    if args.reset {
        gate.reset(today)?;
    }
    let snapshot = gate.snapshot(today)?;

    if json_output {
        let out = serde_json::json!({
            "date": snapshot.date.to_string(),
            "count": snapshot.count,
            "limit": snapshot.limit,
            "remaining": snapshot.remaining(),
            "store": settings.usage_file.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "{}: {} of {} fusions used, {} left",
            snapshot.date,
            snapshot.count,
            snapshot.limit,
            snapshot.remaining()
        );
    }

    Ok(())
}

async fn check(settings: &Settings, json_output: bool) -> anyhow::Result<()> {
    let backend = settings.backend_builder().build()?;
    let outcome = backend.health_check().await;

    if json_output {
        let out = serde_json::json!({
            "backend": backend.name(),
            "model": settings.model.as_str(),
            "ok": outcome.is_ok(),
            "error": outcome.as_ref().err().map(ToString::to_string),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    outcome?;
    println!("✓ {} ({}) is reachable", backend.name(), settings.model);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_emoji() {
        assert_eq!(parse_item("🚀").unwrap(), FusionItem::emoji("🚀"));
    }

    #[test]
    fn test_parse_item_data_uri() {
        let uri = "data:image/png;base64,iVBORw0KGgo=";
        assert_eq!(parse_item(uri).unwrap(), FusionItem::data_uri(uri));
    }

    #[test]
    fn test_parse_item_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dog.gif");
        std::fs::write(&path, b"GIF89a\x01\x00\x01\x00").unwrap();

        let item = parse_item(&format!("@{}", path.display())).unwrap();
        let FusionItem::Image(uri) = item else {
            panic!("expected image item");
        };
        assert!(uri.starts_with("data:image/gif;base64,"));
    }

    #[test]
    fn test_parse_item_missing_file() {
        assert!(parse_item("@/nonexistent/dog.png").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["emoji-alchemist", "fuse"]).unwrap();
        let Commands::Fuse(args) = cli.command else {
            panic!("expected fuse");
        };
        assert_eq!(args.first, "🚀");
        assert_eq!(args.second, "🐸");
        assert!(args.model.is_none());
    }

    #[test]
    fn test_cli_model_flag() {
        let cli =
            Cli::try_parse_from(["emoji-alchemist", "fuse", "🐶", "🍩", "--model", "flash"])
                .unwrap();
        let Commands::Fuse(args) = cli.command else {
            panic!("expected fuse");
        };
        assert_eq!(args.model, Some(GeminiModel::FlashImage));
    }
}
