//! shelfscan CLI — scan a bookshelf photo through the gateway.
//!
//! Set SHELFSCAN_GATEWAY_URL to point at the scan gateway. `scan` runs the
//! full acquisition pipeline (validate, sanitize, downscale, upload) and
//! prints the detected books; `color` prints the dominant border color only.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use shelfscan_cli::{content_type_for_path, init_tracing, truncate_string};
use shelfscan_client::pipeline::{ScanHooks, ScanPipeline};
use shelfscan_client::steps::StepStatus;
use shelfscan_client::GatewayClient;
use shelfscan_core::config::DEFAULT_MAX_LONG_EDGE;
use shelfscan_core::{ErrorPresentation, ImageAsset, ScanOutcome};
use shelfscan_processing::DownscaleService;

#[derive(Parser)]
#[command(name = "shelfscan", about = "Bookshelf photo scanner CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a shelf photo and list the detected books
    Scan {
        /// Path to the photo (JPEG, PNG, WEBP, GIF, BMP, TIFF, or HEIC)
        file: std::path::PathBuf,
        /// Bound on the long edge of the uploaded image, in pixels
        #[arg(long, default_value_t = DEFAULT_MAX_LONG_EDGE)]
        max_edge: u32,
        /// Skip dominant color extraction
        #[arg(long)]
        no_color: bool,
    },
    /// Print the dominant border color of a photo
    Color {
        /// Path to the photo
        file: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan {
            file,
            max_edge,
            no_color,
        } => scan(file, max_edge, !no_color).await,
        Commands::Color { file } => color(file),
    }
}

fn read_asset(path: &std::path::Path) -> Result<ImageAsset> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("photo.jpg")
        .to_string();
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();

    let mut asset = ImageAsset::new(bytes, content_type_for_path(path), file_name);
    if let Some(modified) = modified {
        asset = asset.with_modified(modified);
    }
    Ok(asset)
}

async fn scan(file: std::path::PathBuf, max_edge: u32, extract_color: bool) -> Result<()> {
    let asset = read_asset(&file)?;
    let client = GatewayClient::from_env().map_err(|e| anyhow::anyhow!(e.user_message()))?;
    tracing::info!(gateway = client.config().base_url(), "Using gateway");

    let pipeline = ScanPipeline::new(client, DownscaleService::new())
        .with_max_long_edge(max_edge)
        .with_color_extraction(extract_color);

    let hooks = ScanHooks {
        on_progress: Some(Arc::new(|progress| {
            tracing::info!(
                progress = progress.progress,
                "{}",
                progress.message
            );
        })),
        on_step: Some(Arc::new(|key, status| {
            if status == StepStatus::Active {
                println!("... {}", key.label());
            }
        })),
        on_retry: Some(Arc::new(|mut remaining| {
            tokio::spawn(async move {
                while remaining.changed().await.is_ok() {
                    let seconds = *remaining.borrow();
                    if seconds > 0 {
                        println!("    rate limited, retrying in {}s", seconds);
                    }
                }
            });
        })),
    };

    let report = match pipeline
        .scan(asset, CancellationToken::new(), &hooks)
        .await
    {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{}", err.user_message());
            std::process::exit(1);
        }
    };

    match &report.outcome {
        ScanOutcome::Books(result) => {
            println!(
                "\nDetected {} book(s) (model: {}):",
                result.books.len(),
                result.model_used
            );
            for book in &result.books {
                let author = book.author.as_deref().unwrap_or("unknown author");
                println!("  - {} — {}", truncate_string(&book.title, 60), author);
            }
        }
        ScanOutcome::Raw(text) => {
            println!("\nGateway response:\n{}", truncate_string(text, 2000));
        }
    }

    if let Some(color) = report.dominant_color {
        println!("\nDominant background color: {}", color.to_hex());
    }
    Ok(())
}

fn color(file: std::path::PathBuf) -> Result<()> {
    let asset = read_asset(&file)?;
    match shelfscan_processing::extract_dominant_color(asset.bytes.as_ref()) {
        Some(color) => println!("{}", color.to_hex()),
        None => println!("no color available"),
    }
    Ok(())
}
