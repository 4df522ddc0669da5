//! Command-line entrypoint that runs the study guide pipeline on a local document.
//!
//! Shares configuration with the HTTP server but bypasses the upload area: the document is read
//! straight from the given path and the HTML is written to stdout or `--output`.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use studyguide::{config, logging, processing::StudyGuideService};

#[derive(Parser)]
#[command(
    name = "studyguide-cli",
    about = "Generate an HTML study guide from a PDF document"
)]
struct Cli {
    /// Path of the PDF to process.
    input: PathBuf,
    /// Write the generated HTML here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Suppress console logging; logs still go to the log file.
    #[arg(long, short)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing_with_console(!cli.quiet);
    config::init_config();

    let service = StudyGuideService::from_config(config::get_config())
        .context("failed to initialize study guide service")?;
    let guide = service
        .pipeline()
        .run(&cli.input)
        .await
        .with_context(|| format!("failed to generate study guide for {}", cli.input.display()))?;

    tracing::info!(
        strategy = ?guide.strategy,
        chunks = guide.chunk_count,
        failed_chunks = guide.failed_chunks,
        "Study guide generated"
    );

    match cli.output {
        Some(path) => tokio::fs::write(&path, guide.html.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", guide.html),
    }
    Ok(())
}
