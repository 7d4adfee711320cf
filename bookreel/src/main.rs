use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use bookreel::chunking::split_into_chunks;
use bookreel::config::BookreelConfig;
use bookreel::cost::CostEstimator;
use bookreel::events::LoggingEventSink;
use bookreel::observability::init_tracing;
use bookreel::pipeline::BookOrchestrator;
use bookreel::ports::TextSource;
use bookreel::providers::{default_capabilities, text_source_for};

#[derive(Parser)]
#[command(name = "bookreel")]
#[command(about = "Turn a public-domain book into a narrated, illustrated video", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Directory for intermediate and final files.
    #[arg(short, long, global = true)]
    work_dir: Option<PathBuf>,
    /// Characters per chunk.
    #[arg(long, global = true)]
    chunk_size: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a book into a video.
    Run {
        /// Book URL or local text file.
        source: String,
        /// Book title, shown in the video and used for file names.
        #[arg(short, long)]
        title: String,
    },
    /// Print the projected API cost of converting a book.
    Estimate {
        /// Book URL or local text file.
        source: String,
    },
    /// Print how a book would be chunked.
    Split {
        /// Book URL or local text file.
        source: String,
    },
}

impl Command {
    fn source(&self) -> &str {
        match self {
            Self::Run { source, .. } | Self::Estimate { source } | Self::Split { source } => source,
        }
    }
}

async fn fetch_text(config: &BookreelConfig, source: &str) -> anyhow::Result<String> {
    let text_source = text_source_for(
        source,
        Duration::from_secs(config.openai.request_timeout_secs),
    )?;
    text_source
        .fetch(source)
        .await
        .with_context(|| format!("cannot read book from {source}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let mut config = BookreelConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.work_dir {
        config = config.with_work_dir(dir);
    }
    if let Some(size) = cli.chunk_size {
        config = config.with_chunk_size(size);
    }
    config.validate()?;
    init_tracing(&config.logging)?;

    let source = cli.command.source().to_string();
    match &cli.command {
        Command::Run { title, .. } => {
            let capabilities = default_capabilities(&config, &source)?;
            let orchestrator = BookOrchestrator::from_config(
                &config,
                capabilities,
                Arc::new(LoggingEventSink::info()),
            );
            info!(source = %source, title = %title, "Starting book conversion");
            let report = orchestrator.run_from_source(&source, title).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Estimate { .. } => {
            let text = fetch_text(&config, &source).await?;
            let estimate =
                CostEstimator::new(config.prices.clone()).estimate_book(&text, config.chunk_size)?;
            println!("{}", serde_json::to_string_pretty(&estimate)?);
            println!("Estimated total: ${:.2}", estimate.total());
        }
        Command::Split { .. } => {
            let text = fetch_text(&config, &source).await?;
            let chunks = split_into_chunks(&text, config.chunk_size)?;
            for chunk in &chunks {
                let preview: String = chunk.text().chars().take(60).collect();
                println!(
                    "{:>4}  {:>6} chars  {:>5} words  {}",
                    chunk.index(),
                    chunk.char_len(),
                    chunk.word_count(),
                    preview.replace('\n', " ")
                );
            }
            println!("{} chunk(s)", chunks.len());
        }
    }

    Ok(())
}
