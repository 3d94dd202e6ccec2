//! Sleuth CLI: HTTP gateway and one-shot research from the terminal.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Sleuth: web-grounded research answers with live progress
#[derive(Parser, Debug)]
#[command(name = "sleuth", version, about, long_about = None)]
pub(crate) struct Cli {
    /// LLM model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Serve the research API over HTTP
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Allow cross-origin browser requests
        #[arg(long)]
        cors: bool,
    },
    /// Research a query and print the synthesized answer
    Research {
        /// The question to research
        query: String,
        /// Minimum relevance score (0-100) for a finding to be kept
        #[arg(short, long)]
        threshold: Option<u32>,
        /// Skip format detection and use plain synthesis
        #[arg(long)]
        no_format: bool,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a follow-up question about earlier research
    Followup {
        /// The follow-up question
        question: String,
        /// Earlier research text, or @path to read it from a file
        #[arg(short, long)]
        context: String,
        /// Print the full answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Show the merged configuration
    Show,
    /// Print configuration warnings
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "sleuth", "sleuth")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "sleuth.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = sleuth_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    commands::handle_command(cli.command, config, cli.quiet).await
}
