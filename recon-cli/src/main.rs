//! Recon CLI
//!
//! Command-line interface for running reconciliation pipelines locally and
//! for interacting with the Recon server.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "recon")]
#[command(about = "Migration reconciliation CLI", long_about = None)]
struct Cli {
    /// Recon server URL
    #[arg(long, env = "RECON_SERVER_URL", default_value = "http://localhost:8080")]
    server_url: String,

    /// Source system connection URL (local runs)
    #[arg(long, env = "RECON_SOURCE_URL")]
    source_url: Option<String>,

    /// Target system connection URL (local runs)
    #[arg(long, env = "RECON_TARGET_URL")]
    target_url: Option<String>,

    /// Log engine progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "recon=debug" } else { "recon=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config {
        server_url: cli.server_url,
        source_url: cli.source_url,
        target_url: cli.target_url,
    };

    handle_command(cli.command, &config).await
}
