//! Relay Bot - Main entry point.

use anyhow::Result;
use clap::{Parser, Subcommand};
use relay_bot::runtime;
use relay_common::config::Config;
use relay_common::logging::init_logging;
use std::path::PathBuf;

/// Relay - sentiment analysis, dating advice and flirty replies over Telegram.
#[derive(Parser, Debug)]
#[command(name = "relay-bot")]
#[command(version)]
#[command(about = "Multi-mode conversational relay for Telegram.", long_about = None)]
struct Cli {
    /// Config file (default: ~/.relay/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Poll Telegram and answer conversations (default)
    Serve,
    /// Chat with the relay on stdin/stdout
    Cli,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);

    // Load configuration
    let config = Config::load_with_env(cli.config.as_deref())?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Relay Bot v{}", env!("CARGO_PKG_VERSION"));

    config.validate(command == Commands::Serve)?;

    match command {
        Commands::Serve => runtime::serve(&config).await,
        Commands::Cli => runtime::cli(&config).await,
    }
}
