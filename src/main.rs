//! portod — Linux container supervisor daemon entrypoint.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cmd;

#[derive(Parser)]
#[command(name = "portod")]
#[command(about = "Linux container supervisor daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<cmd::Commands>,

    /// Path to configuration file
    #[arg(short, long, default_value = "portod.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// The request path is single-threaded cooperative scheduling (spec §5):
/// everything in `cmd::root::run` lives on this one current-thread runtime.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("portod={}", log_level).into()),
        )
        .init();

    info!("Starting portod v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd::Commands::CheckConfig) => {
            cmd::configure::run(&cli.config).await?;
        }
        Some(cmd::Commands::Diagnostics) => {
            cmd::diagnostics::run().await?;
        }
        None => {
            if let Err(e) = cmd::root::run(&cli.config).await {
                error!("daemon error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
