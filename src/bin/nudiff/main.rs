//! nudiff CLI - NuGet package API-surface extraction and diffing

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("nudiff=debug")
    } else {
        EnvFilter::new("nudiff=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    // Ctrl-C cancels in-flight downloads and module parsing.
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let config = cli.config;
    match cli.command {
        Commands::Surface(args) => commands::surface::execute(args, config.as_deref(), &cancel).await,
        Commands::Diff(args) => commands::diff::execute(args, config.as_deref(), &cancel).await,
        Commands::Decompile(args) => {
            commands::decompile::execute(args, config.as_deref(), &cancel).await
        }
    }
}
