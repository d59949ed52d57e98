//! # asset-sync CLI Application
//!
//! Main entry point for the asset-sync watcher. Mirrors every non-source file
//! of a project's source tree into its build output tree and keeps the two in
//! step while the project is being worked on.

use anyhow::Result;
use clap::Parser;
use colored::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use asset_sync::cli::{self, Cli, Commands};

/// Sets up logging, parses command line arguments and dispatches to the
/// matching command handler.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asset_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(e) = match cli.command {
        Commands::Watch { project, debounce_ms } => cli::watch(project, debounce_ms).await,
        Commands::Sync { project } => cli::sync_once(project).await,
        Commands::Init { project, force } => cli::init(project, force).await,
        Commands::Status { project } => cli::show_status(project).await,
    } {
        eprintln!("{} {}\n{}", "Error:".red().bold(), format!("{:#}", e).red(), "Tip: Run with --help for usage information.".yellow());
        std::process::exit(1);
    }
    Ok(())
}
