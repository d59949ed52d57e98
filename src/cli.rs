//! # Command Line Interface
//!
//! This module provides the command-line interface for asset-sync, including
//! argument parsing, command definitions, and command implementations.
//!
//! ## Commands
//!
//! - `watch` - Mirror the source tree once, then keep mirroring changes
//! - `sync` - Mirror the source tree once and exit
//! - `init` - Write a default `asset-sync.toml` to the project root
//! - `status` - Show the resolved layout and how current the output tree is

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing::info;

use crate::config::{Layout, SyncConfig, CONFIG_FILE_NAME};
use crate::entry::scan_files;
use crate::paths::PathMapper;
use crate::sync::AssetSync;
use crate::watcher::SourceWatcher;

/// Notifications buffered between the watcher thread and the sync loop
const NOTIFICATION_CAPACITY: usize = 1000;

/// Command-line interface structure for asset-sync.
#[derive(Parser)]
#[command(name = "asset-sync")]
#[command(about = "Mirror non-source assets from a source tree into a build output tree")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root containing the source and output trees
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Override the source directory (relative to the root)
    #[arg(long)]
    pub src: Option<PathBuf>,

    /// Override the output directory (relative to the root)
    #[arg(long)]
    pub dist: Option<PathBuf>,
}

/// Available CLI commands for asset-sync.
#[derive(Subcommand)]
pub enum Commands {
    /// Mirror the source tree, then watch it and mirror every change
    Watch {
        #[command(flatten)]
        project: ProjectArgs,
        /// Quiet period in milliseconds before a deletion triggers a rescan
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Mirror the source tree once and exit
    Sync {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Write a default configuration file to the project root
    Init {
        #[command(flatten)]
        project: ProjectArgs,
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the resolved layout and how many files are up to date
    Status {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

async fn load_config(project: &ProjectArgs) -> Result<SyncConfig> {
    let mut config = SyncConfig::load(&project.root)
        .await
        .with_context(|| format!("Failed to load configuration from {}", project.root.display()))?;

    if let Some(src) = &project.src {
        config.src_dir = src.clone();
    }
    if let Some(dist) = &project.dist {
        config.dist_dir = dist.clone();
    }

    Ok(config)
}

async fn load_layout(project: &ProjectArgs, debounce_ms: Option<u64>) -> Result<Layout> {
    let mut config = load_config(project).await?;
    if let Some(debounce_ms) = debounce_ms {
        config.debounce_ms = debounce_ms;
    }
    Ok(config.resolve(&project.root)?)
}

/// Mirror once, then keep the output tree in step until Ctrl+C.
pub async fn watch(project: ProjectArgs, debounce_ms: Option<u64>) -> Result<()> {
    let layout = load_layout(&project, debounce_ms).await?;
    info!(
        "Mirroring {} -> {} (debounce {:?})",
        layout.src.display(),
        layout.dist.display(),
        layout.debounce
    );

    // Subscribe before scanning so nothing changed during the scan is lost
    let (watcher, notifications) = SourceWatcher::start(&layout.src, NOTIFICATION_CAPACITY)?;
    let sync = AssetSync::new(layout);

    println!("👀 Watching {} for asset changes. Press Ctrl+C to stop.", watcher.root().display());

    tokio::select! {
        result = sync.run(notifications) => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\n🛑 Stopping asset watcher...");
        }
    }

    let mirror = sync.mirror_stats();
    info!(
        "Session totals: {} copied, {} unchanged, {} failed, {} removed; watcher {:?}",
        mirror.files_copied,
        mirror.files_skipped,
        mirror.copy_failures,
        mirror.files_removed,
        watcher.get_stats()
    );

    Ok(())
}

/// Mirror the source tree once.
pub async fn sync_once(project: ProjectArgs) -> Result<()> {
    let layout = load_layout(&project, None).await?;
    let sync = AssetSync::new(layout);

    let report = sync.initial_scan().await?;

    println!(
        "✅ Mirrored {} file(s): {} copied, {} unchanged",
        report.scanned, report.copied, report.skipped
    );
    if report.failed > 0 {
        anyhow::bail!("{} file(s) could not be copied", report.failed);
    }

    Ok(())
}

/// Write `asset-sync.toml` with default settings.
pub async fn init(project: ProjectArgs, force: bool) -> Result<()> {
    let path = project.root.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }

    let defaults = SyncConfig::default();
    let config = SyncConfig {
        src_dir: project.src.clone().unwrap_or(defaults.src_dir.clone()),
        dist_dir: project.dist.clone().unwrap_or(defaults.dist_dir.clone()),
        ..defaults
    };

    let written = config.save(&project.root).await?;
    println!("✅ Wrote {}", written.display());
    Ok(())
}

/// Counts of mirrorable files and how many of them are current.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorStatus {
    pub mirrorable: usize,
    pub up_to_date: usize,
    pub excluded: usize,
}

pub async fn collect_status(layout: &Layout) -> Result<MirrorStatus> {
    let mapper = PathMapper::new(layout);
    let mut status = MirrorStatus::default();

    for entry in scan_files(&layout.src).await? {
        let src = entry.path();
        if mapper.is_excluded(&src) {
            status.excluded += 1;
            continue;
        }
        status.mirrorable += 1;

        let Some(dist) = mapper.to_dist(&src) else { continue };
        if let Ok(meta) = tokio::fs::metadata(&dist).await {
            if meta.modified().ok() == Some(entry.modified) {
                status.up_to_date += 1;
            }
        }
    }

    Ok(status)
}

pub async fn show_status(project: ProjectArgs) -> Result<()> {
    let layout = load_layout(&project, None).await?;
    let status = collect_status(&layout).await?;

    println!("{}", "asset-sync status".bold());
    println!("  Source:   {}", layout.src.display());
    println!("  Output:   {}", layout.dist.display());
    println!("  Backup:   {}", layout.backup.display());
    println!("  Excluded: *.{} ({} file(s))", layout.source_extension, status.excluded);
    println!("  Debounce: {:?}", layout.debounce);

    let summary = format!("{}/{} file(s) up to date", status.up_to_date, status.mirrorable);
    if status.up_to_date == status.mirrorable {
        println!("  {}", summary.green());
    } else {
        println!("  {}", summary.yellow());
    }

    Ok(())
}
