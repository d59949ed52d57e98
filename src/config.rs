//! # Configuration Management
//!
//! This module handles asset-sync's configuration, including:
//! - The optional `asset-sync.toml` file at the project root
//! - Default locations for the source, output and backup trees
//! - Resolution of those locations into an absolute [`Layout`]
//!
//! Every field has a default, so a project without a config file mirrors
//! `src/` into `dist/` and stages backups under `node_modules/.backup/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::paths::normalize;

/// File name looked up at the project root.
pub const CONFIG_FILE_NAME: &str = "asset-sync.toml";

/// User-facing configuration, as stored in `asset-sync.toml`.
///
/// Directory fields are relative to the project root unless absolute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub src_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// Files with this extension are treated as sources and never mirrored
    pub source_extension: String,
    /// Quiet period before a deletion triggers a reconciliation rescan
    pub debounce_ms: u64,

    #[serde(skip)]
    pub config_file_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("src"),
            dist_dir: PathBuf::from("dist"),
            backup_dir: PathBuf::from("node_modules").join(".backup"),
            source_extension: "ts".to_string(),
            debounce_ms: 100,
            config_file_path: None,
        }
    }
}

/// Absolute locations and tunables the synchronizer runs with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub src: PathBuf,
    pub dist: PathBuf,
    pub backup: PathBuf,
    pub source_extension: String,
    pub debounce: Duration,
}

impl SyncConfig {
    /// Load `asset-sync.toml` from `root`, falling back to defaults when the
    /// file does not exist.
    pub async fn load(root: &Path) -> Result<Self> {
        let config_file = root.join(CONFIG_FILE_NAME);

        if !config_file.exists() {
            return Ok(Self {
                config_file_path: Some(config_file),
                ..Self::default()
            });
        }

        let content = tokio::fs::read_to_string(&config_file)
            .await
            .map_err(|e| SyncError::io(&config_file, e))?;
        let mut config: SyncConfig = toml::from_str(&content).map_err(|e| SyncError::Config {
            path: config_file.clone(),
            message: e.to_string(),
        })?;
        config.config_file_path = Some(config_file);

        Ok(config)
    }

    /// Write the configuration next to the project root it was loaded from.
    pub async fn save(&self, root: &Path) -> Result<PathBuf> {
        let path = self
            .config_file_path
            .clone()
            .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
        let content = toml::to_string_pretty(self).map_err(|e| SyncError::Config {
            path: path.clone(),
            message: e.to_string(),
        })?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| SyncError::io(&path, e))?;
        Ok(path)
    }

    /// Resolve the configured directories against `root` and validate them.
    pub fn resolve(&self, root: &Path) -> Result<Layout> {
        let root = std::path::absolute(root).map_err(|e| SyncError::io(root, e))?;
        let root = normalize(&root);
        let src = normalize(&root.join(&self.src_dir));
        let dist = normalize(&root.join(&self.dist_dir));
        let backup = normalize(&root.join(&self.backup_dir));

        if !src.is_dir() {
            return Err(SyncError::InvalidLayout {
                message: format!("source directory {} does not exist", src.display()),
            });
        }

        // The three trees must be disjoint: writes into the watched tree would
        // feed our own output back to us, and the output tree is pruned.
        let dirs = [("source", &src), ("output", &dist), ("backup", &backup)];
        for (label, dir) in dirs {
            for (other_label, other) in dirs {
                if label != other_label && dir.starts_with(other) {
                    return Err(SyncError::InvalidLayout {
                        message: format!(
                            "{} directory {} is inside the {} directory {}",
                            label,
                            dir.display(),
                            other_label,
                            other.display()
                        ),
                    });
                }
            }
        }

        let source_extension = self.source_extension.trim_start_matches('.').to_string();
        if source_extension.is_empty() {
            return Err(SyncError::InvalidLayout {
                message: "source_extension must not be empty".to_string(),
            });
        }

        Ok(Layout {
            root,
            src,
            dist,
            backup,
            source_extension,
            debounce: Duration::from_millis(self.debounce_ms),
        })
    }
}
