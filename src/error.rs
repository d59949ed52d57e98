//! Error types for asset-sync

use std::path::PathBuf;

/// Result type for asset-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while mirroring a source tree
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Failed to parse config at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Path {path} is not inside {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Invalid layout: {message}")]
    InvalidLayout { message: String },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
