//! # Event Classifier
//!
//! File system notifications arrive in only two kinds. `Rename` stands for a
//! creation, a deletion or either half of a move; `Change` is a content
//! modification. The classifier recovers what actually happened by probing
//! the source and output paths at the moment the notification is handled.
//!
//! The probe is best effort: the tree may change again between the
//! notification and the probe, in which case the newer state wins.

use std::path::{Path, PathBuf};

use crate::entry::Entry;
use crate::error::{Result, SyncError};
use crate::paths::PathMapper;

/// The two notification kinds the watcher reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Rename,
    Change,
}

/// A raw notification, carrying a path relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub kind: NotificationKind,
    pub filename: Option<PathBuf>,
}

impl ChangeNotification {
    pub fn rename(filename: impl Into<PathBuf>) -> Self {
        Self {
            kind: NotificationKind::Rename,
            filename: Some(filename.into()),
        }
    }

    pub fn change(filename: impl Into<PathBuf>) -> Self {
        Self {
            kind: NotificationKind::Change,
            filename: Some(filename.into()),
        }
    }
}

/// Why a notification led to no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoFilename,
    SourceExtension,
    Directory,
    /// Neither or both paths exist, or the source vanished before the probe
    Ambiguous,
}

/// What a notification turned out to mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Ignore(IgnoreReason),
    /// A whole output directory lost its source
    RemoveDir { src: PathBuf, dist: PathBuf },
    /// A file lost its source; may be the first half of a move
    Delete { src: PathBuf, dist: PathBuf },
    /// A new file appeared in the source tree
    Create(Entry),
    /// An existing source file was modified
    Change(Entry),
    /// A directory appeared in the source tree; its files are picked up by
    /// later notifications or the reconciliation rescan
    CreateDir,
}

impl Action {
    /// Creations supersede a pending reconciliation rescan.
    pub fn is_creation(&self) -> bool {
        matches!(self, Action::Create(_) | Action::CreateDir)
    }
}

pub struct EventClassifier {
    mapper: PathMapper,
}

impl EventClassifier {
    pub fn new(mapper: PathMapper) -> Self {
        Self { mapper }
    }

    pub async fn classify(&self, notification: &ChangeNotification) -> Result<Action> {
        let relative = match notification.filename.as_deref() {
            Some(name) if !name.as_os_str().is_empty() => name,
            _ => return Ok(Action::Ignore(IgnoreReason::NoFilename)),
        };

        let src = self.mapper.src_path(relative);
        let dist = self.mapper.dist_path(relative);

        if self.mapper.is_excluded(&src) {
            return Ok(Action::Ignore(IgnoreReason::SourceExtension));
        }

        match notification.kind {
            NotificationKind::Rename => self.classify_rename(src, dist).await,
            NotificationKind::Change => Ok(match Entry::probe(&src).await? {
                Some(entry) if entry.is_dir => Action::Ignore(IgnoreReason::Directory),
                Some(entry) => Action::Change(entry),
                None => Action::Ignore(IgnoreReason::Ambiguous),
            }),
        }
    }

    async fn classify_rename(&self, src: PathBuf, dist: PathBuf) -> Result<Action> {
        let dist_meta = metadata(&dist).await?;
        let src_entry = Entry::probe(&src).await?;

        Ok(match (dist_meta, src_entry) {
            (Some(meta), None) if meta.is_dir() => Action::RemoveDir { src, dist },
            (Some(_), None) => Action::Delete { src, dist },
            (None, Some(entry)) if entry.is_dir => Action::CreateDir,
            (None, Some(entry)) => Action::Create(entry),
            _ => Action::Ignore(IgnoreReason::Ambiguous),
        })
    }
}

async fn metadata(path: &Path) -> Result<Option<std::fs::Metadata>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::io(path, e)),
    }
}
