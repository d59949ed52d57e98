//! Registry of source paths already mirrored during this run.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// In-memory record of source paths whose mirror is believed current.
///
/// Rebuilt from scratch on every run. Kept up to date by every successful
/// copy and removal so the reconciliation rescan can skip what it lists.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashSet<PathBuf>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the path was not registered before.
    pub fn insert(&self, src: &Path) -> bool {
        self.entries.write().insert(src.to_path_buf())
    }

    pub fn remove(&self, src: &Path) -> bool {
        self.entries.write().remove(src)
    }

    /// Drop every path at or below `dir`. Returns how many were dropped.
    pub fn remove_under(&self, dir: &Path) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|path| !path.starts_with(dir));
        before - entries.len()
    }

    pub fn contains(&self, src: &Path) -> bool {
        self.entries.read().contains(src)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Sorted copy of the registered paths.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.read().iter().cloned().collect();
        paths.sort();
        paths
    }
}
