//! Mapping between the source tree, the output tree and the backup tree.

use std::path::{Component, Path, PathBuf};

use crate::config::Layout;

/// Translates paths between the three managed roots.
///
/// All three trees share the same relative structure: `src/a/b.png` mirrors
/// to `dist/a/b.png` and is staged at `backup/a/b.png` while being
/// overwritten.
#[derive(Clone, Debug)]
pub struct PathMapper {
    src_root: PathBuf,
    dist_root: PathBuf,
    backup_root: PathBuf,
    source_extension: String,
}

impl PathMapper {
    pub fn new(layout: &Layout) -> Self {
        Self {
            src_root: layout.src.clone(),
            dist_root: layout.dist.clone(),
            backup_root: layout.backup.clone(),
            source_extension: layout.source_extension.clone(),
        }
    }

    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    pub fn dist_root(&self) -> &Path {
        &self.dist_root
    }

    /// Path relative to the source root, if `src` lives there.
    pub fn relative<'a>(&self, src: &'a Path) -> Option<&'a Path> {
        src.strip_prefix(&self.src_root).ok()
    }

    /// Absolute source path for a notification's relative file name.
    pub fn src_path(&self, relative: &Path) -> PathBuf {
        self.src_root.join(relative)
    }

    /// Absolute output path for a notification's relative file name.
    pub fn dist_path(&self, relative: &Path) -> PathBuf {
        self.dist_root.join(relative)
    }

    pub fn to_dist(&self, src: &Path) -> Option<PathBuf> {
        self.relative(src).map(|rel| self.dist_root.join(rel))
    }

    /// Reverse of [`to_dist`](Self::to_dist). `None` unless `dist` stays
    /// inside the output root, so `dist/../src/x` is refused.
    pub fn to_src(&self, dist: &Path) -> Option<PathBuf> {
        let rel = dist.strip_prefix(&self.dist_root).ok()?;
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.src_root.join(rel))
    }

    /// Staging location used to protect `src`'s mirror while it is overwritten.
    pub fn backup_slot(&self, src: &Path) -> Option<PathBuf> {
        self.relative(src).map(|rel| self.backup_root.join(rel))
    }

    pub fn in_dist(&self, path: &Path) -> bool {
        self.to_src(path).is_some()
    }

    /// Source files are compiled elsewhere and are never mirrored.
    pub fn is_excluded(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext == self.source_extension.as_str())
            .unwrap_or(false)
    }
}

/// Resolve `.` and `..` without touching the file system.
///
/// `..` at the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
