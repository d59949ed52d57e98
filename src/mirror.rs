//! # Mirror Writer
//!
//! Copies single files from the source tree into the output tree and removes
//! them again when their source disappears.
//!
//! ## Overwrite protocol
//!
//! An existing output file whose modification time differs from its source is
//! first staged into the backup tree. The source is then copied over it:
//!
//! - on success the staged copy is deleted
//! - on failure the staged copy is put back and then deleted; if putting it
//!   back fails too, it stays in the backup tree
//!
//! Copy failures are logged and reported as [`CopyOutcome::Failed`]; they never
//! abort the caller. After a successful copy the output file receives the
//! source's modification time, which is what lets the next copy of an
//! unchanged file become a no-op.

use async_trait::async_trait;
use filetime::FileTime;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

use crate::entry::Entry;
use crate::error::{Result, SyncError};
use crate::paths::PathMapper;
use crate::registry::Registry;

/// Byte-level copy primitive used for every copy the writer performs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileCopier: Send + Sync {
    async fn copy(&self, from: &Path, to: &Path) -> std::io::Result<u64>;
}

/// Copies through `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCopier;

#[async_trait]
impl FileCopier for TokioCopier {
    async fn copy(&self, from: &Path, to: &Path) -> std::io::Result<u64> {
        tokio::fs::copy(from, to).await
    }
}

/// Result of [`MirrorWriter::copy_to_dist`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Output already carries the source's modification time
    Skipped,
    Copied,
    /// The copy failed; any previous output was restored
    Failed,
}

/// Result of [`MirrorWriter::remove_from_dist`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Refused: the path is not inside the output tree
    OutsideDist,
    Missing,
    Removed { pruned_parent: bool },
}

/// Counters for the writer's activity since startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub files_copied: u64,
    pub files_skipped: u64,
    pub copy_failures: u64,
    pub files_removed: u64,
    pub dirs_pruned: u64,
}

pub struct MirrorWriter {
    mapper: PathMapper,
    registry: Arc<Registry>,
    copier: Arc<dyn FileCopier>,
    stats: RwLock<MirrorStats>,
}

impl MirrorWriter {
    pub fn new(mapper: PathMapper, registry: Arc<Registry>) -> Self {
        Self::with_copier(mapper, registry, Arc::new(TokioCopier))
    }

    pub fn with_copier(
        mapper: PathMapper,
        registry: Arc<Registry>,
        copier: Arc<dyn FileCopier>,
    ) -> Self {
        Self {
            mapper,
            registry,
            copier,
            stats: RwLock::new(MirrorStats::default()),
        }
    }

    pub fn stats(&self) -> MirrorStats {
        self.stats.read().clone()
    }

    /// Mirror one source file into the output tree.
    ///
    /// `Err` is only returned when the copy could not be attempted at all
    /// (source vanished, output directory not creatable, backup not
    /// writable). A failed copy itself is `Ok(CopyOutcome::Failed)`.
    pub async fn copy_to_dist(&self, entry: &Entry) -> Result<CopyOutcome> {
        let src = entry.path();
        let relative = self
            .mapper
            .relative(&src)
            .ok_or_else(|| SyncError::OutsideRoot {
                path: src.clone(),
                root: self.mapper.src_root().to_path_buf(),
            })?
            .to_path_buf();
        let dist = self.mapper.dist_path(&relative);

        if let Some(parent) = dist.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }

        let src_modified = modified(&src).await?;

        let backup = match tokio::fs::metadata(&dist).await {
            Ok(dist_meta) => {
                if dist_meta.modified().ok() == Some(src_modified) {
                    debug!("Unchanged, skipping: {}", relative.display());
                    self.registry.insert(&src);
                    self.stats.write().files_skipped += 1;
                    return Ok(CopyOutcome::Skipped);
                }
                Some(self.stage_backup(&src, &dist).await?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(SyncError::io(&dist, e)),
        };

        match self.copier.copy(&src, &dist).await {
            Ok(bytes) => {
                if let Err(e) =
                    filetime::set_file_mtime(&dist, FileTime::from_system_time(src_modified))
                {
                    warn!("Could not set modification time on {}: {}", dist.display(), e);
                }
                if let Some(backup) = backup {
                    discard(&backup).await;
                }

                self.registry.insert(&src);
                self.stats.write().files_copied += 1;
                info!("Copied {} ({} bytes)", relative.display(), bytes);
                Ok(CopyOutcome::Copied)
            }
            Err(e) => {
                error!(
                    "Couldn't copy file {} from path {} to path {}: {}",
                    entry.name.to_string_lossy(),
                    relative.parent().unwrap_or(Path::new("")).display(),
                    dist.parent().unwrap_or(&dist).display(),
                    e
                );

                if let Some(backup) = backup {
                    match self.copier.copy(&backup, &dist).await {
                        Ok(_) => discard(&backup).await,
                        // The slot now holds the only intact copy
                        Err(e) => error!(
                            "Failed to restore {} from backup, previous version kept at {}: {}",
                            dist.display(),
                            backup.display(),
                            e
                        ),
                    }
                }

                self.stats.write().copy_failures += 1;
                Ok(CopyOutcome::Failed)
            }
        }
    }

    /// Delete a mirrored file from the output tree.
    ///
    /// If that leaves its directory empty the directory goes too, one level
    /// only and never the output root itself.
    pub async fn remove_from_dist(&self, path: &Path) -> Result<RemoveOutcome> {
        if !self.mapper.in_dist(path) {
            warn!(
                "Attempted to delete {} which is not inside the output directory {}",
                path.display(),
                self.mapper.dist_root().display()
            );
            return Ok(RemoveOutcome::OutsideDist);
        }

        match tokio::fs::symlink_metadata(path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RemoveOutcome::Missing),
            Err(e) => return Err(SyncError::io(path, e)),
        }

        tokio::fs::remove_file(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        info!("Removed {}", path.display());
        self.stats.write().files_removed += 1;

        let parent = match path.parent() {
            Some(parent) if parent != self.mapper.dist_root() => parent,
            _ => return Ok(RemoveOutcome::Removed { pruned_parent: false }),
        };

        let mut siblings = tokio::fs::read_dir(parent)
            .await
            .map_err(|e| SyncError::io(parent, e))?;
        let is_empty = siblings
            .next_entry()
            .await
            .map_err(|e| SyncError::io(parent, e))?
            .is_none();

        if is_empty {
            tokio::fs::remove_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
            info!("Removed empty directory {}", parent.display());
            self.stats.write().dirs_pruned += 1;
        }

        Ok(RemoveOutcome::Removed {
            pruned_parent: is_empty,
        })
    }

    /// Recursively delete a directory of the output tree.
    pub async fn remove_dir_from_dist(&self, path: &Path) -> Result<RemoveOutcome> {
        if !self.mapper.in_dist(path) || path == self.mapper.dist_root() {
            warn!(
                "Attempted to delete directory {} which is not inside the output directory {}",
                path.display(),
                self.mapper.dist_root().display()
            );
            return Ok(RemoveOutcome::OutsideDist);
        }

        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                info!("Removed directory {}", path.display());
                Ok(RemoveOutcome::Removed {
                    pruned_parent: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RemoveOutcome::Missing),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    async fn stage_backup(&self, src: &Path, dist: &Path) -> Result<PathBuf> {
        let backup = self
            .mapper
            .backup_slot(src)
            .ok_or_else(|| SyncError::OutsideRoot {
                path: src.to_path_buf(),
                root: self.mapper.src_root().to_path_buf(),
            })?;

        if let Some(parent) = backup.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }

        self.copier
            .copy(dist, &backup)
            .await
            .map_err(|e| SyncError::io(&backup, e))?;
        debug!("Staged {} at {}", dist.display(), backup.display());

        Ok(backup)
    }
}

async fn modified(path: &Path) -> Result<SystemTime> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| SyncError::io(path, e))?;
    metadata.modified().map_err(|e| SyncError::io(path, e))
}

async fn discard(backup: &Path) {
    if let Err(e) = tokio::fs::remove_file(backup).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove backup {}: {}", backup.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        layout: Layout,
        registry: Arc<Registry>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path().to_path_buf();
            let layout = Layout {
                src: root.join("src"),
                dist: root.join("dist"),
                backup: root.join("node_modules/.backup"),
                root,
                source_extension: "ts".to_string(),
                debounce: Duration::from_millis(50),
            };
            std::fs::create_dir_all(&layout.src).unwrap();

            Self {
                _temp_dir: temp_dir,
                layout,
                registry: Arc::new(Registry::new()),
            }
        }

        fn writer(&self) -> MirrorWriter {
            MirrorWriter::new(PathMapper::new(&self.layout), self.registry.clone())
        }

        fn writer_with(&self, copier: MockFileCopier) -> MirrorWriter {
            MirrorWriter::with_copier(
                PathMapper::new(&self.layout),
                self.registry.clone(),
                Arc::new(copier),
            )
        }

        fn write_src(&self, rel: &str, content: &str) -> Entry {
            let path = self.layout.src.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            let metadata = std::fs::metadata(&path).unwrap();
            Entry::from_metadata(&path, &metadata).unwrap()
        }

        fn write_dist(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.layout.dist.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            path
        }

        fn set_mtime(&self, path: &Path, secs: i64) {
            filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
        }
    }

    #[tokio::test]
    async fn test_first_copy_creates_parents_and_registers() {
        let fx = Fixture::new();
        let entry = fx.write_src("assets/sub/b.txt", "hello");
        let writer = fx.writer();

        let outcome = writer.copy_to_dist(&entry).await.unwrap();

        assert_eq!(outcome, CopyOutcome::Copied);
        let dist = fx.layout.dist.join("assets/sub/b.txt");
        assert_eq!(std::fs::read_to_string(&dist).unwrap(), "hello");
        assert_eq!(
            std::fs::metadata(&dist).unwrap().modified().unwrap(),
            entry.modified
        );
        assert!(fx.registry.contains(&entry.path()));
        assert!(!fx.layout.backup.join("assets/sub/b.txt").exists());
    }

    #[tokio::test]
    async fn test_unchanged_file_is_not_rewritten() {
        let fx = Fixture::new();
        let entry = fx.write_src("a.png", "png");

        let mut copier = MockFileCopier::new();
        copier
            .expect_copy()
            .times(1)
            .returning(|from, to| std::fs::copy(from, to));
        let writer = fx.writer_with(copier);

        assert_eq!(writer.copy_to_dist(&entry).await.unwrap(), CopyOutcome::Copied);
        // The mock panics if a second copy of any kind is attempted
        assert_eq!(writer.copy_to_dist(&entry).await.unwrap(), CopyOutcome::Skipped);

        let stats = writer.stats();
        assert_eq!(stats.files_copied, 1);
        assert_eq!(stats.files_skipped, 1);
    }

    #[tokio::test]
    async fn test_overwrite_discards_backup() {
        let fx = Fixture::new();
        let entry = fx.write_src("a.txt", "new");
        let dist = fx.write_dist("a.txt", "old");
        fx.set_mtime(&dist, 1_000_000);

        let outcome = fx.writer().copy_to_dist(&entry).await.unwrap();

        assert_eq!(outcome, CopyOutcome::Copied);
        assert_eq!(std::fs::read_to_string(&dist).unwrap(), "new");
        assert!(!fx.layout.backup.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_failed_copy_restores_previous_output() {
        let fx = Fixture::new();
        let entry = fx.write_src("sub/a.txt", "new content");
        let dist = fx.write_dist("sub/a.txt", "previous content");
        fx.set_mtime(&dist, 1_000_000);
        let src_root = fx.layout.src.clone();

        let mut copier = MockFileCopier::new();
        copier.expect_copy().times(3).returning(move |from, to| {
            if from.starts_with(&src_root) {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            } else {
                std::fs::copy(from, to)
            }
        });
        let writer = fx.writer_with(copier);

        let outcome = writer.copy_to_dist(&entry).await.unwrap();

        assert_eq!(outcome, CopyOutcome::Failed);
        assert_eq!(std::fs::read_to_string(&dist).unwrap(), "previous content");
        assert!(!fx.layout.backup.join("sub/a.txt").exists());
        assert!(!fx.registry.contains(&entry.path()));
        assert_eq!(writer.stats().copy_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_backup() {
        let fx = Fixture::new();
        let entry = fx.write_src("sub/a.txt", "new content");
        let dist = fx.write_dist("sub/a.txt", "previous content");
        fx.set_mtime(&dist, 1_000_000);
        let dist_clone = dist.clone();

        // Every write into the output tree truncates it and then fails
        let mut copier = MockFileCopier::new();
        copier.expect_copy().times(3).returning(move |from, to| {
            if to == dist_clone.as_path() {
                std::fs::write(to, "")?;
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            } else {
                std::fs::copy(from, to)
            }
        });
        let writer = fx.writer_with(copier);

        let outcome = writer.copy_to_dist(&entry).await.unwrap();

        assert_eq!(outcome, CopyOutcome::Failed);
        assert_eq!(std::fs::read_to_string(&dist).unwrap(), "");
        assert_eq!(
            std::fs::read_to_string(fx.layout.backup.join("sub/a.txt")).unwrap(),
            "previous content"
        );
        assert!(!fx.registry.contains(&entry.path()));
        assert_eq!(writer.stats().copy_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_first_copy_has_nothing_to_restore() {
        let fx = Fixture::new();
        let entry = fx.write_src("a.txt", "content");

        let mut copier = MockFileCopier::new();
        copier
            .expect_copy()
            .times(1)
            .returning(|_, _| Err(std::io::Error::new(std::io::ErrorKind::Other, "denied")));
        let writer = fx.writer_with(copier);

        assert_eq!(writer.copy_to_dist(&entry).await.unwrap(), CopyOutcome::Failed);
        assert!(!fx.layout.backup.exists());
    }

    #[tokio::test]
    async fn test_copy_of_vanished_source_is_error() {
        let fx = Fixture::new();
        let entry = fx.write_src("gone.txt", "x");
        std::fs::remove_file(entry.path()).unwrap();

        let result = fx.writer().copy_to_dist(&entry).await;
        assert_matches!(result, Err(SyncError::Io { .. }));
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_parent() {
        let fx = Fixture::new();
        let file = fx.write_dist("assets/sub/b.txt", "b");

        let outcome = fx.writer().remove_from_dist(&file).await.unwrap();

        assert_eq!(outcome, RemoveOutcome::Removed { pruned_parent: true });
        assert!(!fx.layout.dist.join("assets/sub").exists());
        // Only one level is pruned
        assert!(fx.layout.dist.join("assets").exists());
    }

    #[tokio::test]
    async fn test_remove_keeps_parent_with_siblings() {
        let fx = Fixture::new();
        let file = fx.write_dist("assets/sub/b.txt", "b");
        fx.write_dist("assets/sub/c.txt", "c");

        let outcome = fx.writer().remove_from_dist(&file).await.unwrap();

        assert_eq!(outcome, RemoveOutcome::Removed { pruned_parent: false });
        assert!(fx.layout.dist.join("assets/sub/c.txt").exists());
    }

    #[tokio::test]
    async fn test_remove_never_prunes_dist_root() {
        let fx = Fixture::new();
        let file = fx.write_dist("only.txt", "x");

        let outcome = fx.writer().remove_from_dist(&file).await.unwrap();

        assert_eq!(outcome, RemoveOutcome::Removed { pruned_parent: false });
        assert!(fx.layout.dist.is_dir());
    }

    #[tokio::test]
    async fn test_remove_outside_dist_is_refused() {
        let fx = Fixture::new();
        let entry = fx.write_src("keep.txt", "keep");

        let outcome = fx.writer().remove_from_dist(&entry.path()).await.unwrap();

        assert_eq!(outcome, RemoveOutcome::OutsideDist);
        assert_eq!(std::fs::read_to_string(entry.path()).unwrap(), "keep");
    }

    #[tokio::test]
    async fn test_remove_escaping_dist_is_refused() {
        let fx = Fixture::new();
        let entry = fx.write_src("keep.txt", "keep");
        std::fs::create_dir_all(&fx.layout.dist).unwrap();
        let writer = fx.writer();

        let escaping = fx.layout.dist.join("../src/keep.txt");
        assert_eq!(
            writer.remove_from_dist(&escaping).await.unwrap(),
            RemoveOutcome::OutsideDist
        );
        assert_eq!(std::fs::read_to_string(entry.path()).unwrap(), "keep");
        assert!(fx.layout.src.is_dir());

        assert_eq!(
            writer
                .remove_dir_from_dist(&fx.layout.dist.join("../src"))
                .await
                .unwrap(),
            RemoveOutcome::OutsideDist
        );
        assert!(entry.path().exists());
        assert_eq!(writer.stats().files_removed, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let fx = Fixture::new();
        let outcome = fx
            .writer()
            .remove_from_dist(&fx.layout.dist.join("nothing.txt"))
            .await
            .unwrap();
        assert_eq!(outcome, RemoveOutcome::Missing);
    }

    #[tokio::test]
    async fn test_remove_dir_refuses_dist_root() {
        let fx = Fixture::new();
        fx.write_dist("a/b.txt", "b");
        let writer = fx.writer();

        assert_eq!(
            writer.remove_dir_from_dist(&fx.layout.dist).await.unwrap(),
            RemoveOutcome::OutsideDist
        );
        assert_eq!(
            writer
                .remove_dir_from_dist(&fx.layout.dist.join("a"))
                .await
                .unwrap(),
            RemoveOutcome::Removed { pruned_parent: false }
        );
        assert!(!fx.layout.dist.join("a").exists());
    }
}
