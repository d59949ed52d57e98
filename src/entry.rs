//! File entries under the source tree and the recursive scan that finds them.

use std::ffi::OsString;
use std::fs::Metadata;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::SystemTime;

use crate::error::{Result, SyncError};

/// A file system object under the source root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub name: OsString,
    /// Containing directory
    pub dir: PathBuf,
    pub modified: SystemTime,
    pub is_dir: bool,
}

impl Entry {
    /// Build an entry for `path` from metadata that was already fetched.
    ///
    /// Returns `None` for paths without a final component (`/`, `..`).
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Option<Self> {
        let name = path.file_name()?.to_os_string();
        let dir = path.parent()?.to_path_buf();
        // Platforms without mtime support report the epoch, which never
        // matches a real destination timestamp.
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        Some(Self {
            name,
            dir,
            modified,
            is_dir: metadata.is_dir(),
        })
    }

    /// Stat `path` and build its entry. `Ok(None)` when the path is gone.
    pub async fn probe(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(Self::from_metadata(path, &metadata)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// Recursively list every regular file under `root`.
///
/// Symlinks are neither followed nor reported. Entries are sorted by path so
/// scans are deterministic.
pub async fn scan_files(root: &Path) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    walk(root, &mut entries).await?;
    entries.sort_by_key(|entry| entry.path());
    Ok(entries)
}

fn walk<'a>(
    dir: &'a Path,
    out: &'a mut Vec<Entry>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut read_dir = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| SyncError::io(dir, e))?;

        while let Some(item) = read_dir
            .next_entry()
            .await
            .map_err(|e| SyncError::io(dir, e))?
        {
            let path = item.path();
            let metadata = match item.metadata().await {
                Ok(metadata) => metadata,
                // Removed between listing and stat
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(SyncError::io(&path, e)),
            };

            if metadata.is_dir() {
                walk(&path, out).await?;
            } else if metadata.is_file() {
                if let Some(entry) = Entry::from_metadata(&path, &metadata) {
                    out.push(entry);
                }
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scan_finds_nested_files_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("assets/sub")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("assets/a.png"), b"png").unwrap();
        std::fs::write(root.join("assets/sub/b.txt"), b"txt").unwrap();

        let entries = scan_files(root).await.unwrap();
        let paths: Vec<PathBuf> = entries.iter().map(Entry::path).collect();

        assert_eq!(
            paths,
            vec![root.join("assets/a.png"), root.join("assets/sub/b.txt")]
        );
        assert!(entries.iter().all(|e| !e.is_dir));
        assert_eq!(entries[1].dir, root.join("assets/sub"));
        assert_eq!(entries[1].name, OsString::from("b.txt"));
    }

    #[tokio::test]
    async fn test_probe() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, b"data").unwrap();

        let entry = Entry::probe(&file).await.unwrap().unwrap();
        assert_eq!(entry.path(), file);
        assert!(!entry.is_dir);

        let dir_entry = Entry::probe(temp_dir.path()).await.unwrap().unwrap();
        assert!(dir_entry.is_dir);

        assert!(Entry::probe(&temp_dir.path().join("missing")).await.unwrap().is_none());
    }
}
