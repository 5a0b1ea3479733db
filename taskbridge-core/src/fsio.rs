//! The injected filesystem interface.
//!
//! ## Write protocol
//!
//! [`RealFileSystem::write`] follows the atomic pattern used everywhere in
//! this workspace: write to `<path>.taskbridge.tmp`, then rename over the
//! final path (atomic on POSIX). A failed rename removes the tmp file and
//! leaves the original untouched.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// File metadata the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Minimal async filesystem surface, injectable for testing.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Atomically replace `path` with `contents`, creating parents as needed.
    async fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    async fn metadata(&self, path: &Path) -> io::Result<FileMeta>;

    async fn exists(&self, path: &Path) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// Real filesystem
// ---------------------------------------------------------------------------

/// `tokio::fs`-backed implementation.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

#[async_trait]
impl FileSystem for RealFileSystem {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = PathBuf::from(format!("{}.taskbridge.tmp", path.display()));
        tokio::fs::write(&tmp, contents).await?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err);
        }
        Ok(())
    }

    async fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(FileMeta {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory filesystem
// ---------------------------------------------------------------------------

/// A `HashMap`-backed filesystem for tests.
#[derive(Debug, Default)]
pub struct InMemoryFileSystem {
    files: RwLock<HashMap<PathBuf, (String, SystemTime)>>,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::new();
        fs.put(path, contents).await;
        fs
    }

    /// Insert or replace a file without going through the trait.
    pub async fn put(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files
            .write()
            .await
            .insert(path.into(), (contents.into(), SystemTime::now()));
    }

    /// Snapshot of every stored path, for assertions.
    pub async fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl FileSystem for InMemoryFileSystem {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .read()
            .await
            .get(path)
            .map(|(contents, _)| contents.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.files
            .write()
            .await
            .insert(path.to_path_buf(), (contents.to_string(), SystemTime::now()));
        Ok(())
    }

    async fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        self.files
            .read()
            .await
            .get(path)
            .map(|(contents, modified)| FileMeta {
                len: contents.len() as u64,
                modified: Some(*modified),
            })
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files.read().await.contains_key(path)
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.files.write().await.remove(path);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn real_fs_roundtrip_and_tmp_cleanup() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("TODO.md");
        let fs = RealFileSystem;

        fs.write(&path, "- [ ] hello\n").await.expect("write");
        assert_eq!(
            fs.read_to_string(&path).await.expect("read"),
            "- [ ] hello\n"
        );

        let tmp = PathBuf::from(format!("{}.taskbridge.tmp", path.display()));
        assert!(!tmp.exists(), "tmp file must be cleaned up after rename");

        let meta = fs.metadata(&path).await.expect("metadata");
        assert_eq!(meta.len, 12);
        assert!(fs.exists(&path).await);
    }

    #[tokio::test]
    async fn in_memory_fs_behaves_like_a_filesystem() {
        let fs = InMemoryFileSystem::with_file("/x/TODO.md", "content").await;
        assert!(fs.exists(Path::new("/x/TODO.md")).await);
        assert_eq!(
            fs.read_to_string(Path::new("/x/TODO.md"))
                .await
                .expect("read"),
            "content"
        );

        let err = fs
            .read_to_string(Path::new("/missing"))
            .await
            .expect_err("missing file");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        fs.remove(Path::new("/x/TODO.md")).await.expect("remove");
        assert!(!fs.exists(Path::new("/x/TODO.md")).await);
        assert!(fs.paths().await.is_empty());
    }
}
