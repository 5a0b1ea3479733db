//! Timestamped backups guarding destructive file writes.
//!
//! Layout under the backup directory:
//!
//! ```text
//! <backup_dir>/
//!   backups.json                      (index of BackupInfo records)
//!   TODO.md.20260806T101530123Z.bak   (one copy per backup)
//! ```
//!
//! Backups beyond `max_backups` are pruned oldest-first, index and file
//! together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use taskbridge_core::fsio::FileSystem;
use taskbridge_core::types::BackupInfo;

use crate::error::{io_err, SyncError};

pub struct BackupManager {
    dir: PathBuf,
    max_backups: usize,
    fs: Arc<dyn FileSystem>,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: dir.into(),
            max_backups,
            fs,
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("backups.json")
    }

    /// Copy `source` into the backup dir. Returns `None` when the source
    /// does not exist (nothing to protect yet).
    pub async fn create(
        &self,
        source: &Path,
        reason: &str,
    ) -> Result<Option<BackupInfo>, SyncError> {
        if !self.fs.exists(source).await {
            tracing::debug!(source = %source.display(), "no file to back up yet");
            return Ok(None);
        }
        let content = self
            .fs
            .read_to_string(source)
            .await
            .map_err(|e| io_err(source, e))?;

        let created_at = Utc::now();
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let backup_path = self.dir.join(format!(
            "{file_name}.{}.bak",
            created_at.format("%Y%m%dT%H%M%S%3fZ")
        ));

        self.fs
            .write(&backup_path, &content)
            .await
            .map_err(|e| io_err(&backup_path, e))?;

        let info = BackupInfo {
            id: Uuid::new_v4().to_string(),
            path: backup_path,
            created_at,
            size: content.len() as u64,
            content_hash: hex::encode(Sha256::digest(content.as_bytes())),
            reason: reason.to_string(),
        };

        let mut index = self.list().await?;
        index.push(info.clone());
        index.sort_by_key(|b| b.created_at);
        while index.len() > self.max_backups {
            let stale = index.remove(0);
            tracing::info!(path = %stale.path.display(), "pruning oldest backup");
            self.fs
                .remove(&stale.path)
                .await
                .map_err(|e| io_err(&stale.path, e))?;
        }
        self.save_index(&index).await?;

        tracing::info!(
            source = %source.display(),
            backup = %info.path.display(),
            reason,
            "backup created",
        );
        Ok(Some(info))
    }

    /// All known backups, oldest first. An absent index is an empty list.
    pub async fn list(&self) -> Result<Vec<BackupInfo>, SyncError> {
        let path = self.index_path();
        if !self.fs.exists(&path).await {
            return Ok(Vec::new());
        }
        let contents = self
            .fs
            .read_to_string(&path)
            .await
            .map_err(|e| io_err(&path, e))?;
        serde_json::from_str(&contents).map_err(|e| SyncError::State {
            path,
            message: e.to_string(),
        })
    }

    /// Restore the identified backup over `target`, verifying content
    /// integrity against the stored hash first.
    pub async fn restore(&self, id: &str, target: &Path) -> Result<BackupInfo, SyncError> {
        let index = self.list().await?;
        let info = index
            .into_iter()
            .find(|b| b.id == id)
            .ok_or_else(|| SyncError::State {
                path: self.index_path(),
                message: format!("no backup with id '{id}'"),
            })?;

        let content = self
            .fs
            .read_to_string(&info.path)
            .await
            .map_err(|e| io_err(&info.path, e))?;
        let digest = hex::encode(Sha256::digest(content.as_bytes()));
        if digest != info.content_hash {
            return Err(SyncError::State {
                path: info.path.clone(),
                message: "backup content does not match stored hash".to_string(),
            });
        }

        self.fs
            .write(target, &content)
            .await
            .map_err(|e| io_err(target, e))?;
        tracing::info!(
            backup = %info.path.display(),
            target = %target.display(),
            "backup restored",
        );
        Ok(info)
    }

    async fn save_index(&self, index: &[BackupInfo]) -> Result<(), SyncError> {
        let path = self.index_path();
        let json = serde_json::to_string_pretty(index).map_err(|e| SyncError::State {
            path: path.clone(),
            message: e.to_string(),
        })?;
        self.fs
            .write(&path, &json)
            .await
            .map_err(|e| io_err(&path, e))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
