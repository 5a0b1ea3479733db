//! Base-version store — the common ancestors for three-way merge.
//!
//! Persists a JSON document through the injected [`FileSystem`]:
//! `<state_dir>/base_versions.json`. Base versions are rewritten after every
//! successful sync (when three-way merge is on) and never mutated
//! mid-merge. The document also carries the last-synced content hash so the
//! identical-content fast path survives a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskbridge_core::fsio::FileSystem;
use taskbridge_core::types::{Task, TaskId};

use crate::error::{io_err, SyncError};

/// On-disk payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaseVersionFile {
    pub synced_at: DateTime<Utc>,
    /// Last-synced snapshot per task id.
    pub tasks: HashMap<String, Task>,
    /// SHA-256 of the document content as of the last successful sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_content_hash: Option<String>,
}

impl BaseVersionFile {
    pub fn empty() -> Self {
        Self {
            synced_at: Utc::now(),
            tasks: HashMap::new(),
            last_content_hash: None,
        }
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(&id.0)
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.id.0.clone(), task);
    }

    pub fn remove(&mut self, id: &TaskId) {
        self.tasks.remove(&id.0);
    }
}

/// Loads and saves the base-version document.
pub struct BaseVersionStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl BaseVersionStore {
    /// `<state_dir>/base_versions.json`
    pub fn new(state_dir: &Path, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: state_dir.join("base_versions.json"),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document; an absent file yields an empty store.
    pub async fn load(&self) -> Result<BaseVersionFile, SyncError> {
        if !self.fs.exists(&self.path).await {
            return Ok(BaseVersionFile::empty());
        }
        let contents = self
            .fs
            .read_to_string(&self.path)
            .await
            .map_err(|e| io_err(&self.path, e))?;
        serde_json::from_str(&contents).map_err(|e| SyncError::State {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Persist the document (atomic tmp+rename via the filesystem impl).
    pub async fn save(&self, file: &BaseVersionFile) -> Result<(), SyncError> {
        let json = serde_json::to_string_pretty(file).map_err(|e| SyncError::State {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        self.fs
            .write(&self.path, &json)
            .await
            .map_err(|e| io_err(&self.path, e))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use taskbridge_core::fsio::InMemoryFileSystem;

    #[tokio::test]
    async fn empty_store_when_file_missing() {
        let fs = Arc::new(InMemoryFileSystem::new());
        let store = BaseVersionStore::new(Path::new("/state"), fs);
        let loaded = store.load().await.expect("load");
        assert!(loaded.tasks.is_empty());
        assert!(loaded.last_content_hash.is_none());
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let fs = Arc::new(InMemoryFileSystem::new());
        let store = BaseVersionStore::new(Path::new("/state"), fs);

        let mut file = BaseVersionFile::empty();
        file.insert(Task::new("t-1", "keep me"));
        file.last_content_hash = Some("deadbeef".to_string());

        store.save(&file).await.expect("save");
        let loaded = store.load().await.expect("load");
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(
            loaded.get(&TaskId::from("t-1")).expect("task").title,
            "keep me"
        );
        assert_eq!(loaded.last_content_hash.as_deref(), Some("deadbeef"));
    }

    #[tokio::test]
    async fn corrupt_document_surfaces_state_error() {
        let fs = Arc::new(InMemoryFileSystem::with_file("/state/base_versions.json", "{ not json").await);
        let store = BaseVersionStore::new(Path::new("/state"), fs);
        assert!(matches!(
            store.load().await,
            Err(SyncError::State { .. })
        ));
    }

    #[test]
    fn insert_and_remove_by_id() {
        let mut file = BaseVersionFile::empty();
        file.insert(Task::new("t-1", "a"));
        assert!(file.get(&TaskId::from("t-1")).is_some());
        file.remove(&TaskId::from("t-1"));
        assert!(file.get(&TaskId::from("t-1")).is_none());
    }
}
