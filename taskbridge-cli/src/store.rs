//! JSON-file task store for the CLI.
//!
//! The engine treats the store as an injected dependency; this is the CLI's
//! consumer-side implementation, a `tasks.json` document loaded at startup
//! and rewritten (tmp + rename) after every mutation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use taskbridge_core::error::StoreError;
use taskbridge_core::store::{
    BatchSummary, SortKey, StoreStats, TaskBatch, TaskPage, TaskQuery, TaskStore,
};
use taskbridge_core::types::{Task, TaskId, TaskStatus};

pub struct JsonTaskStore {
    path: PathBuf,
    tasks: RwLock<HashMap<TaskId, Task>>,
    id_seq: AtomicU64,
}

impl JsonTaskStore {
    /// Load `tasks.json`, or start empty when absent.
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let tasks: HashMap<TaskId, Task> = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let list: Vec<Task> = serde_json::from_str(&contents)
                    .map_err(|e| StoreError::Backend(format!("corrupt tasks.json: {e}")))?;
                list.into_iter().map(|t| (t.id.clone(), t)).collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(StoreError::Backend(err.to_string())),
        };

        // Continue the `task-<n>` sequence past any loaded ids.
        let max_seq = tasks
            .keys()
            .filter_map(|id| id.0.strip_prefix("task-"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        Ok(Self {
            path,
            tasks: RwLock::new(tasks),
            id_seq: AtomicU64::new(max_seq),
        })
    }

    async fn persist(&self, tasks: &HashMap<TaskId, Task>) -> Result<(), StoreError> {
        let mut list: Vec<&Task> = tasks.values().collect();
        list.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        let json = serde_json::to_string_pretty(&list)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

fn sort_tasks(tasks: &mut [Task], sort: SortKey, descending: bool) {
    match sort {
        SortKey::Order => tasks.sort_by_key(|t| (t.order.unwrap_or(u32::MAX), t.created_at)),
        SortKey::Priority => tasks.sort_by_key(|t| std::cmp::Reverse(t.priority.rank())),
        SortKey::CreatedAt => tasks.sort_by_key(|t| t.created_at),
        SortKey::UpdatedAt => tasks.sort_by_key(|t| t.updated_at),
    }
    if descending {
        tasks.reverse();
    }
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn query(&self, query: TaskQuery) -> Result<TaskPage, StoreError> {
        let mut matches: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| {
                query
                    .section
                    .as_deref()
                    .map(|s| t.section.as_deref() == Some(s))
                    .unwrap_or(true)
            })
            .filter(|t| query.status.map(|s| t.status == s).unwrap_or(true))
            .cloned()
            .collect();

        sort_tasks(&mut matches, query.sort, query.descending);
        let total = matches.len();
        let tasks: Vec<Task> = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(TaskPage {
            tasks,
            total,
            offset: query.offset,
        })
    }

    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        let mut map = self.tasks.write().await;
        if map.contains_key(&task.id) {
            return Err(StoreError::Duplicate(task.id));
        }
        map.insert(task.id.clone(), task.clone());
        self.persist(&map).await?;
        Ok(task)
    }

    async fn update(&self, task: Task) -> Result<Task, StoreError> {
        let mut map = self.tasks.write().await;
        if !map.contains_key(&task.id) {
            return Err(StoreError::NotFound(task.id));
        }
        map.insert(task.id.clone(), task.clone());
        self.persist(&map).await?;
        Ok(task)
    }

    async fn delete(&self, id: &TaskId) -> Result<bool, StoreError> {
        let mut map = self.tasks.write().await;
        let existed = map.remove(id).is_some();
        if existed {
            self.persist(&map).await?;
        }
        Ok(existed)
    }

    async fn apply_batch(&self, batch: TaskBatch) -> Result<BatchSummary, StoreError> {
        let mut map = self.tasks.write().await;

        for task in &batch.create {
            if map.contains_key(&task.id) {
                return Err(StoreError::Duplicate(task.id.clone()));
            }
        }
        for task in &batch.update {
            if !map.contains_key(&task.id) {
                return Err(StoreError::NotFound(task.id.clone()));
            }
        }
        for id in &batch.delete {
            if !map.contains_key(id) {
                return Err(StoreError::NotFound(id.clone()));
            }
        }

        let summary = BatchSummary {
            created: batch.create.len(),
            updated: batch.update.len(),
            deleted: batch.delete.len(),
        };
        for task in batch.create {
            map.insert(task.id.clone(), task);
        }
        for task in batch.update {
            map.insert(task.id.clone(), task);
        }
        for id in batch.delete {
            map.remove(&id);
        }
        self.persist(&map).await?;
        Ok(summary)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let map = self.tasks.read().await;
        let mut stats = StoreStats {
            total: map.len(),
            ..StoreStats::default()
        };
        for task in map.values() {
            match task.status {
                TaskStatus::Todo => stats.todo += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
            }
        }
        Ok(stats)
    }

    fn next_id(&self) -> TaskId {
        let n = self.id_seq.fetch_add(1, Ordering::Relaxed) + 1;
        TaskId(format!("task-{n}"))
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
    async fn persists_across_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("state").join("tasks.json");

        let store = JsonTaskStore::open(path.clone()).await.expect("open");
        let id = store.next_id();
        store.create(Task::new(id.clone(), "persisted")).await.expect("create");

        let reopened = JsonTaskStore::open(path).await.expect("reopen");
        let task = reopened.get(&id).await.expect("get").expect("present");
        assert_eq!(task.title, "persisted");
        assert_eq!(reopened.next_id().0, "task-2", "sequence continues");
    }

    #[tokio::test]
    async fn tmp_file_cleaned_up_after_persist() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("tasks.json");
        let store = JsonTaskStore::open(path.clone()).await.expect("open");
        store
            .create(Task::new(store.next_id(), "x"))
            .await
            .expect("create");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_backend_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{ not json").expect("write");
        assert!(matches!(
            JsonTaskStore::open(path).await,
            Err(StoreError::Backend(_))
        ));
    }
}
