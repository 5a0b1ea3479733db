//! The injected task-store interface.
//!
//! The sync engine reads and writes tasks exclusively through [`TaskStore`];
//! it never assumes a storage technology. [`InMemoryTaskStore`] backs tests
//! and the CLI's default wiring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{Task, TaskId, TaskStatus};

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// Sort key for [`TaskQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Order,
    Priority,
    CreatedAt,
    UpdatedAt,
}

/// A board-scoped, paginated task query.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    /// Filter to one board/section; `None` returns every task.
    pub section: Option<String>,
    pub status: Option<TaskStatus>,
    pub sort: SortKey,
    pub descending: bool,
    pub offset: usize,
    /// `None` means no limit.
    pub limit: Option<usize>,
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    /// Total matches before pagination.
    pub total: usize,
    pub offset: usize,
}

/// A batch of mutations applied as a single transaction: either every
/// operation succeeds or the store is left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskBatch {
    pub create: Vec<Task>,
    pub update: Vec<Task>,
    pub delete: Vec<TaskId>,
}

impl TaskBatch {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }
}

/// Counts applied by [`TaskStore::apply_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub completed: usize,
}

// ---------------------------------------------------------------------------
// TaskStore trait
// ---------------------------------------------------------------------------

/// CRUD surface the engine consumes. Implementations must be safe to share
/// behind an `Arc` across the coordinator and the watcher.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// All tasks, unordered.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;

    async fn query(&self, query: TaskQuery) -> Result<TaskPage, StoreError>;

    async fn create(&self, task: Task) -> Result<Task, StoreError>;

    async fn update(&self, task: Task) -> Result<Task, StoreError>;

    /// Returns `true` if the task existed.
    async fn delete(&self, id: &TaskId) -> Result<bool, StoreError>;

    /// Apply a batch transactionally (all-or-none).
    async fn apply_batch(&self, batch: TaskBatch) -> Result<BatchSummary, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Mint a fresh id for a task created on the file side.
    fn next_id(&self) -> TaskId;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// A `HashMap`-backed store for tests and the CLI default.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    id_seq: AtomicU64,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, e.g. for tests.
    pub async fn with_tasks(tasks: Vec<Task>) -> Self {
        let store = Self::new();
        {
            let mut map = store.tasks.write().await;
            for task in tasks {
                map.insert(task.id.clone(), task);
            }
        }
        store
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
impl TaskStore for InMemoryTaskStore {
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
        let page: Vec<Task> = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(TaskPage {
            tasks: page,
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
        Ok(task)
    }

    async fn update(&self, task: Task) -> Result<Task, StoreError> {
        let mut map = self.tasks.write().await;
        if !map.contains_key(&task.id) {
            return Err(StoreError::NotFound(task.id));
        }
        map.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn delete(&self, id: &TaskId) -> Result<bool, StoreError> {
        Ok(self.tasks.write().await.remove(id).is_some())
    }

    async fn apply_batch(&self, batch: TaskBatch) -> Result<BatchSummary, StoreError> {
        let mut map = self.tasks.write().await;

        // Validate everything before touching the map — all-or-none.
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
    use crate::types::Priority;

    fn task(id: &str, title: &str) -> Task {
        Task::new(id, title)
    }

    #[tokio::test]
    async fn create_get_update_delete() {
        let store = InMemoryTaskStore::new();
        store.create(task("a", "one")).await.expect("create");

        let fetched = store.get(&TaskId::from("a")).await.expect("get");
        assert_eq!(fetched.expect("present").title, "one");

        let mut edited = task("a", "one edited");
        edited.priority = Priority::High;
        store.update(edited).await.expect("update");
        let fetched = store.get(&TaskId::from("a")).await.expect("get");
        assert_eq!(fetched.expect("present").priority, Priority::High);

        assert!(store.delete(&TaskId::from("a")).await.expect("delete"));
        assert!(!store.delete(&TaskId::from("a")).await.expect("delete"));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = InMemoryTaskStore::new();
        store.create(task("a", "one")).await.expect("create");
        assert!(matches!(
            store.create(task("a", "two")).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn batch_is_all_or_none() {
        let store = InMemoryTaskStore::with_tasks(vec![task("a", "one")]).await;

        // The update targets a missing task, so the create must not land.
        let batch = TaskBatch {
            create: vec![task("b", "two")],
            update: vec![task("missing", "nope")],
            delete: vec![],
        };
        assert!(store.apply_batch(batch).await.is_err());
        assert!(store
            .get(&TaskId::from("b"))
            .await
            .expect("get")
            .is_none());

        let batch = TaskBatch {
            create: vec![task("b", "two")],
            update: vec![task("a", "one edited")],
            delete: vec![],
        };
        let summary = store.apply_batch(batch).await.expect("apply");
        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
    }

    #[tokio::test]
    async fn query_filters_sorts_and_paginates() {
        let mut a = task("a", "alpha");
        a.section = Some("Inbox".to_string());
        a.priority = Priority::Low;
        let mut b = task("b", "beta");
        b.section = Some("Inbox".to_string());
        b.priority = Priority::Critical;
        let mut c = task("c", "gamma");
        c.section = Some("Done".to_string());

        let store = InMemoryTaskStore::with_tasks(vec![a, b, c]).await;
        let page = store
            .query(TaskQuery {
                section: Some("Inbox".to_string()),
                sort: SortKey::Priority,
                ..TaskQuery::default()
            })
            .await
            .expect("query");

        assert_eq!(page.total, 2);
        assert_eq!(page.tasks[0].id, TaskId::from("b"), "critical sorts first");

        let page = store
            .query(TaskQuery {
                section: Some("Inbox".to_string()),
                offset: 1,
                limit: Some(5),
                sort: SortKey::Priority,
                ..TaskQuery::default()
            })
            .await
            .expect("query");
        assert_eq!(page.tasks.len(), 1);
    }

    #[tokio::test]
    async fn stats_count_by_status() {
        let mut done = task("a", "done");
        done.status = TaskStatus::Completed;
        let store = InMemoryTaskStore::with_tasks(vec![done, task("b", "open")]).await;
        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.todo, 1);
    }

    #[test]
    fn next_id_is_monotonic() {
        let store = InMemoryTaskStore::new();
        let a = store.next_id();
        let b = store.next_id();
        assert_ne!(a, b);
    }
}
