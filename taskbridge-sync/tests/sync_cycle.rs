//! End-to-end coordinator tests over the in-memory store and filesystem.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use taskbridge_core::config::SyncConfig;
use taskbridge_core::fsio::{FileSystem, InMemoryFileSystem};
use taskbridge_core::store::{InMemoryTaskStore, TaskStore};
use taskbridge_core::types::{
    ConflictKind, Priority, ResolutionStrategy, SyncEvent, Task, TaskStatus,
};
use taskbridge_sync::SyncCoordinator;

struct Harness {
    _dir: TempDir,
    file_path: PathBuf,
    store: Arc<InMemoryTaskStore>,
    fs: Arc<InMemoryFileSystem>,
    coordinator: SyncCoordinator,
}

fn harness_with(configure: impl FnOnce(&mut SyncConfig)) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let base = dir.path().canonicalize().expect("canonical base");
    let mut config = SyncConfig::new(base.clone(), "TODO.md");
    configure(&mut config);
    let file_path = config.file_path.clone();

    let store = Arc::new(InMemoryTaskStore::new());
    let fs = Arc::new(InMemoryFileSystem::new());
    let coordinator = SyncCoordinator::new(config, store.clone(), fs.clone())
        .expect("coordinator");
    Harness {
        _dir: dir,
        file_path,
        store,
        fs,
        coordinator,
    }
}

fn harness() -> Harness {
    harness_with(|_| {})
}

async fn task_by_title(store: &InMemoryTaskStore, title: &str) -> Option<Task> {
    store
        .list()
        .await
        .expect("list")
        .into_iter()
        .find(|t| t.title == title)
}

#[tokio::test]
async fn file_to_app_creates_tasks_from_document() {
    let h = harness();
    h.fs.put(
        h.file_path.clone(),
        "## 🔥 Urgent\n\n- [ ] Buy milk #errand\n\n## 📋 Tasks\n\n- [~] Write report\n",
    )
    .await;

    let report = h.coordinator.sync_file_to_app().await.expect("sync");
    assert!(report.entry.success);
    assert_eq!(report.entry.tasks_created, 2);
    assert_eq!(report.entry.conflicts, 0);

    let milk = task_by_title(&h.store, "Buy milk").await.expect("milk task");
    assert_eq!(milk.priority, Priority::Critical);
    assert_eq!(milk.status, TaskStatus::Todo);
    assert_eq!(milk.tags, vec!["errand".to_string()]);

    let report_task = task_by_title(&h.store, "Write report").await.expect("report task");
    assert_eq!(report_task.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn second_sync_without_changes_is_a_noop() {
    let h = harness();
    h.fs.put(h.file_path.clone(), "- [ ] only task\n").await;

    let first = h.coordinator.sync_file_to_app().await.expect("first");
    assert_eq!(first.entry.tasks_changed(), 1);
    assert!(!first.skipped_identical);

    let second = h.coordinator.sync_file_to_app().await.expect("second");
    assert_eq!(second.entry.tasks_changed(), 0, "idempotent re-sync");
    assert!(second.skipped_identical);

    assert_eq!(h.coordinator.history().len(), 2, "both attempts recorded");
}

#[tokio::test]
async fn file_edit_updates_matching_task_without_conflict() {
    let h = harness();
    h.fs.put(h.file_path.clone(), "- [ ] Ship the release\n").await;
    h.coordinator.sync_file_to_app().await.expect("seed");

    // Only the file changes: mark the task in progress.
    h.fs.put(h.file_path.clone(), "- [~] Ship the release\n").await;
    let report = h.coordinator.sync_file_to_app().await.expect("resync");

    assert_eq!(report.entry.tasks_updated, 1);
    assert_eq!(report.entry.conflicts, 0, "one-sided edit auto-merges");
    let task = task_by_title(&h.store, "Ship the release").await.expect("task");
    assert_eq!(task.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn file_deletion_of_untouched_task_deletes_in_app() {
    let h = harness();
    h.fs.put(h.file_path.clone(), "- [ ] keep\n- [ ] drop\n").await;
    h.coordinator.sync_file_to_app().await.expect("seed");

    h.fs.put(h.file_path.clone(), "- [ ] keep\n").await;
    let report = h.coordinator.sync_file_to_app().await.expect("resync");

    assert_eq!(report.entry.tasks_deleted, 1);
    assert!(task_by_title(&h.store, "drop").await.is_none());
    assert!(task_by_title(&h.store, "keep").await.is_some());
}

#[tokio::test]
async fn divergent_status_edits_merge_to_more_progressed_state() {
    let h = harness();
    h.fs.put(h.file_path.clone(), "- [ ] Shared task\n").await;
    h.coordinator.sync_file_to_app().await.expect("seed");

    // App completes it; file only starts it.
    let mut app_task = task_by_title(&h.store, "Shared task").await.expect("task");
    app_task.status = TaskStatus::Completed;
    app_task.updated_at = chrono::Utc::now();
    h.store.update(app_task).await.expect("app edit");
    h.fs.put(h.file_path.clone(), "- [~] Shared task\n").await;

    let report = h.coordinator.sync_file_to_app().await.expect("merge sync");
    let merged = task_by_title(&h.store, "Shared task").await.expect("task");
    assert_eq!(merged.status, TaskStatus::Completed, "progression rule wins");
    assert_eq!(
        h.coordinator.unresolved_conflicts().len(),
        0,
        "intelligent merge settles the status divergence"
    );
    assert!(report.entry.success);
}

#[tokio::test]
async fn divergent_titles_queue_a_manual_conflict() {
    let h = harness_with(|c| c.conflict_strategy = ResolutionStrategy::Manual);
    h.fs.put(h.file_path.clone(), "- [ ] Original title\n").await;
    h.coordinator.sync_file_to_app().await.expect("seed");

    let mut app_task = task_by_title(&h.store, "Original title").await.expect("task");
    app_task.title = "App title".to_string();
    app_task.updated_at = chrono::Utc::now();
    h.store.update(app_task).await.expect("app edit");

    // The file task no longer matches the app task by title, and the app
    // task's base says the file side deleted it: a deletion conflict, while
    // the file-side title spawns a fresh task.
    h.fs.put(h.file_path.clone(), "- [ ] File title\n").await;
    let report = h.coordinator.sync_file_to_app().await.expect("sync");

    assert!(report
        .conflicts
        .iter()
        .any(|c| c.kind == ConflictKind::Deletion));
    let unresolved = h.coordinator.unresolved_conflicts();
    assert_eq!(unresolved.len(), 1);
    assert!(task_by_title(&h.store, "App title").await.is_some(), "app edit survives");
    assert!(task_by_title(&h.store, "File title").await.is_some());
}

#[tokio::test]
async fn queued_conflict_can_be_resolved_prefer_file() {
    let h = harness_with(|c| c.conflict_strategy = ResolutionStrategy::Manual);
    h.fs.put(h.file_path.clone(), "- [ ] Victim\n").await;
    h.coordinator.sync_file_to_app().await.expect("seed");

    let mut app_task = task_by_title(&h.store, "Victim").await.expect("task");
    app_task.priority = Priority::High;
    app_task.updated_at = chrono::Utc::now();
    h.store.update(app_task).await.expect("app edit");

    h.fs.put(h.file_path.clone(), "").await;
    h.coordinator.sync_file_to_app().await.expect("sync");

    let conflict = h
        .coordinator
        .unresolved_conflicts()
        .pop()
        .expect("queued deletion conflict");
    assert_eq!(conflict.kind, ConflictKind::Deletion);

    h.coordinator
        .resolve_conflict(&conflict.id, ResolutionStrategy::PreferFile)
        .await
        .expect("resolve");
    assert!(
        task_by_title(&h.store, "Victim").await.is_none(),
        "prefer_file honours the file-side deletion"
    );
    assert!(h.coordinator.unresolved_conflicts().is_empty());
    assert_eq!(h.coordinator.statistics().conflicts_manually_resolved, 1);
}

#[tokio::test]
async fn app_to_file_serializes_store_and_updates_file() {
    let h = harness();
    let mut task = Task::new(h.store.next_id(), "From the app");
    task.priority = Priority::High;
    task.section = Some("⚡ High Priority".to_string());
    h.store.create(task).await.expect("create");

    let report = h.coordinator.sync_app_to_file().await.expect("push");
    assert!(report.entry.success);
    assert!(report.entry.tasks_updated > 0);

    let doc = h.fs.read_to_string(&h.file_path).await.expect("document");
    assert!(doc.contains("## ⚡ High Priority"));
    assert!(doc.contains("- [ ] From the app"));
}

#[tokio::test]
async fn app_to_file_backs_up_existing_document_before_writing() {
    let h = harness();
    h.fs.put(h.file_path.clone(), "- [ ] precious manual edits\n").await;
    h.coordinator.sync_file_to_app().await.expect("seed");

    let mut task = Task::new(h.store.next_id(), "New app task");
    task.updated_at = chrono::Utc::now();
    h.store.create(task).await.expect("create");

    h.coordinator.sync_app_to_file().await.expect("push");
    let backups = h.coordinator.list_backups().await.expect("list backups");
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].reason, "pre-write");

    let backed_up = h
        .fs
        .read_to_string(&backups[0].path)
        .await
        .expect("backup content");
    assert_eq!(backed_up, "- [ ] precious manual edits\n");
}

#[tokio::test]
async fn restore_backup_rolls_the_document_back() {
    let h = harness();
    h.fs.put(h.file_path.clone(), "- [ ] version one\n").await;
    h.coordinator.sync_file_to_app().await.expect("seed");

    let info = h
        .coordinator
        .backup_now("manual checkpoint")
        .await
        .expect("backup")
        .expect("backup info");

    h.fs.put(h.file_path.clone(), "- [ ] version two\n").await;
    h.coordinator.sync_file_to_app().await.expect("sync v2");

    h.coordinator.restore_backup(&info.id).await.expect("restore");
    let doc = h.fs.read_to_string(&h.file_path).await.expect("document");
    assert_eq!(doc, "- [ ] version one\n");

    // The fast path was invalidated: the next sync re-processes the restored content.
    let report = h.coordinator.sync_file_to_app().await.expect("post-restore sync");
    assert!(!report.skipped_identical);
}

#[tokio::test]
async fn dry_run_push_never_touches_the_file() {
    let h = harness_with(|c| c.dry_run = true);
    let task = Task::new(h.store.next_id(), "ghost");
    h.store.create(task).await.expect("create");

    let report = h.coordinator.sync_app_to_file().await.expect("dry run");
    assert!(report.dry_run);
    assert!(!h.fs.exists(&h.file_path).await, "dry run must not write");
}

#[tokio::test]
async fn missing_file_fails_the_attempt_but_keeps_coordinator_alive() {
    let h = harness();

    let err = h.coordinator.sync_file_to_app().await.expect_err("no file yet");
    let _ = err;
    let history = h.coordinator.history();
    assert_eq!(history.len(), 1);
    assert!(!history[0].success);
    assert!(history[0].error.is_some());
    assert_eq!(h.coordinator.statistics().failed_syncs, 1);

    // The coordinator accepts the next trigger.
    h.fs.put(h.file_path.clone(), "- [ ] recovered\n").await;
    let report = h.coordinator.sync_file_to_app().await.expect("recovered sync");
    assert_eq!(report.entry.tasks_created, 1);
}

#[tokio::test]
async fn oversized_file_is_refused_before_parsing() {
    let h = harness_with(|c| c.max_file_size = 16);
    h.fs.put(
        h.file_path.clone(),
        "- [ ] this line is comfortably longer than sixteen bytes\n",
    )
    .await;

    let err = h.coordinator.sync_file_to_app().await.expect_err("too large");
    assert!(err.to_string().contains("file too large"));
}

#[tokio::test]
async fn lifecycle_events_are_emitted_in_order() {
    let h = harness();
    let mut events = h.coordinator.subscribe();
    h.fs.put(h.file_path.clone(), "- [ ] evented\n").await;

    h.coordinator.sync_file_to_app().await.expect("sync");

    let first = events.try_recv().expect("start event");
    assert!(matches!(first, SyncEvent::SyncStart { .. }));
    let second = events.try_recv().expect("completed event");
    match second {
        SyncEvent::SyncCompleted { entry } => assert_eq!(entry.tasks_created, 1),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_sync_emits_error_event() {
    let h = harness();
    let mut events = h.coordinator.subscribe();

    let _ = h.coordinator.sync_file_to_app().await;
    let _start = events.try_recv().expect("start event");
    let error = events.try_recv().expect("error event");
    assert!(matches!(error, SyncEvent::SyncError { .. }));
}

#[tokio::test]
async fn full_cycle_survives_both_directions() {
    let h = harness();
    h.fs.put(
        h.file_path.clone(),
        "## 📋 Tasks\n\n- [ ] round tripper #cycle\n",
    )
    .await;
    h.coordinator.sync_file_to_app().await.expect("pull");

    let mut task = task_by_title(&h.store, "round tripper").await.expect("task");
    task.status = TaskStatus::Completed;
    task.completed_at = Some(chrono::Utc::now());
    task.updated_at = chrono::Utc::now();
    h.store.update(task).await.expect("complete in app");

    h.coordinator.sync_app_to_file().await.expect("push");
    let doc = h.fs.read_to_string(&h.file_path).await.expect("document");
    assert!(doc.contains("- [x] round tripper"));
    assert!(doc.contains("#cycle"));

    // Pulling the pushed document back changes nothing.
    let report = h.coordinator.sync_file_to_app().await.expect("settle");
    assert_eq!(report.entry.tasks_changed(), 0);
}
