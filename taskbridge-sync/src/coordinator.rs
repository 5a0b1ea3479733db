//! The sync coordinator: a state machine composing validator, codec, diff,
//! merger, resolver, resilience, base versions, backups, history, and
//! statistics.
//!
//! States are `idle → syncing → idle`. A `tokio::sync::Mutex` serializes
//! sync passes, so triggers arriving mid-sync queue instead of being
//! dropped. History, statistics, the conflict list, and the last-synced
//! content are coordinator-owned and only mutated while that lock is held;
//! status queries read snapshots.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use taskbridge_codec as codec;
use taskbridge_core::config::SyncConfig;
use taskbridge_core::fsio::FileSystem;
use taskbridge_core::paths::PathValidator;
use taskbridge_core::sanitize::sanitize_text;
use taskbridge_core::store::{TaskBatch, TaskStore};
use taskbridge_core::types::{
    BackupInfo, Conflict, ConflictKind, ResolutionStrategy, SyncDirection, SyncEvent,
    SyncHistoryEntry, SyncStatistics, Task,
};
use taskbridge_diff as diff;

use crate::backup::BackupManager;
use crate::base_store::BaseVersionStore;
use crate::breaker::CircuitBreaker;
use crate::error::{io_err, SyncError};
use crate::history::{update_statistics, HistoryLog};
use crate::merge::{merge_three_way, FallbackSide, MergeField};
use crate::resolve::{ConflictResolver, Resolution};
use crate::retry::RetryExecutor;

const HISTORY_CAP: usize = 200;

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

/// Result of one sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub entry: SyncHistoryEntry,
    /// True when the pass short-circuited on byte-identical content.
    pub skipped_identical: bool,
    /// Conflicts detected (resolved and unresolved) during this pass.
    pub conflicts: Vec<Conflict>,
    pub dry_run: bool,
}

/// Point-in-time snapshot for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// `"idle"` or `"syncing"`.
    pub state: &'static str,
    pub file_path: PathBuf,
    pub last_content_hash: Option<String>,
    pub unresolved_conflicts: usize,
    pub read_breaker: &'static str,
    pub write_breaker: &'static str,
    pub statistics: SyncStatistics,
}

/// Everything one file→app pass changed, before history bookkeeping.
#[derive(Debug, Default)]
struct PassOutcome {
    created: usize,
    updated: usize,
    deleted: usize,
    conflicts: Vec<Conflict>,
    auto_resolved: u64,
    /// Queued for review; counted as resolved only once a human settles them.
    flagged_for_review: u64,
    skipped_identical: bool,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct SyncCoordinator {
    config: SyncConfig,
    store: Arc<dyn TaskStore>,
    fs: Arc<dyn FileSystem>,
    validator: PathValidator,
    resolver: ConflictResolver,
    read_breaker: CircuitBreaker,
    write_breaker: CircuitBreaker,
    retry: RetryExecutor,
    base_store: BaseVersionStore,
    backups: BackupManager,

    sync_lock: tokio::sync::Mutex<()>,
    syncing: AtomicBool,
    last_content: Mutex<Option<String>>,
    last_hash: Mutex<Option<String>>,
    conflicts: Mutex<Vec<Conflict>>,
    history: Mutex<HistoryLog>,
    stats: Mutex<SyncStatistics>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    /// Construct a coordinator. Fails fast on invalid configuration or a
    /// missing base directory.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn TaskStore>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let validator = PathValidator::new(&config.base_dir)?;
        let resolver = ConflictResolver::new(config.conflict_strategy);
        let read_breaker = CircuitBreaker::new("file-read", config.breaker.clone());
        let write_breaker = CircuitBreaker::new("file-write", config.breaker.clone());
        let retry = RetryExecutor::new(config.retry.clone());
        let base_store = BaseVersionStore::new(&config.state_dir, fs.clone());
        let backups = BackupManager::new(config.backup_dir.clone(), config.max_backups, fs.clone());
        let (events, _) = broadcast::channel(64);

        Ok(Self {
            config,
            store,
            fs,
            validator,
            resolver,
            read_breaker,
            write_breaker,
            retry,
            base_store,
            backups,
            sync_lock: tokio::sync::Mutex::new(()),
            syncing: AtomicBool::new(false),
            last_content: Mutex::new(None),
            last_hash: Mutex::new(None),
            conflicts: Mutex::new(Vec::new()),
            history: Mutex::new(HistoryLog::new(HISTORY_CAP)),
            stats: Mutex::new(SyncStatistics::default()),
            events,
        })
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Forward a watcher failure to event subscribers.
    pub fn notify_watcher_error(&self, message: impl Into<String>) {
        let _ = self.events.send(SyncEvent::WatcherError {
            message: message.into(),
        });
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            state: if self.syncing.load(Ordering::SeqCst) {
                "syncing"
            } else {
                "idle"
            },
            file_path: self.config.file_path.clone(),
            last_content_hash: self.last_hash.lock().expect("hash lock").clone(),
            unresolved_conflicts: self
                .conflicts
                .lock()
                .expect("conflict lock")
                .iter()
                .filter(|c| !c.resolved)
                .count(),
            read_breaker: self.read_breaker.state_name(),
            write_breaker: self.write_breaker.state_name(),
            statistics: self.stats.lock().expect("stats lock").clone(),
        }
    }

    pub fn statistics(&self) -> SyncStatistics {
        self.stats.lock().expect("stats lock").clone()
    }

    pub fn history(&self) -> Vec<SyncHistoryEntry> {
        self.history.lock().expect("history lock").entries()
    }

    pub fn unresolved_conflicts(&self) -> Vec<Conflict> {
        self.conflicts
            .lock()
            .expect("conflict lock")
            .iter()
            .filter(|c| !c.resolved)
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // file → app
    // -----------------------------------------------------------------------

    /// Pull the document into the task store.
    pub async fn sync_file_to_app(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.sync_lock.lock().await;
        self.syncing.store(true, Ordering::SeqCst);
        let started_at = Utc::now();
        let _ = self.events.send(SyncEvent::SyncStart {
            direction: SyncDirection::FileToApp,
        });

        let result = self.run_file_to_app().await;
        self.syncing.store(false, Ordering::SeqCst);
        self.finish(SyncDirection::FileToApp, started_at, result)
    }

    async fn run_file_to_app(&self) -> Result<PassOutcome, SyncError> {
        let path = self.validator.validate(&self.config.file_path)?;

        if self.fs.exists(&path).await {
            let meta = self.fs.metadata(&path).await.map_err(|e| io_err(&path, e))?;
            self.validator
                .ensure_within_size(&path, meta.len, self.config.max_file_size)?;
        }

        // Read through the breaker with retry; an open circuit falls back to
        // the last-synced content so the pass degrades to a no-op.
        let content = {
            let fs = self.fs.clone();
            let read_path = path.clone();
            let cached = self.last_content.lock().expect("content lock").clone();
            self.retry
                .run("file-read", || {
                    let fs = fs.clone();
                    let read_path = read_path.clone();
                    let cached = cached.clone();
                    async move {
                        match cached {
                            Some(cached) => {
                                self.read_breaker
                                    .execute_with_fallback(
                                        || async {
                                            fs.read_to_string(&read_path)
                                                .await
                                                .map_err(|e| io_err(&read_path, e))
                                        },
                                        move || cached,
                                    )
                                    .await
                            }
                            None => {
                                self.read_breaker
                                    .execute(|| async {
                                        fs.read_to_string(&read_path)
                                            .await
                                            .map_err(|e| io_err(&read_path, e))
                                    })
                                    .await
                            }
                        }
                    }
                })
                .await?
        };
        let content = content.replace("\r\n", "\n");
        let hash = diff::content_hash(&content);

        let mut base_file = self.base_store.load().await?;
        let last_hash = self
            .last_hash
            .lock()
            .expect("hash lock")
            .clone()
            .or_else(|| base_file.last_content_hash.clone());

        let mut outcome = PassOutcome::default();
        if last_hash.as_deref() == Some(hash.as_str()) {
            tracing::debug!("content identical to last sync; nothing to do");
            outcome.skipped_identical = true;
            return Ok(outcome);
        }

        if let Some(previous) = self.last_content.lock().expect("content lock").clone() {
            let summary = diff::summary(&previous, &content);
            tracing::info!(
                severity = summary.severity,
                lines_added = summary.lines_added,
                lines_deleted = summary.lines_deleted,
                "document changed since last sync",
            );
        }

        let parsed = codec::parse(&content);
        let app_tasks = self
            .retry
            .run("store-list", || async {
                self.store.list().await.map_err(SyncError::from)
            })
            .await?;

        let mut batch = TaskBatch::default();
        let mut matched_app_ids: Vec<String> = Vec::new();

        for file_task in &parsed.tasks {
            let app_match = app_tasks
                .iter()
                .find(|t| sanitize_text(&t.title) == file_task.title);

            match app_match {
                None => {
                    let task = file_task.to_task(self.store.next_id());
                    tracing::debug!(title = %task.title, "file-side task created");
                    batch.create.push(task);
                    outcome.created += 1;
                }
                Some(app) => {
                    matched_app_ids.push(app.id.0.clone());
                    let mut file_version = file_task.to_task(app.id.clone());
                    if file_task.created_on.is_none() {
                        file_version.created_at = app.created_at;
                    }

                    if self.config.three_way_merge {
                        match base_file.get(&app.id).cloned() {
                            Some(base) => self.merge_pair(
                                &base,
                                &file_version,
                                app,
                                &mut batch,
                                &mut outcome,
                            ),
                            None => {
                                // Matched by title but never synced: the app
                                // task predates our knowledge of the file task.
                                self.resolve_pair(
                                    ConflictKind::Creation,
                                    &file_version,
                                    app,
                                    None,
                                    &mut batch,
                                    &mut outcome,
                                );
                            }
                        }
                    } else if !tasks_equivalent(&file_version, app) {
                        self.resolve_pair(
                            ConflictKind::Content,
                            &file_version,
                            app,
                            None,
                            &mut batch,
                            &mut outcome,
                        );
                    }
                }
            }
        }

        // Deletions: app tasks no file line matched.
        for app in &app_tasks {
            if matched_app_ids.iter().any(|id| id == &app.id.0) {
                continue;
            }
            if self.config.three_way_merge {
                match base_file.get(&app.id) {
                    Some(base) => {
                        if tasks_equivalent(base, app) {
                            batch.delete.push(app.id.clone());
                            outcome.deleted += 1;
                        } else {
                            // Deleted in the file, edited in the app.
                            self.resolve_deletion(base.clone(), app, &mut batch, &mut outcome);
                        }
                    }
                    // App-created since the last sync: keep it.
                    None => {}
                }
            } else {
                batch.delete.push(app.id.clone());
                outcome.deleted += 1;
            }
        }

        if !batch.is_empty() {
            let apply = batch.clone();
            self.retry
                .run("store-apply", move || {
                    let batch = apply.clone();
                    async move { self.store.apply_batch(batch).await.map_err(SyncError::from) }
                })
                .await?;
        }

        // Persist the new common ancestors and content hash.
        let final_tasks = self.store.list().await.map_err(SyncError::from)?;
        base_file.tasks = final_tasks
            .into_iter()
            .map(|t| (t.id.0.clone(), t))
            .collect();
        base_file.synced_at = Utc::now();
        base_file.last_content_hash = Some(hash.clone());
        self.base_store.save(&base_file).await?;

        *self.last_content.lock().expect("content lock") = Some(content);
        *self.last_hash.lock().expect("hash lock") = Some(hash);

        Ok(outcome)
    }

    /// Three-way merge one matched pair and stage the result.
    fn merge_pair(
        &self,
        base: &Task,
        file_version: &Task,
        app: &Task,
        batch: &mut TaskBatch,
        outcome: &mut PassOutcome,
    ) {
        let fallback = match self.config.conflict_strategy {
            ResolutionStrategy::PreferFile => FallbackSide::File,
            ResolutionStrategy::PreferApp => FallbackSide::App,
            ResolutionStrategy::Manual | ResolutionStrategy::Merge => FallbackSide::Manual,
        };
        let merged = merge_three_way(base, file_version, app, fallback);

        if !merged.conflicts.is_empty() {
            let fully_resolved = merged.fully_resolved();
            let conflict = Conflict {
                id: Uuid::new_v4().to_string(),
                task_id: app.id.clone(),
                file_version: file_version.clone(),
                app_version: app.clone(),
                base_version: Some(base.clone()),
                kind: ConflictKind::Content,
                detected_at: Utc::now(),
                resolved: fully_resolved,
                resolution: fully_resolved.then_some(ResolutionStrategy::Merge),
            };
            outcome.auto_resolved += merged.conflicts.iter().filter(|c| c.resolved).count() as u64;
            outcome.flagged_for_review +=
                merged.conflicts.iter().filter(|c| !c.resolved).count() as u64;
            if !fully_resolved {
                self.conflicts.lock().expect("conflict lock").push(conflict.clone());
            }
            outcome.conflicts.push(conflict);
        }

        if !tasks_equivalent(&merged.merged, app) {
            batch.update.push(merged.merged);
            outcome.updated += 1;
        }
    }

    /// Legacy / creation conflict path: no usable ancestor.
    fn resolve_pair(
        &self,
        kind: ConflictKind,
        file_version: &Task,
        app: &Task,
        base: Option<Task>,
        batch: &mut TaskBatch,
        outcome: &mut PassOutcome,
    ) {
        if tasks_equivalent(file_version, app) {
            return;
        }
        let conflict = Conflict {
            id: Uuid::new_v4().to_string(),
            task_id: app.id.clone(),
            file_version: file_version.clone(),
            app_version: app.clone(),
            base_version: base,
            kind,
            detected_at: Utc::now(),
            resolved: false,
            resolution: None,
        };

        let resolution = self
            .resolver
            .resolve(&conflict, self.config.conflict_strategy);
        if resolution.needs_review {
            outcome.flagged_for_review += 1;
            self.conflicts.lock().expect("conflict lock").push(conflict.clone());
        } else {
            outcome.auto_resolved += 1;
        }
        outcome.conflicts.push(conflict);

        if !tasks_equivalent(&resolution.task, app) {
            batch.update.push(resolution.task);
            outcome.updated += 1;
        }
    }

    /// The file deleted a task the app has since edited.
    fn resolve_deletion(
        &self,
        base: Task,
        app: &Task,
        batch: &mut TaskBatch,
        outcome: &mut PassOutcome,
    ) {
        let mut deleted_file_version = base.clone();
        deleted_file_version.updated_at = Utc::now();
        let conflict = Conflict {
            id: Uuid::new_v4().to_string(),
            task_id: app.id.clone(),
            file_version: deleted_file_version,
            app_version: app.clone(),
            base_version: Some(base),
            kind: ConflictKind::Deletion,
            detected_at: Utc::now(),
            resolved: false,
            resolution: None,
        };

        match self.config.conflict_strategy {
            ResolutionStrategy::PreferFile => {
                batch.delete.push(app.id.clone());
                outcome.deleted += 1;
                outcome.auto_resolved += 1;
            }
            ResolutionStrategy::PreferApp => {
                outcome.auto_resolved += 1;
            }
            // The app edit survives until a human decides.
            ResolutionStrategy::Merge | ResolutionStrategy::Manual => {
                outcome.flagged_for_review += 1;
                self.conflicts.lock().expect("conflict lock").push(conflict.clone());
            }
        }
        outcome.conflicts.push(conflict);
    }

    // -----------------------------------------------------------------------
    // app → file
    // -----------------------------------------------------------------------

    /// Push the task store into the document.
    pub async fn sync_app_to_file(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.sync_lock.lock().await;
        self.syncing.store(true, Ordering::SeqCst);
        let started_at = Utc::now();
        let _ = self.events.send(SyncEvent::SyncStart {
            direction: SyncDirection::AppToFile,
        });

        let result = self.run_app_to_file().await;
        self.syncing.store(false, Ordering::SeqCst);
        self.finish(SyncDirection::AppToFile, started_at, result)
    }

    async fn run_app_to_file(&self) -> Result<PassOutcome, SyncError> {
        let path = self.validator.validate(&self.config.file_path)?;
        let tasks = self
            .retry
            .run("store-list", || async {
                self.store.list().await.map_err(SyncError::from)
            })
            .await?;

        // Preserve the document's front matter across rewrites.
        let existing = if self.fs.exists(&path).await {
            let fs = self.fs.clone();
            let read_path = path.clone();
            Some(
                self.retry
                    .run("file-read", || {
                        let fs = fs.clone();
                        let read_path = read_path.clone();
                        async move {
                            self.read_breaker
                                .execute(|| async {
                                    fs.read_to_string(&read_path)
                                        .await
                                        .map_err(|e| io_err(&read_path, e))
                                })
                                .await
                        }
                    })
                    .await?
                    .replace("\r\n", "\n"),
            )
        } else {
            None
        };

        let front = existing
            .as_deref()
            .map(|doc| codec::parse(doc).front_matter)
            .unwrap_or_default();

        let mut sorted = tasks.clone();
        sorted.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        let rendered = codec::serialize_with_front_matter(&front, &sorted);
        codec::validate_rendered(&rendered, &sorted)?;

        let mut outcome = PassOutcome::default();
        if let Some(existing) = &existing {
            if diff::is_identical(existing, &rendered) {
                tracing::debug!("rendered document identical to disk; nothing to do");
                outcome.skipped_identical = true;
                return Ok(outcome);
            }
        }

        if self.config.dry_run {
            tracing::info!(path = %path.display(), "[dry-run] would write document");
            return Ok(outcome);
        }

        if self.config.auto_backup && existing.is_some() {
            self.backups.create(&path, "pre-write").await?;
        }

        {
            let fs = self.fs.clone();
            let write_path = path.clone();
            let rendered = rendered.clone();
            self.retry
                .run("file-write", || {
                    let fs = fs.clone();
                    let write_path = write_path.clone();
                    let rendered = rendered.clone();
                    async move {
                        self.write_breaker
                            .execute(|| async move {
                                fs.write(&write_path, &rendered)
                                    .await
                                    .map_err(|e| io_err(&write_path, e))
                            })
                            .await
                    }
                })
                .await?;
        }

        outcome.updated = sorted.len();

        let hash = diff::content_hash(&rendered);
        let mut base_file = self.base_store.load().await?;
        base_file.tasks = sorted.into_iter().map(|t| (t.id.0.clone(), t)).collect();
        base_file.synced_at = Utc::now();
        base_file.last_content_hash = Some(hash.clone());
        self.base_store.save(&base_file).await?;

        *self.last_content.lock().expect("content lock") = Some(rendered);
        *self.last_hash.lock().expect("hash lock") = Some(hash);

        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Conflicts / backups
    // -----------------------------------------------------------------------

    /// Resolve a queued conflict and apply the result to the store.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
    ) -> Result<Resolution, SyncError> {
        let conflict = {
            let conflicts = self.conflicts.lock().expect("conflict lock");
            conflicts
                .iter()
                .find(|c| c.id == conflict_id && !c.resolved)
                .cloned()
        }
        .ok_or_else(|| SyncError::Config(format!("no unresolved conflict '{conflict_id}'")))?;

        let resolution = self.resolver.resolve(&conflict, strategy);

        match conflict.kind {
            ConflictKind::Deletion if strategy == ResolutionStrategy::PreferFile => {
                self.store
                    .delete(&conflict.task_id)
                    .await
                    .map_err(SyncError::from)?;
            }
            _ => {
                self.store
                    .update(resolution.task.clone())
                    .await
                    .map_err(SyncError::from)?;
            }
        }

        {
            let mut conflicts = self.conflicts.lock().expect("conflict lock");
            if let Some(entry) = conflicts.iter_mut().find(|c| c.id == conflict_id) {
                entry.resolved = true;
                entry.resolution = Some(strategy);
            }
        }
        self.stats
            .lock()
            .expect("stats lock")
            .conflicts_manually_resolved += 1;

        tracing::info!(conflict_id, strategy = %strategy, "conflict resolved");
        Ok(resolution)
    }

    /// Take a backup of the current document outside the write path.
    pub async fn backup_now(&self, reason: &str) -> Result<Option<BackupInfo>, SyncError> {
        let path = self.validator.validate(&self.config.file_path)?;
        self.backups.create(&path, reason).await
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, SyncError> {
        self.backups.list().await
    }

    /// Restore a backup over the document and invalidate the fast path so
    /// the next sync re-reads the restored content.
    pub async fn restore_backup(&self, id: &str) -> Result<BackupInfo, SyncError> {
        let path = self.validator.validate(&self.config.file_path)?;
        let info = self.backups.restore(id, &path).await?;
        *self.last_hash.lock().expect("hash lock") = None;
        *self.last_content.lock().expect("content lock") = None;
        Ok(info)
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    fn finish(
        &self,
        direction: SyncDirection,
        started_at: chrono::DateTime<Utc>,
        result: Result<PassOutcome, SyncError>,
    ) -> Result<SyncReport, SyncError> {
        let finished_at = Utc::now();
        match result {
            Ok(outcome) => {
                let entry = SyncHistoryEntry {
                    id: Uuid::new_v4().to_string(),
                    direction,
                    started_at,
                    finished_at,
                    tasks_created: outcome.created,
                    tasks_updated: outcome.updated,
                    tasks_deleted: outcome.deleted,
                    conflicts: outcome.conflicts.len(),
                    success: true,
                    error: None,
                };
                self.record(&entry, outcome.auto_resolved, 0);
                let _ = self.events.send(SyncEvent::SyncCompleted {
                    entry: entry.clone(),
                });
                tracing::info!(
                    direction = %direction,
                    created = entry.tasks_created,
                    updated = entry.tasks_updated,
                    deleted = entry.tasks_deleted,
                    conflicts = entry.conflicts,
                    duration_ms = (finished_at - started_at).num_milliseconds(),
                    "sync completed",
                );
                Ok(SyncReport {
                    entry,
                    skipped_identical: outcome.skipped_identical,
                    conflicts: outcome.conflicts,
                    dry_run: self.config.dry_run,
                })
            }
            Err(err) => {
                let entry = SyncHistoryEntry {
                    id: Uuid::new_v4().to_string(),
                    direction,
                    started_at,
                    finished_at,
                    tasks_created: 0,
                    tasks_updated: 0,
                    tasks_deleted: 0,
                    conflicts: 0,
                    success: false,
                    error: Some(err.to_string()),
                };
                self.record(&entry, 0, 0);
                let _ = self.events.send(SyncEvent::SyncError {
                    message: err.to_string(),
                });
                tracing::error!(direction = %direction, error = %err, "sync failed");
                Err(err)
            }
        }
    }

    fn record(&self, entry: &SyncHistoryEntry, auto: u64, manual: u64) {
        self.history.lock().expect("history lock").push(entry.clone());
        update_statistics(&mut self.stats.lock().expect("stats lock"), entry, auto, manual);
    }
}

/// Field-level equivalence over the mergeable fields, ignoring bookkeeping
/// timestamps.
fn tasks_equivalent(a: &Task, b: &Task) -> bool {
    MergeField::ALL
        .iter()
        .all(|field| field.value_of(a) == field.value_of(b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
