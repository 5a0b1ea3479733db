//! Domain types shared across the taskbridge workspace.
//!
//! All timestamps are `DateTime<Utc>`; due dates are calendar dates
//! (`NaiveDate`). Every type is serde-serializable so state can be persisted
//! as JSON and surfaced over the CLI's `--json` output.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed task identifier.
///
/// Ids are store-assigned and never appear in the text format. The text
/// format correlates records by *title* instead — two tasks with identical
/// titles in different sections will collide across the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Workflow state of a task, ordered by progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Progression rank: todo < in_progress < completed.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Todo => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Completed => 2,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Task priority, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Severity rank: low < medium < high < critical.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Direction of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    FileToApp,
    AppToFile,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::FileToApp => write!(f, "file_to_app"),
            SyncDirection::AppToFile => write!(f, "app_to_file"),
        }
    }
}

/// How a conflict is (or should be) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    PreferFile,
    PreferApp,
    Manual,
    #[default]
    Merge,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStrategy::PreferFile => write!(f, "prefer_file"),
            ResolutionStrategy::PreferApp => write!(f, "prefer_app"),
            ResolutionStrategy::Manual => write!(f, "manual"),
            ResolutionStrategy::Merge => write!(f, "merge"),
        }
    }
}

/// Category of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Both sides edited the same task divergently.
    Content,
    /// One side deleted a task the other side edited.
    Deletion,
    /// A new file-side task collides with an unsynced app-side task.
    Creation,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Content => write!(f, "content"),
            ConflictKind::Deletion => write!(f, "deletion"),
            ConflictKind::Creation => write!(f, "creation"),
        }
    }
}

/// Static severity of a field-level conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A task record, the unit both sides of the sync agree on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Logical grouping derived from the document heading the task sits under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Explicit position within its section; inferred from file order when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A task with default metadata, for construction sites that fill in
    /// fields incrementally (parser, tests).
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            status: TaskStatus::default(),
            priority: Priority::default(),
            due_date: None,
            tags: Vec::new(),
            section: None,
            order: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// A divergence between the file-side and app-side versions of one task.
///
/// Conflicts are data, not errors: they are recorded, optionally
/// auto-resolved, and otherwise queued for manual resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub task_id: TaskId,
    pub file_version: Task,
    pub app_version: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_version: Option<Task>,
    pub kind: ConflictKind,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionStrategy>,
}

/// One immutable record per sync attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub id: String,
    pub direction: SyncDirection,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks_created: usize,
    pub tasks_updated: usize,
    pub tasks_deleted: usize,
    pub conflicts: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncHistoryEntry {
    /// Total tasks changed by this attempt.
    pub fn tasks_changed(&self) -> usize {
        self.tasks_created + self.tasks_updated + self.tasks_deleted
    }
}

/// Running aggregate over all sync attempts of one coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SyncStatistics {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub average_duration_ms: f64,
    pub tasks_changed: u64,
    pub conflicts_auto_resolved: u64,
    pub conflicts_manually_resolved: u64,
}

/// Metadata for a backup taken before a destructive file write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub id: String,
    pub path: std::path::PathBuf,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    /// SHA-256 hex digest of the backed-up content.
    pub content_hash: String,
    pub reason: String,
}

/// Lifecycle notifications emitted by the coordinator and watcher.
///
/// Delivered over a broadcast channel; subscribers attach with
/// `SyncCoordinator::subscribe` and detach by dropping the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SyncEvent {
    SyncStart { direction: SyncDirection },
    SyncCompleted { entry: SyncHistoryEntry },
    SyncError { message: String },
    WatcherError { message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
