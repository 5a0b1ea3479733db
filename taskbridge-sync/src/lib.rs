//! # taskbridge-sync
//!
//! The sync engine: three-way merge, conflict resolution, resilience
//! (circuit breaker + retry), base-version state, backups, history, and the
//! coordinator that composes them.
//!
//! Call [`SyncCoordinator::sync_file_to_app`] when the document changed on
//! disk, or [`SyncCoordinator::sync_app_to_file`] when the task store
//! changed. Both are safe to trigger concurrently: a coordinator-level lock
//! queues overlapping triggers.

pub mod backup;
pub mod base_store;
pub mod breaker;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod merge;
pub mod resolve;
pub mod retry;

pub use backup::BackupManager;
pub use base_store::{BaseVersionFile, BaseVersionStore};
pub use breaker::{BreakerStats, CircuitBreaker};
pub use coordinator::{SyncCoordinator, SyncReport, SyncStatus};
pub use error::SyncError;
pub use merge::{merge_three_way, FallbackSide, FieldConflict, MergeField, MergeOutcome, MergeReport, MergeStrategyUsed};
pub use resolve::{ConflictResolver, Resolution, StrategySuggestion};
pub use retry::{RetryExecutor, RetryStatsSnapshot};
