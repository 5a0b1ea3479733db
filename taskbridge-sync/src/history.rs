//! Sync history and running statistics.
//!
//! History is append-only: one immutable entry per sync attempt, bounded to
//! the most recent `cap` entries. Statistics update incrementally after
//! every attempt (running average for duration).

use std::collections::VecDeque;

use taskbridge_core::types::{SyncHistoryEntry, SyncStatistics};

/// Bounded, append-only log of sync attempts.
#[derive(Debug)]
pub struct HistoryLog {
    entries: VecDeque<SyncHistoryEntry>,
    cap: usize,
}

impl HistoryLog {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(64)),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, entry: SyncHistoryEntry) {
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Newest-first snapshot.
    pub fn entries(&self) -> Vec<SyncHistoryEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn latest(&self) -> Option<&SyncHistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fold one finished attempt into the running statistics.
pub fn update_statistics(
    stats: &mut SyncStatistics,
    entry: &SyncHistoryEntry,
    auto_resolved: u64,
    manually_resolved: u64,
) {
    stats.total_syncs += 1;
    if entry.success {
        stats.successful_syncs += 1;
    } else {
        stats.failed_syncs += 1;
    }
    stats.tasks_changed += entry.tasks_changed() as u64;
    stats.conflicts_auto_resolved += auto_resolved;
    stats.conflicts_manually_resolved += manually_resolved;

    let duration_ms = (entry.finished_at - entry.started_at)
        .num_milliseconds()
        .max(0) as f64;
    stats.average_duration_ms +=
        (duration_ms - stats.average_duration_ms) / stats.total_syncs as f64;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
