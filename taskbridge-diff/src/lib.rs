//! # taskbridge-diff
//!
//! Change detection between two versions of the synced document.
//!
//! Three granularities, cheapest first:
//! 1. [`is_identical`] — length check plus SHA-256 compare, the fast path
//!    that lets a no-op sync short-circuit before any parsing.
//! 2. [`summary`] — added/deleted character and line counts with a 0–100
//!    severity score, used to decide whether a sync is worth running.
//! 3. [`line_changes`] — a line-level changeset (added/deleted/modified
//!    with old and new content) enabling targeted re-parsing.
//!
//! [`detect`] exposes the raw character-run diff; concatenating its spans
//! reconstructs both inputs exactly.

use serde::Serialize;
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};

// ---------------------------------------------------------------------------
// Fast path
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of a document, the cache key used for the
/// identical-content short circuit.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// True when both versions are byte-identical.
pub fn is_identical(old: &str, new: &str) -> bool {
    old.len() == new.len() && (old == new || content_hash(old) == content_hash(new))
}

// ---------------------------------------------------------------------------
// Character-run diff
// ---------------------------------------------------------------------------

/// Kind of a diff run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Equal,
    Insert,
    Delete,
}

/// A contiguous run of characters with one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffSpan {
    pub kind: SpanKind,
    pub text: String,
}

/// Character-level diff as equal/insert/delete runs.
///
/// Invariant: equal+delete spans concatenate to `old`, equal+insert spans
/// concatenate to `new`.
pub fn detect(old: &str, new: &str) -> Vec<DiffSpan> {
    if is_identical(old, new) {
        if old.is_empty() {
            return Vec::new();
        }
        return vec![DiffSpan {
            kind: SpanKind::Equal,
            text: old.to_string(),
        }];
    }

    let diff = TextDiff::from_chars(old, new);
    let mut spans: Vec<DiffSpan> = Vec::new();
    for change in diff.iter_all_changes() {
        let kind = match change.tag() {
            ChangeTag::Equal => SpanKind::Equal,
            ChangeTag::Insert => SpanKind::Insert,
            ChangeTag::Delete => SpanKind::Delete,
        };
        let value = change.value();
        match spans.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(value),
            _ => spans.push(DiffSpan {
                kind,
                text: value.to_string(),
            }),
        }
    }
    spans
}

/// True when a diff contains no insert/delete runs.
pub fn is_empty_diff(spans: &[DiffSpan]) -> bool {
    spans.iter().all(|s| s.kind == SpanKind::Equal)
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Aggregate change metrics between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct DiffSummary {
    pub chars_added: usize,
    pub chars_deleted: usize,
    pub lines_added: usize,
    pub lines_deleted: usize,
    /// 0 (identical) to 100 (fully rewritten).
    pub severity: u8,
}

impl DiffSummary {
    pub fn is_unchanged(&self) -> bool {
        self.chars_added == 0 && self.chars_deleted == 0
    }
}

/// Compute a [`DiffSummary`].
pub fn summary(old: &str, new: &str) -> DiffSummary {
    if is_identical(old, new) {
        return DiffSummary::default();
    }

    let mut chars_added = 0usize;
    let mut chars_deleted = 0usize;
    for span in detect(old, new) {
        match span.kind {
            SpanKind::Insert => chars_added += span.text.chars().count(),
            SpanKind::Delete => chars_deleted += span.text.chars().count(),
            SpanKind::Equal => {}
        }
    }

    let mut lines_added = 0usize;
    let mut lines_deleted = 0usize;
    for change in TextDiff::from_lines(old, new).iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => lines_added += 1,
            ChangeTag::Delete => lines_deleted += 1,
            ChangeTag::Equal => {}
        }
    }

    let larger = old.chars().count().max(new.chars().count()).max(1);
    let changed = chars_added.max(chars_deleted);
    let severity = ((changed * 100) / larger).min(100) as u8;

    DiffSummary {
        chars_added,
        chars_deleted,
        lines_added,
        lines_deleted,
        severity,
    }
}

// ---------------------------------------------------------------------------
// Line-level changeset
// ---------------------------------------------------------------------------

/// One changed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LineChange {
    Added {
        /// 0-based line number in the new version.
        line: usize,
        content: String,
    },
    Deleted {
        /// 0-based line number in the old version.
        line: usize,
        content: String,
    },
    Modified {
        /// 0-based line number in the old version.
        line: usize,
        old: String,
        new: String,
    },
}

/// Line-level changeset between two versions.
///
/// A deletion immediately followed by an insertion at the same position is
/// folded into a single `Modified` entry, so editing one checkbox mark
/// yields a changeset of length 1.
pub fn line_changes(old: &str, new: &str) -> Vec<LineChange> {
    let diff = TextDiff::from_lines(old, new);
    let mut changes: Vec<LineChange> = Vec::new();

    for change in diff.iter_all_changes() {
        let content = change.value().trim_end_matches('\n').to_string();
        match change.tag() {
            ChangeTag::Equal => {}
            ChangeTag::Delete => {
                changes.push(LineChange::Deleted {
                    line: change.old_index().unwrap_or(0),
                    content,
                });
            }
            ChangeTag::Insert => {
                let new_index = change.new_index().unwrap_or(0);
                // Fold delete+insert pairs into a modification.
                if let Some(LineChange::Deleted { line, content: old_content }) = changes.last() {
                    let (line, old_content) = (*line, old_content.clone());
                    changes.pop();
                    changes.push(LineChange::Modified {
                        line,
                        old: old_content,
                        new: content,
                    });
                } else {
                    changes.push(LineChange::Added {
                        line: new_index,
                        content,
                    });
                }
            }
        }
    }

    changes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
