//! Three-way field-level merge.
//!
//! Given the base (last-synced ancestor), file, and app versions of one
//! task, each mergeable field is classified independently:
//!
//! - file and app agree → take the shared value, even if both changed;
//! - only one side differs from base → take that side (auto-merge);
//! - both differ from base *and* from each other → conflict.
//!
//! Conflicting fields are settled by type-specific rules (tags union,
//! more-progressed status, higher priority, earlier due date); scalar
//! fields without a natural rule fall back to the configured side. A
//! `Manual` fallback takes the newer-by-`updated_at` side but leaves the
//! conflict unresolved for review.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use taskbridge_core::types::{ConflictSeverity, Task, TaskStatus};

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// The fields the merger compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeField {
    Title,
    Status,
    Priority,
    DueDate,
    Tags,
    Order,
    Section,
}

impl MergeField {
    pub const ALL: [MergeField; 7] = [
        MergeField::Title,
        MergeField::Status,
        MergeField::Priority,
        MergeField::DueDate,
        MergeField::Tags,
        MergeField::Order,
        MergeField::Section,
    ];

    /// Static severity classification per field.
    pub fn severity(self) -> ConflictSeverity {
        match self {
            MergeField::Title | MergeField::Status => ConflictSeverity::High,
            MergeField::Priority | MergeField::DueDate => ConflictSeverity::Medium,
            MergeField::Tags | MergeField::Order | MergeField::Section => ConflictSeverity::Low,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MergeField::Title => "title",
            MergeField::Status => "status",
            MergeField::Priority => "priority",
            MergeField::DueDate => "due_date",
            MergeField::Tags => "tags",
            MergeField::Order => "order",
            MergeField::Section => "section",
        }
    }

    /// JSON projection of this field, for conflict records and reports.
    pub fn value_of(self, task: &Task) -> Value {
        match self {
            MergeField::Title => json!(task.title),
            MergeField::Status => json!(task.status),
            MergeField::Priority => json!(task.priority),
            MergeField::DueDate => json!(task.due_date),
            MergeField::Tags => json!(task.tags),
            MergeField::Order => json!(task.order),
            MergeField::Section => json!(task.section),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Which side settles a conflicting scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackSide {
    File,
    App,
    /// Take the newer side but leave the conflict unresolved for review.
    Manual,
}

/// Strategy the merge actually used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategyUsed {
    /// No conflicting fields; pure auto-merge.
    Automatic,
    /// At least one conflict settled by type-specific rules or fallback.
    Intelligent,
}

/// One conflicting field with both values and how (whether) it was settled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConflict {
    pub field: MergeField,
    pub severity: ConflictSeverity,
    pub base: Value,
    pub file: Value,
    pub app: Value,
    /// Value the merge chose; meaningful even when unresolved (the
    /// provisional newer-side value).
    pub resolved_with: Value,
    /// False when the fallback was `Manual` and a human should confirm.
    pub resolved: bool,
}

/// Per-field classification, for observability and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct MergeReport {
    pub changed_file_only: Vec<&'static str>,
    pub changed_app_only: Vec<&'static str>,
    pub changed_both: Vec<&'static str>,
    pub unchanged: Vec<&'static str>,
    pub auto_merged: Vec<&'static str>,
}

/// Result of merging one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeOutcome {
    pub merged: Task,
    pub conflicts: Vec<FieldConflict>,
    pub strategy: MergeStrategyUsed,
    pub report: MergeReport,
}

impl MergeOutcome {
    /// True when every conflicting field was settled without review.
    pub fn fully_resolved(&self) -> bool {
        self.conflicts.iter().all(|c| c.resolved)
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

enum FieldDecision<T> {
    Unchanged(T),
    FileOnly(T),
    AppOnly(T),
    BothAgree(T),
    Conflict,
}

fn classify<T: PartialEq + Clone>(base: &T, file: &T, app: &T) -> FieldDecision<T> {
    if file == app {
        if file == base {
            FieldDecision::Unchanged(file.clone())
        } else {
            FieldDecision::BothAgree(file.clone())
        }
    } else if file == base {
        FieldDecision::AppOnly(app.clone())
    } else if app == base {
        FieldDecision::FileOnly(file.clone())
    } else {
        FieldDecision::Conflict
    }
}

/// Merge one task three ways.
///
/// `base` is the last mutually-synchronized snapshot; `file` and `app` are
/// the divergent edits. `fallback` settles conflicting scalar fields that
/// have no type-specific rule.
pub fn merge_three_way(
    base: &Task,
    file: &Task,
    app: &Task,
    fallback: FallbackSide,
) -> MergeOutcome {
    let mut merged = app.clone();
    // Identity and bookkeeping come from the app side: the store owns ids.
    merged.created_at = base.created_at.min(file.created_at).min(app.created_at);
    merged.updated_at = file.updated_at.max(app.updated_at);

    let mut conflicts = Vec::new();
    let mut report = MergeReport::default();
    let file_newer = file.updated_at >= app.updated_at;

    for field in MergeField::ALL {
        let settled = merge_field(field, base, file, app, fallback, file_newer, &mut merged);
        match settled {
            Settled::Unchanged => report.unchanged.push(field.name()),
            Settled::FileOnly => {
                report.changed_file_only.push(field.name());
                report.auto_merged.push(field.name());
            }
            Settled::AppOnly => {
                report.changed_app_only.push(field.name());
                report.auto_merged.push(field.name());
            }
            Settled::BothAgree => report.changed_both.push(field.name()),
            Settled::Conflict(resolution) => {
                report.changed_both.push(field.name());
                conflicts.push(FieldConflict {
                    field,
                    severity: field.severity(),
                    base: field.value_of(base),
                    file: field.value_of(file),
                    app: field.value_of(app),
                    resolved_with: field.value_of(&merged),
                    resolved: resolution,
                });
            }
        }
    }

    // A merge that lands on completed needs a completion timestamp.
    if merged.status == TaskStatus::Completed {
        merged.completed_at = merged
            .completed_at
            .or(file.completed_at)
            .or(app.completed_at)
            .or_else(|| Some(Utc::now()));
    } else {
        merged.completed_at = None;
    }

    let strategy = if conflicts.is_empty() {
        MergeStrategyUsed::Automatic
    } else {
        MergeStrategyUsed::Intelligent
    };

    MergeOutcome {
        merged,
        conflicts,
        strategy,
        report,
    }
}

enum Settled {
    Unchanged,
    FileOnly,
    AppOnly,
    BothAgree,
    /// Conflict; payload is whether a rule/fallback fully resolved it.
    Conflict(bool),
}

fn merge_field(
    field: MergeField,
    base: &Task,
    file: &Task,
    app: &Task,
    fallback: FallbackSide,
    file_newer: bool,
    merged: &mut Task,
) -> Settled {
    match field {
        MergeField::Title => {
            match classify(&base.title, &file.title, &app.title) {
                FieldDecision::Unchanged(v) => { merged.title = v; Settled::Unchanged }
                FieldDecision::BothAgree(v) => { merged.title = v; Settled::BothAgree }
                FieldDecision::FileOnly(v) => { merged.title = v; Settled::FileOnly }
                FieldDecision::AppOnly(v) => { merged.title = v; Settled::AppOnly }
                FieldDecision::Conflict => {
                    let (value, resolved) =
                        scalar_fallback(&file.title, &app.title, fallback, file_newer);
                    merged.title = value;
                    Settled::Conflict(resolved)
                }
            }
        }
        MergeField::Status => {
            match classify(&base.status, &file.status, &app.status) {
                FieldDecision::Unchanged(v) => { merged.status = v; Settled::Unchanged }
                FieldDecision::BothAgree(v) => { merged.status = v; Settled::BothAgree }
                FieldDecision::FileOnly(v) => { merged.status = v; Settled::FileOnly }
                FieldDecision::AppOnly(v) => { merged.status = v; Settled::AppOnly }
                FieldDecision::Conflict => {
                    // More-progressed state wins.
                    merged.status = if file.status.rank() >= app.status.rank() {
                        file.status
                    } else {
                        app.status
                    };
                    Settled::Conflict(true)
                }
            }
        }
        MergeField::Priority => {
            match classify(&base.priority, &file.priority, &app.priority) {
                FieldDecision::Unchanged(v) => { merged.priority = v; Settled::Unchanged }
                FieldDecision::BothAgree(v) => { merged.priority = v; Settled::BothAgree }
                FieldDecision::FileOnly(v) => { merged.priority = v; Settled::FileOnly }
                FieldDecision::AppOnly(v) => { merged.priority = v; Settled::AppOnly }
                FieldDecision::Conflict => {
                    // Higher severity wins.
                    merged.priority = if file.priority.rank() >= app.priority.rank() {
                        file.priority
                    } else {
                        app.priority
                    };
                    Settled::Conflict(true)
                }
            }
        }
        MergeField::DueDate => {
            match classify(&base.due_date, &file.due_date, &app.due_date) {
                FieldDecision::Unchanged(v) => { merged.due_date = v; Settled::Unchanged }
                FieldDecision::BothAgree(v) => { merged.due_date = v; Settled::BothAgree }
                FieldDecision::FileOnly(v) => { merged.due_date = v; Settled::FileOnly }
                FieldDecision::AppOnly(v) => { merged.due_date = v; Settled::AppOnly }
                FieldDecision::Conflict => {
                    // Earlier (more urgent) date wins; a concrete date beats
                    // a cleared one.
                    merged.due_date = match (file.due_date, app.due_date) {
                        (Some(f), Some(a)) => Some(f.min(a)),
                        (Some(f), None) => Some(f),
                        (None, Some(a)) => Some(a),
                        (None, None) => None,
                    };
                    Settled::Conflict(true)
                }
            }
        }
        MergeField::Tags => {
            match classify(&base.tags, &file.tags, &app.tags) {
                FieldDecision::Unchanged(v) => { merged.tags = v; Settled::Unchanged }
                FieldDecision::BothAgree(v) => { merged.tags = v; Settled::BothAgree }
                FieldDecision::FileOnly(v) => { merged.tags = v; Settled::FileOnly }
                FieldDecision::AppOnly(v) => { merged.tags = v; Settled::AppOnly }
                FieldDecision::Conflict => {
                    // Order-preserving union: file order, then app extras.
                    let mut union = file.tags.clone();
                    for tag in &app.tags {
                        if !union.contains(tag) {
                            union.push(tag.clone());
                        }
                    }
                    merged.tags = union;
                    Settled::Conflict(true)
                }
            }
        }
        MergeField::Order => {
            match classify(&base.order, &file.order, &app.order) {
                FieldDecision::Unchanged(v) => { merged.order = v; Settled::Unchanged }
                FieldDecision::BothAgree(v) => { merged.order = v; Settled::BothAgree }
                FieldDecision::FileOnly(v) => { merged.order = v; Settled::FileOnly }
                FieldDecision::AppOnly(v) => { merged.order = v; Settled::AppOnly }
                FieldDecision::Conflict => {
                    let (value, resolved) =
                        scalar_fallback(&file.order, &app.order, fallback, file_newer);
                    merged.order = value;
                    Settled::Conflict(resolved)
                }
            }
        }
        MergeField::Section => {
            match classify(&base.section, &file.section, &app.section) {
                FieldDecision::Unchanged(v) => { merged.section = v; Settled::Unchanged }
                FieldDecision::BothAgree(v) => { merged.section = v; Settled::BothAgree }
                FieldDecision::FileOnly(v) => { merged.section = v; Settled::FileOnly }
                FieldDecision::AppOnly(v) => { merged.section = v; Settled::AppOnly }
                FieldDecision::Conflict => {
                    let (value, resolved) =
                        scalar_fallback(&file.section, &app.section, fallback, file_newer);
                    merged.section = value;
                    Settled::Conflict(resolved)
                }
            }
        }
    }
}

fn scalar_fallback<T: Clone>(
    file: &T,
    app: &T,
    fallback: FallbackSide,
    file_newer: bool,
) -> (T, bool) {
    match fallback {
        FallbackSide::File => (file.clone(), true),
        FallbackSide::App => (app.clone(), true),
        FallbackSide::Manual => {
            let value = if file_newer { file.clone() } else { app.clone() };
            (value, false)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
