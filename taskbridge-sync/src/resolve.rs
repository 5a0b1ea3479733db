//! Conflict resolution policies on top of the three-way merger.
//!
//! Four policies: `prefer_file`, `prefer_app`, `manual` (newer side wins
//! provisionally, flagged for review with a structured field-by-field
//! record), and `merge` (the merger's intelligent mode). A suggestion
//! function recommends a policy from timestamp deltas and conflict counts,
//! and batch resolution accumulates per-method / per-kind statistics.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use taskbridge_core::types::{Conflict, ConflictSeverity, ResolutionStrategy, Task};

use crate::merge::{merge_three_way, FallbackSide, MergeField};

// ---------------------------------------------------------------------------
// Resolution types
// ---------------------------------------------------------------------------

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub conflict_id: String,
    pub task: Task,
    pub method: ResolutionStrategy,
    /// True when a human should confirm the provisional result.
    pub needs_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ManualReviewRecord>,
}

/// One conflicting field with both values and a suggested pick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSuggestion {
    pub field: &'static str,
    pub severity: ConflictSeverity,
    pub file_value: Value,
    pub app_value: Value,
    pub suggested: Value,
    /// Which side the suggestion came from (`"file"` or `"app"`).
    pub prefer: &'static str,
}

/// Structured record emitted for manual review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualReviewRecord {
    pub conflict_id: String,
    pub task_id: String,
    pub fields: Vec<FieldSuggestion>,
    pub suggested_strategy: ResolutionStrategy,
}

/// A recommended policy with confidence and ranked alternatives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySuggestion {
    pub strategy: ResolutionStrategy,
    /// 0.0–1.0.
    pub confidence: f64,
    pub reason: String,
    pub alternatives: Vec<ResolutionStrategy>,
}

/// Aggregate statistics from a batch resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct BatchStats {
    pub total: usize,
    pub auto_resolved: usize,
    pub needs_review: usize,
    pub by_method: HashMap<String, usize>,
    pub by_kind: HashMap<String, usize>,
    /// Percentage of conflicts resolved without review, 0–100.
    pub auto_resolved_pct: f64,
}

/// Batch result: resolutions in input order plus statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub resolutions: Vec<Resolution>,
    pub stats: BatchStats,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Applies resolution policies to conflicts.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    default_strategy: ResolutionStrategy,
}

impl ConflictResolver {
    pub fn new(default_strategy: ResolutionStrategy) -> Self {
        Self { default_strategy }
    }

    /// Resolve one conflict under a policy.
    pub fn resolve(&self, conflict: &Conflict, strategy: ResolutionStrategy) -> Resolution {
        match strategy {
            ResolutionStrategy::PreferFile => Resolution {
                conflict_id: conflict.id.clone(),
                task: conflict.file_version.clone(),
                method: strategy,
                needs_review: false,
                review: None,
            },
            ResolutionStrategy::PreferApp => Resolution {
                conflict_id: conflict.id.clone(),
                task: conflict.app_version.clone(),
                method: strategy,
                needs_review: false,
                review: None,
            },
            ResolutionStrategy::Manual => {
                let file_newer =
                    conflict.file_version.updated_at >= conflict.app_version.updated_at;
                let task = if file_newer {
                    conflict.file_version.clone()
                } else {
                    conflict.app_version.clone()
                };
                Resolution {
                    conflict_id: conflict.id.clone(),
                    task,
                    method: strategy,
                    needs_review: true,
                    review: Some(self.review_record(conflict, file_newer)),
                }
            }
            ResolutionStrategy::Merge => {
                // Without an ancestor, treat the app version as the base so
                // file-side edits read as one-sided changes.
                let base = conflict
                    .base_version
                    .clone()
                    .unwrap_or_else(|| conflict.app_version.clone());
                let outcome = merge_three_way(
                    &base,
                    &conflict.file_version,
                    &conflict.app_version,
                    FallbackSide::Manual,
                );
                let needs_review = !outcome.fully_resolved();
                let file_newer =
                    conflict.file_version.updated_at >= conflict.app_version.updated_at;
                Resolution {
                    conflict_id: conflict.id.clone(),
                    task: outcome.merged,
                    method: strategy,
                    needs_review,
                    review: needs_review.then(|| self.review_record(conflict, file_newer)),
                }
            }
        }
    }

    /// Every field where file and app actually differ, with both values and
    /// the newer side as the suggestion.
    fn review_record(&self, conflict: &Conflict, file_newer: bool) -> ManualReviewRecord {
        let mut fields = Vec::new();
        for field in MergeField::ALL {
            let file_value = field.value_of(&conflict.file_version);
            let app_value = field.value_of(&conflict.app_version);
            if values_equal(&file_value, &app_value) {
                continue;
            }
            let (suggested, prefer) = if file_newer {
                (file_value.clone(), "file")
            } else {
                (app_value.clone(), "app")
            };
            fields.push(FieldSuggestion {
                field: field.name(),
                severity: field.severity(),
                file_value,
                app_value,
                suggested,
                prefer,
            });
        }
        ManualReviewRecord {
            conflict_id: conflict.id.clone(),
            task_id: conflict.task_id.to_string(),
            fields,
            suggested_strategy: self.suggest(conflict).strategy,
        }
    }

    /// Recommend a policy from the timestamp delta and conflict size.
    pub fn suggest(&self, conflict: &Conflict) -> StrategySuggestion {
        let file_at = conflict.file_version.updated_at;
        let app_at = conflict.app_version.updated_at;
        let delta = (file_at - app_at).abs();
        let conflicting = MergeField::ALL
            .iter()
            .filter(|f| {
                !values_equal(
                    &f.value_of(&conflict.file_version),
                    &f.value_of(&conflict.app_version),
                )
            })
            .count();

        // One side clearly newer: prefer it, more confidently the wider the gap.
        if delta > chrono::Duration::hours(1) {
            let (strategy, side) = if file_at > app_at {
                (ResolutionStrategy::PreferFile, "file")
            } else {
                (ResolutionStrategy::PreferApp, "app")
            };
            let confidence = if delta > chrono::Duration::days(1) { 0.9 } else { 0.75 };
            return StrategySuggestion {
                strategy,
                confidence,
                reason: format!(
                    "{side} version is {}h newer ({conflicting} conflicting field(s))",
                    delta.num_hours()
                ),
                alternatives: vec![ResolutionStrategy::Merge, ResolutionStrategy::Manual],
            };
        }

        // Near-simultaneous edits: few fields merge cleanly, many need a human.
        if conflicting <= 2 {
            StrategySuggestion {
                strategy: ResolutionStrategy::Merge,
                confidence: 0.7,
                reason: format!(
                    "edits are near-simultaneous and only {conflicting} field(s) diverge"
                ),
                alternatives: vec![ResolutionStrategy::Manual],
            }
        } else {
            StrategySuggestion {
                strategy: ResolutionStrategy::Manual,
                confidence: 0.6,
                reason: format!("{conflicting} fields diverge with no clear winner"),
                alternatives: vec![ResolutionStrategy::Merge],
            }
        }
    }

    /// Resolve many conflicts, accumulating statistics.
    pub fn resolve_batch(
        &self,
        conflicts: &[Conflict],
        strategy: Option<ResolutionStrategy>,
    ) -> BatchOutcome {
        let strategy = strategy.unwrap_or(self.default_strategy);
        let mut resolutions = Vec::with_capacity(conflicts.len());
        let mut stats = BatchStats {
            total: conflicts.len(),
            ..BatchStats::default()
        };

        for conflict in conflicts {
            let resolution = self.resolve(conflict, strategy);
            *stats
                .by_method
                .entry(resolution.method.to_string())
                .or_insert(0) += 1;
            *stats.by_kind.entry(conflict.kind.to_string()).or_insert(0) += 1;
            if resolution.needs_review {
                stats.needs_review += 1;
            } else {
                stats.auto_resolved += 1;
            }
            resolutions.push(resolution);
        }

        stats.auto_resolved_pct = if stats.total == 0 {
            100.0
        } else {
            stats.auto_resolved as f64 * 100.0 / stats.total as f64
        };

        BatchOutcome { resolutions, stats }
    }
}

// ---------------------------------------------------------------------------
// Deep value equality
// ---------------------------------------------------------------------------

/// Structural equality over JSON values: null-aware, order-sensitive for
/// arrays, recursive for objects, and instant-based for RFC 3339 strings
/// (`2026-01-01T00:00:00Z` equals `2026-01-01T01:00:00+01:00`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map(|y| values_equal(x, y)).unwrap_or(false))
        }
        (Value::String(x), Value::String(y)) => {
            if x == y {
                return true;
            }
            match (
                chrono::DateTime::parse_from_rfc3339(x),
                chrono::DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(dx), Ok(dy)) => dx == dy,
                _ => false,
            }
        }
        (Value::Number(x), Value::Number(y)) => {
            x == y || x.as_f64().zip(y.as_f64()).map(|(a, b)| a == b).unwrap_or(false)
        }
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use taskbridge_core::types::{ConflictKind, TaskId, TaskStatus};

    fn conflict_with(file_title: &str, app_title: &str) -> Conflict {
        let mut file = Task::new("t-1", file_title);
        file.updated_at = Utc::now();
        let mut app = Task::new("t-1", app_title);
        app.updated_at = Utc::now() - Duration::minutes(10);
        let base = Task::new("t-1", "Original");
        Conflict {
            id: "conflict-1".to_string(),
            task_id: TaskId::from("t-1"),
            file_version: file,
            app_version: app,
            base_version: Some(base),
            kind: ConflictKind::Content,
            detected_at: Utc::now(),
            resolved: false,
            resolution: None,
        }
    }

    #[test]
    fn prefer_file_always_returns_file_version() {
        let resolver = ConflictResolver::new(ResolutionStrategy::Merge);
        let conflict = conflict_with("file wins", "app loses");
        let resolution = resolver.resolve(&conflict, ResolutionStrategy::PreferFile);
        assert_eq!(resolution.task, conflict.file_version);
        assert!(!resolution.needs_review);
    }

    #[test]
    fn prefer_app_always_returns_app_version() {
        let resolver = ConflictResolver::new(ResolutionStrategy::Merge);
        let conflict = conflict_with("file loses", "app wins");
        let resolution = resolver.resolve(&conflict, ResolutionStrategy::PreferApp);
        assert_eq!(resolution.task, conflict.app_version);
    }

    #[test]
    fn manual_keeps_newer_side_and_emits_review_record() {
        let resolver = ConflictResolver::new(ResolutionStrategy::Merge);
        let conflict = conflict_with("newer file", "older app");
        let resolution = resolver.resolve(&conflict, ResolutionStrategy::Manual);

        assert_eq!(resolution.task.title, "newer file");
        assert!(resolution.needs_review);
        let review = resolution.review.expect("review record");
        let title_field = review
            .fields
            .iter()
            .find(|f| f.field == "title")
            .expect("title suggestion");
        assert_eq!(title_field.file_value, json!("newer file"));
        assert_eq!(title_field.app_value, json!("older app"));
        assert_eq!(title_field.prefer, "file");
    }

    #[test]
    fn merge_policy_delegates_to_intelligent_merge() {
        let resolver = ConflictResolver::new(ResolutionStrategy::Merge);
        let mut conflict = conflict_with("same", "same");
        conflict.file_version.status = TaskStatus::InProgress;
        conflict.app_version.status = TaskStatus::Completed;
        // Base status is Todo: both sides progressed divergently.
        let resolution = resolver.resolve(&conflict, ResolutionStrategy::Merge);
        assert_eq!(resolution.task.status, TaskStatus::Completed);
        assert!(!resolution.needs_review, "progression rule settles it");
    }

    #[test]
    fn suggestion_prefers_clearly_newer_side() {
        let resolver = ConflictResolver::new(ResolutionStrategy::Merge);
        let mut conflict = conflict_with("file", "app");
        conflict.file_version.updated_at = Utc::now();
        conflict.app_version.updated_at = Utc::now() - Duration::days(3);

        let suggestion = resolver.suggest(&conflict);
        assert_eq!(suggestion.strategy, ResolutionStrategy::PreferFile);
        assert!(suggestion.confidence >= 0.9);
        assert!(!suggestion.alternatives.is_empty());
    }

    #[test]
    fn suggestion_prefers_merge_for_small_simultaneous_divergence() {
        let resolver = ConflictResolver::new(ResolutionStrategy::Merge);
        let now = Utc::now();
        let mut conflict = conflict_with("file", "app");
        conflict.file_version.updated_at = now;
        conflict.app_version.updated_at = now - Duration::minutes(5);

        let suggestion = resolver.suggest(&conflict);
        assert_eq!(suggestion.strategy, ResolutionStrategy::Merge);
    }

    #[test]
    fn suggestion_prefers_manual_for_wide_divergence() {
        let resolver = ConflictResolver::new(ResolutionStrategy::Merge);
        let now = Utc::now();
        let mut conflict = conflict_with("file title", "app title");
        conflict.file_version.updated_at = now;
        conflict.app_version.updated_at = now - Duration::minutes(5);
        conflict.file_version.status = TaskStatus::Completed;
        conflict.file_version.tags = vec!["x".to_string()];
        conflict.app_version.section = Some("Elsewhere".to_string());

        let suggestion = resolver.suggest(&conflict);
        assert_eq!(suggestion.strategy, ResolutionStrategy::Manual);
    }

    #[test]
    fn batch_accumulates_method_and_kind_stats() {
        let resolver = ConflictResolver::new(ResolutionStrategy::PreferFile);
        let mut deletion = conflict_with("a", "b");
        deletion.kind = ConflictKind::Deletion;
        let conflicts = vec![conflict_with("x", "y"), deletion];

        let outcome = resolver.resolve_batch(&conflicts, None);
        assert_eq!(outcome.stats.total, 2);
        assert_eq!(outcome.stats.auto_resolved, 2);
        assert_eq!(outcome.stats.by_method["prefer_file"], 2);
        assert_eq!(outcome.stats.by_kind["content"], 1);
        assert_eq!(outcome.stats.by_kind["deletion"], 1);
        assert_eq!(outcome.stats.auto_resolved_pct, 100.0);
    }

    #[test]
    fn empty_batch_reports_full_auto_resolution() {
        let resolver = ConflictResolver::new(ResolutionStrategy::Merge);
        let outcome = resolver.resolve_batch(&[], None);
        assert_eq!(outcome.stats.auto_resolved_pct, 100.0);
    }

    #[test]
    fn values_equal_handles_null_arrays_dates_and_objects() {
        assert!(values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&Value::Null, &json!("x")));

        assert!(values_equal(&json!([1, 2]), &json!([1, 2])));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])), "order-sensitive");

        assert!(values_equal(
            &json!("2026-01-01T00:00:00Z"),
            &json!("2026-01-01T01:00:00+01:00")
        ));
        assert!(!values_equal(
            &json!("2026-01-01T00:00:00Z"),
            &json!("2026-01-01T00:00:01Z")
        ));

        assert!(values_equal(
            &json!({"a": [1], "b": {"c": null}}),
            &json!({"b": {"c": null}, "a": [1]})
        ));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }
}
