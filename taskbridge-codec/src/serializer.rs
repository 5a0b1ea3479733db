//! Deterministic serializer and line-targeted differential edits.
//!
//! Section ordering is fixed: the known sections first, in priority order,
//! then any remaining sections alphabetically. Tasks inside a section sort
//! by explicit order, then priority, then creation time, so serializing the
//! same task set always yields the same bytes.

use std::collections::BTreeMap;

use taskbridge_core::sanitize::sanitize_text;
use taskbridge_core::types::{Priority, Task, TaskStatus};

use crate::error::CodecError;
use crate::frontmatter::{render_front_matter, FrontMatter};
use crate::parser::{parse, priority_for_section};

/// Known sections, rendered in this order ahead of everything else.
pub const KNOWN_SECTIONS: [&str; 4] = ["🔥 Urgent", "⚡ High Priority", "📋 Tasks", "🧊 Someday"];

/// Where sectionless tasks land.
pub const DEFAULT_SECTION: &str = "📋 Tasks";

// ---------------------------------------------------------------------------
// Full-document serialization
// ---------------------------------------------------------------------------

/// Render a complete document from a task set.
pub fn serialize(tasks: &[Task]) -> String {
    serialize_with_front_matter(&FrontMatter::new(), tasks)
}

/// Render a complete document, preserving a front matter block.
pub fn serialize_with_front_matter(front: &FrontMatter, tasks: &[Task]) -> String {
    let mut by_section: BTreeMap<String, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        let section = task
            .section
            .as_deref()
            .map(sanitize_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SECTION.to_string());
        by_section.entry(section).or_default().push(task);
    }

    let mut names: Vec<&String> = by_section.keys().collect();
    names.sort_by_key(|name| section_rank(name));

    let mut out = render_front_matter(front);
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str("## ");
        out.push_str(name);
        out.push_str("\n\n");

        let mut section_tasks = by_section[*name].clone();
        section_tasks.sort_by(|a, b| {
            let a_key = (a.order.unwrap_or(u32::MAX), std::cmp::Reverse(a.priority.rank()), a.created_at);
            let b_key = (b.order.unwrap_or(u32::MAX), std::cmp::Reverse(b.priority.rank()), b.created_at);
            a_key.cmp(&b_key)
        });
        for task in section_tasks {
            out.push_str(&render_task_line(task));
            out.push('\n');
        }
    }
    out
}

/// Known sections rank by list position; unknown sections sort after them,
/// alphabetically.
fn section_rank(name: &str) -> (usize, String) {
    match KNOWN_SECTIONS.iter().position(|known| *known == name) {
        Some(i) => (i, String::new()),
        None => (KNOWN_SECTIONS.len(), name.to_string()),
    }
}

/// Render one checkbox line with inline metadata in fixed order:
/// priority marker, due date, created date, completed date, tags.
pub fn render_task_line(task: &Task) -> String {
    let mark = match task.status {
        TaskStatus::Todo => ' ',
        TaskStatus::InProgress => '~',
        TaskStatus::Completed => 'x',
    };
    let mut line = format!("- [{mark}] {}", sanitize_text(&task.title));

    // The section already implies a priority; only mark divergence.
    let section_priority = task
        .section
        .as_deref()
        .map(priority_for_section)
        .unwrap_or(Priority::Medium);
    if task.priority != section_priority {
        line.push_str(&format!(" !{}", task.priority));
    }

    if let Some(due) = task.due_date {
        line.push_str(&format!(" (due: {})", due.format("%Y-%m-%d")));
    }
    line.push_str(&format!(" (created: {})", task.created_at.format("%Y-%m-%d")));
    if let Some(completed) = task.completed_at {
        line.push_str(&format!(" (completed: {})", completed.format("%Y-%m-%d")));
    }
    for tag in &task.tags {
        let tag = sanitize_text(tag);
        if !tag.is_empty() {
            line.push_str(&format!(" #{}", tag.replace(' ', "-")));
        }
    }
    line
}

// ---------------------------------------------------------------------------
// Differential operations
// ---------------------------------------------------------------------------

/// Replace line `index` (0-based). An invalid index is a logged no-op.
pub fn replace_line(doc: &str, index: usize, new_line: &str) -> String {
    let mut lines: Vec<&str> = doc.lines().collect();
    if index >= lines.len() {
        tracing::warn!(index, total = lines.len(), "replace_line: index out of range");
        return doc.to_string();
    }
    lines[index] = new_line;
    rejoin(lines, doc)
}

/// Remove line `index` (0-based). An invalid index is a logged no-op.
pub fn remove_line(doc: &str, index: usize) -> String {
    let mut lines: Vec<&str> = doc.lines().collect();
    if index >= lines.len() {
        tracing::warn!(index, total = lines.len(), "remove_line: index out of range");
        return doc.to_string();
    }
    lines.remove(index);
    rejoin(lines, doc)
}

/// Insert a task under its section: after the last checkbox of that
/// section, or directly after the heading when the section has none. A
/// missing section is appended at the end of the document.
pub fn insert_task(doc: &str, task: &Task) -> String {
    let section = task
        .section
        .as_deref()
        .map(sanitize_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SECTION.to_string());
    let rendered = render_task_line(task);

    let lines: Vec<&str> = doc.lines().collect();
    let parsed = parse(doc);

    let heading_line = parsed
        .sections
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(&section))
        .map(|s| s.line);

    let Some(heading_line) = heading_line else {
        let mut out = doc.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("## {section}\n\n{rendered}\n"));
        return out;
    };

    // Last checkbox belonging to this section, else the heading itself.
    let section_end = parsed
        .sections
        .iter()
        .map(|s| s.line)
        .filter(|l| *l > heading_line)
        .min()
        .unwrap_or(lines.len());
    let insert_after = parsed
        .tasks
        .iter()
        .map(|t| t.line)
        .filter(|l| *l > heading_line && *l < section_end)
        .max()
        .unwrap_or(heading_line);

    let mut out_lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    out_lines.insert(insert_after + 1, rendered);
    let mut out = out_lines.join("\n");
    if doc.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn rejoin(lines: Vec<&str>, original: &str) -> String {
    let mut out = lines.join("\n");
    if original.ends_with('\n') {
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Rendered-output validation
// ---------------------------------------------------------------------------

/// Parse a rendered document back and confirm the expected task set
/// survived. A failure here is fatal for the sync attempt: the file must
/// not be written.
pub fn validate_rendered(rendered: &str, expected: &[Task]) -> Result<(), CodecError> {
    let parsed = parse(rendered);
    if parsed.tasks.len() != expected.len() {
        return Err(CodecError::ValidationFailed {
            reason: format!(
                "rendered {} tasks, expected {}",
                parsed.tasks.len(),
                expected.len()
            ),
        });
    }
    for task in expected {
        let title = sanitize_text(&task.title);
        let found = parsed.tasks.iter().find(|p| p.title == title);
        let Some(found) = found else {
            return Err(CodecError::ValidationFailed {
                reason: format!("task '{title}' missing from rendered output"),
            });
        };
        if found.status != task.status {
            return Err(CodecError::ValidationFailed {
                reason: format!("task '{title}' status changed in rendered output"),
            });
        }
        if found.priority != task.priority {
            return Err(CodecError::ValidationFailed {
                reason: format!("task '{title}' priority changed in rendered output"),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
