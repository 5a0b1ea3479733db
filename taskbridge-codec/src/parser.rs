//! Tolerant line-oriented parser for the TODO document format.
//!
//! Parsing never fails: lines that do not match a heading or checkbox
//! pattern are ignored, malformed metadata markers are dropped with a debug
//! log, and a checkbox whose title is empty after metadata stripping is
//! skipped.

use chrono::{DateTime, NaiveDate, Utc};

use taskbridge_core::sanitize::sanitize_text;
use taskbridge_core::types::{Priority, Task, TaskId, TaskStatus};

use crate::frontmatter::{parse_front_matter, FrontMatter};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One task as it appears in the document, with its position retained for
/// line-targeted edits.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTask {
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub created_on: Option<NaiveDate>,
    pub completed_on: Option<NaiveDate>,
    pub section: Option<String>,
    /// 0-based line index in the parsed document.
    pub line: usize,
    /// Position among the checkboxes of its section.
    pub order: u32,
}

impl ParsedTask {
    /// Lift a parsed record into a full [`Task`] under a store-assigned id.
    pub fn to_task(&self, id: TaskId) -> Task {
        let created_at = self
            .created_on
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
            .unwrap_or_else(Utc::now);
        let completed_at = self
            .completed_on
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc));
        Task {
            id,
            title: self.title.clone(),
            status: self.status,
            priority: self.priority,
            due_date: self.due_date,
            tags: self.tags.clone(),
            section: self.section.clone(),
            order: Some(self.order),
            created_at,
            updated_at: Utc::now(),
            completed_at,
        }
    }
}

/// A heading and the line it sits on.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSpan {
    pub name: String,
    pub line: usize,
    pub priority: Priority,
}

/// Everything the parser extracts from one document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedDocument {
    pub front_matter: FrontMatter,
    pub sections: Vec<SectionSpan>,
    pub tasks: Vec<ParsedTask>,
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Parse a document. Never fails.
pub fn parse(input: &str) -> ParsedDocument {
    let lines: Vec<&str> = input.lines().collect();
    let (front_matter, body_start) = parse_front_matter(&lines);

    let mut doc = ParsedDocument {
        front_matter,
        ..ParsedDocument::default()
    };

    let mut section: Option<String> = None;
    let mut section_priority = Priority::Medium;
    let mut order_in_section = 0u32;

    for (line_no, raw) in lines.iter().enumerate().skip(body_start) {
        let line = raw.trim_end();

        if let Some(heading) = parse_heading(line) {
            let name = sanitize_text(heading);
            if name.is_empty() {
                continue;
            }
            section_priority = priority_for_section(&name);
            doc.sections.push(SectionSpan {
                name: name.clone(),
                line: line_no,
                priority: section_priority,
            });
            section = Some(name);
            order_in_section = 0;
            continue;
        }

        let Some((status, text)) = parse_checkbox(line) else {
            continue;
        };

        let (title, meta) = extract_metadata(text);
        let title = sanitize_text(&title);
        if title.is_empty() {
            tracing::debug!(line = line_no, "skipping checkbox with empty title");
            continue;
        }

        doc.tasks.push(ParsedTask {
            title,
            status,
            priority: meta.priority_override.unwrap_or(section_priority),
            due_date: meta.due,
            tags: meta.tags,
            created_on: meta.created,
            completed_on: meta.completed,
            section: section.clone(),
            line: line_no,
            order: order_in_section,
        });
        order_in_section += 1;
    }

    doc
}

/// `##`-style headings; the number of `#`s does not matter.
fn parse_heading(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let stripped = trimmed.trim_start_matches('#');
    // `#tag` on a checkbox never reaches here; a heading needs a space
    // between the hashes and the title.
    if !stripped.starts_with(' ') && !stripped.is_empty() {
        return None;
    }
    Some(stripped.trim())
}

/// `- [<mark>] <text>` with mark ∈ {space, `~`, `x`, `X`}.
fn parse_checkbox(line: &str) -> Option<(TaskStatus, &str)> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("- [")?;
    let mut chars = rest.chars();
    let mark = chars.next()?;
    let status = match mark {
        ' ' => TaskStatus::Todo,
        '~' => TaskStatus::InProgress,
        'x' | 'X' => TaskStatus::Completed,
        _ => return None,
    };
    let rest = chars.as_str().strip_prefix(']')?;
    Some((status, rest.trim_start()))
}

/// Map a section name to the priority it implies.
pub fn priority_for_section(name: &str) -> Priority {
    let lower = name.to_lowercase();
    if lower.contains("urgent") || lower.contains("critical") || name.contains('🔥') || name.contains('‼') {
        Priority::Critical
    } else if lower.contains("high") || lower.contains("important") || name.contains('⚡') {
        Priority::High
    } else if lower.contains("low")
        || lower.contains("later")
        || lower.contains("someday")
        || name.contains('🧊')
    {
        Priority::Low
    } else {
        Priority::Medium
    }
}

// ---------------------------------------------------------------------------
// Inline metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InlineMeta {
    tags: Vec<String>,
    due: Option<NaiveDate>,
    created: Option<NaiveDate>,
    completed: Option<NaiveDate>,
    priority_override: Option<Priority>,
}

/// Strip `(key: date)` markers, `#tag` tokens, and `!priority` overrides
/// from the task text, returning the cleaned title and the metadata.
fn extract_metadata(text: &str) -> (String, InlineMeta) {
    let mut meta = InlineMeta::default();

    // Pass 1: parenthesized date markers.
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('(') {
        let Some(close_rel) = rest[open..].find(')') else {
            break;
        };
        let close = open + close_rel;
        let inner = rest[open + 1..close].trim();
        let consumed = match inner.split_once(':') {
            Some((key, value)) => {
                let value = value.trim();
                match key.trim().to_lowercase().as_str() {
                    "created" => {
                        meta.created = parse_date(value);
                        true
                    }
                    "completed" => {
                        meta.completed = parse_date(value);
                        true
                    }
                    "due" => {
                        meta.due = parse_date(value);
                        true
                    }
                    _ => false,
                }
            }
            None => false,
        };
        if consumed {
            stripped.push_str(&rest[..open]);
        } else {
            stripped.push_str(&rest[..=close]);
        }
        rest = &rest[close + 1..];
    }
    stripped.push_str(rest);

    // Pass 2: whitespace tokens — tags and priority overrides.
    let mut title_tokens: Vec<&str> = Vec::new();
    for token in stripped.split_whitespace() {
        if let Some(tag) = token.strip_prefix('#') {
            if !tag.is_empty() {
                let tag = sanitize_text(tag);
                if !tag.is_empty() && !meta.tags.contains(&tag) {
                    meta.tags.push(tag);
                }
                continue;
            }
        }
        if let Some(name) = token.strip_prefix('!') {
            if let Some(priority) = parse_priority(name) {
                meta.priority_override = Some(priority);
                continue;
            }
        }
        title_tokens.push(token);
    }

    (title_tokens.join(" "), meta)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(err) => {
            tracing::debug!(value, error = %err, "dropping unparseable date marker");
            None
        }
    }
}

fn parse_priority(name: &str) -> Option<Priority> {
    match name.to_lowercase().as_str() {
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        "critical" => Some(Priority::Critical),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
