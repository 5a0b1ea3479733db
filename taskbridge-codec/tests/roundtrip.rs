//! Round-trip property: `parse(serialize(tasks))` preserves titles, status,
//! priority, and tags for any non-empty task set.

use chrono::{NaiveDate, TimeZone, Utc};

use taskbridge_codec::{parse, serialize, serialize_with_front_matter};
use taskbridge_core::types::{Priority, Task, TaskStatus};

fn build(id: &str, title: &str, status: TaskStatus, priority: Priority, tags: &[&str]) -> Task {
    let mut task = Task::new(id, title);
    task.status = status;
    task.priority = priority;
    task.tags = tags.iter().map(|t| t.to_string()).collect();
    task.created_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    task.updated_at = task.created_at;
    if status == TaskStatus::Completed {
        task.completed_at = Some(Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap());
    }
    task
}

#[test]
fn roundtrip_preserves_core_fields() {
    let tasks = vec![
        build("1", "Buy milk", TaskStatus::Todo, Priority::Critical, &["errand"]),
        build("2", "Write report", TaskStatus::InProgress, Priority::High, &["work", "q1"]),
        build("3", "File taxes", TaskStatus::Completed, Priority::Medium, &[]),
        build("4", "Learn sourdough", TaskStatus::Todo, Priority::Low, &["kitchen"]),
    ];

    let doc = serialize(&tasks);
    let parsed = parse(&doc);
    assert_eq!(parsed.tasks.len(), tasks.len());

    for task in &tasks {
        let found = parsed
            .tasks
            .iter()
            .find(|p| p.title == task.title)
            .unwrap_or_else(|| panic!("task '{}' lost in round trip", task.title));
        assert_eq!(found.status, task.status, "status for '{}'", task.title);
        assert_eq!(found.priority, task.priority, "priority for '{}'", task.title);
        assert_eq!(found.tags, task.tags, "tags for '{}'", task.title);
    }
}

#[test]
fn roundtrip_preserves_sections_and_due_dates() {
    let mut task = build("1", "Ship v2", TaskStatus::Todo, Priority::High, &["release"]);
    task.section = Some("⚡ High Priority".to_string());
    task.due_date = NaiveDate::from_ymd_opt(2026, 6, 1);

    let doc = serialize(&[task.clone()]);
    let parsed = parse(&doc);
    let found = &parsed.tasks[0];
    assert_eq!(found.section.as_deref(), Some("⚡ High Priority"));
    assert_eq!(found.due_date, task.due_date);
}

#[test]
fn roundtrip_is_stable_after_one_pass() {
    // serialize → parse → serialize must converge on identical bytes.
    let tasks = vec![
        build("1", "alpha", TaskStatus::Todo, Priority::Medium, &["x"]),
        build("2", "beta", TaskStatus::Completed, Priority::Low, &[]),
    ];
    let first = serialize(&tasks);
    let reparsed: Vec<Task> = parse(&first)
        .tasks
        .iter()
        .enumerate()
        .map(|(i, p)| p.to_task(format!("t-{i}").into()))
        .collect();
    let second = serialize(&reparsed);
    assert_eq!(first, second);
}

#[test]
fn front_matter_survives_a_full_cycle() {
    let mut front = taskbridge_codec::frontmatter::FrontMatter::new();
    front.insert("autosync".to_string(), serde_yaml::Value::from(true));

    let tasks = vec![build("1", "solo", TaskStatus::Todo, Priority::Medium, &[])];
    let doc = serialize_with_front_matter(&front, &tasks);
    let parsed = parse(&doc);
    assert_eq!(parsed.front_matter, front);
    assert_eq!(parsed.tasks.len(), 1);
}
