//! `taskbridge conflicts` and `taskbridge resolve`.

use anyhow::{Context, Result};
use colored::Colorize;

use taskbridge_core::config::SyncConfig;
use taskbridge_core::types::ResolutionStrategy;

use crate::build_coordinator;

pub async fn list(config: SyncConfig, json: bool) -> Result<()> {
    let coordinator = build_coordinator(config).await?;
    let conflicts = coordinator.unresolved_conflicts();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&conflicts).context("serializing conflicts")?
        );
        return Ok(());
    }
    if conflicts.is_empty() {
        println!("{} no unresolved conflicts", "✓".green());
        return Ok(());
    }

    for conflict in &conflicts {
        println!(
            "{} {} conflict on '{}' ({})",
            "⚠".yellow(),
            conflict.kind,
            conflict.app_version.title.bold(),
            conflict.id,
        );
        println!("    file: {}", summarize(&conflict.file_version));
        println!("    app:  {}", summarize(&conflict.app_version));
    }
    println!(
        "\nResolve with: taskbridge resolve <id> --strategy prefer_file|prefer_app|manual|merge"
    );
    Ok(())
}

pub async fn resolve(
    config: SyncConfig,
    conflict_id: String,
    strategy: ResolutionStrategy,
) -> Result<()> {
    let coordinator = build_coordinator(config).await?;
    let resolution = coordinator
        .resolve_conflict(&conflict_id, strategy)
        .await
        .with_context(|| format!("resolving conflict '{conflict_id}'"))?;

    println!(
        "{} resolved '{}' via {}",
        "✓".green(),
        resolution.task.title,
        resolution.method,
    );
    Ok(())
}

fn summarize(task: &taskbridge_core::types::Task) -> String {
    format!(
        "'{}' [{} {}]{}",
        task.title,
        task.status,
        task.priority,
        task.due_date
            .map(|d| format!(" due {d}"))
            .unwrap_or_default(),
    )
}
