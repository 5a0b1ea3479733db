//! `taskbridge status` and `taskbridge history`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use taskbridge_core::config::SyncConfig;

use crate::build_coordinator;

/// Arguments for `taskbridge status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub async fn run(self, config: SyncConfig) -> Result<()> {
        let coordinator = build_coordinator(config).await?;
        let status = coordinator.status();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("serializing status")?
            );
            return Ok(());
        }

        println!("{}", "taskbridge status".bold());
        println!("  document:   {}", status.file_path.display());
        println!("  state:      {}", status.state);
        println!(
            "  breakers:   read={} write={}",
            status.read_breaker, status.write_breaker
        );
        println!("  conflicts:  {} unresolved", status.unresolved_conflicts);

        let stats = &status.statistics;
        println!(
            "  syncs:      {} total ({} ok, {} failed), avg {:.0}ms",
            stats.total_syncs, stats.successful_syncs, stats.failed_syncs, stats.average_duration_ms
        );
        println!(
            "  conflicts:  {} auto-resolved, {} manually resolved",
            stats.conflicts_auto_resolved, stats.conflicts_manually_resolved
        );
        Ok(())
    }
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "when")]
    when: String,
    #[tabled(rename = "direction")]
    direction: String,
    #[tabled(rename = "±tasks")]
    changed: String,
    #[tabled(rename = "conflicts")]
    conflicts: usize,
    #[tabled(rename = "result")]
    result: String,
}

pub async fn history(config: SyncConfig, limit: usize, json: bool) -> Result<()> {
    let coordinator = build_coordinator(config).await?;
    let entries: Vec<_> = coordinator.history().into_iter().take(limit).collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("serializing history")?
        );
        return Ok(());
    }
    if entries.is_empty() {
        println!("No sync history yet. Run `taskbridge sync` first.");
        return Ok(());
    }

    let rows: Vec<HistoryRow> = entries
        .iter()
        .map(|e| HistoryRow {
            when: e.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            direction: e.direction.to_string(),
            changed: format!(
                "+{} ~{} -{}",
                e.tasks_created, e.tasks_updated, e.tasks_deleted
            ),
            conflicts: e.conflicts,
            result: if e.success {
                "ok".to_string()
            } else {
                e.error.clone().unwrap_or_else(|| "failed".to_string())
            },
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}
