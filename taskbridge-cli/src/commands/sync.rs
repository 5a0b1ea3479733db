//! `taskbridge sync` — run one sync pass.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use taskbridge_core::config::SyncConfig;
use taskbridge_sync::SyncReport;

use crate::build_coordinator;

/// Arguments for `taskbridge sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Push the task store into the document instead of pulling from it.
    #[arg(long)]
    pub to_file: bool,

    /// Report what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub async fn run(self, mut config: SyncConfig) -> Result<()> {
        if self.dry_run {
            config.dry_run = true;
        }
        let coordinator = build_coordinator(config).await?;

        let report = if self.to_file {
            coordinator
                .sync_app_to_file()
                .await
                .context("store → file sync failed")?
        } else {
            coordinator
                .sync_file_to_app()
                .await
                .context("file → store sync failed")?
        };

        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &SyncReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    if report.skipped_identical {
        println!("{prefix}{} nothing to do — content unchanged", "✓".green());
        return;
    }

    let entry = &report.entry;
    println!(
        "{prefix}{} synced ({} created, {} updated, {} deleted, {} conflict(s)) in {}ms",
        "✓".green(),
        entry.tasks_created,
        entry.tasks_updated,
        entry.tasks_deleted,
        entry.conflicts,
        (entry.finished_at - entry.started_at).num_milliseconds(),
    );

    for conflict in &report.conflicts {
        let marker = if conflict.resolved {
            "auto-resolved".green()
        } else {
            "needs review".yellow()
        };
        println!(
            "  {} {} '{}' [{marker}]",
            "⚠".yellow(),
            conflict.kind,
            conflict.app_version.title,
        );
    }
}
