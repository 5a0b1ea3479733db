//! `taskbridge backup` — create, list, restore.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use taskbridge_core::config::SyncConfig;

use crate::build_coordinator;

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// Take a backup of the document right now.
    Create,
    /// List retained backups, oldest first.
    List,
    /// Restore a backup over the document.
    Restore { id: String },
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "created")]
    created: String,
    #[tabled(rename = "size")]
    size: u64,
    #[tabled(rename = "reason")]
    reason: String,
}

pub async fn run(config: SyncConfig, command: BackupCommand) -> Result<()> {
    let coordinator = build_coordinator(config).await?;

    match command {
        BackupCommand::Create => {
            match coordinator
                .backup_now("manual")
                .await
                .context("creating backup")?
            {
                Some(info) => println!("{} backed up to {}", "✓".green(), info.path.display()),
                None => println!("Nothing to back up — the document does not exist yet."),
            }
        }
        BackupCommand::List => {
            let backups = coordinator.list_backups().await.context("listing backups")?;
            if backups.is_empty() {
                println!("No backups yet.");
                return Ok(());
            }
            let rows: Vec<BackupRow> = backups
                .iter()
                .map(|b| BackupRow {
                    id: b.id.clone(),
                    created: b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    size: b.size,
                    reason: b.reason.clone(),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
        BackupCommand::Restore { id } => {
            let info = coordinator
                .restore_backup(&id)
                .await
                .with_context(|| format!("restoring backup '{id}'"))?;
            println!(
                "{} restored {} (taken {})",
                "✓".green(),
                info.path.display(),
                info.created_at.format("%Y-%m-%d %H:%M:%S"),
            );
        }
    }
    Ok(())
}
