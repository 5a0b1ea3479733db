//! `taskbridge watch` — watch the document and sync on change.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use taskbridge_core::config::SyncConfig;
use taskbridge_watch::{FileWatcher, WatchEvent, WatcherConfig};

use crate::build_coordinator;

/// Arguments for `taskbridge watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Also push store-side changes to the file before watching.
    #[arg(long)]
    pub push_first: bool,
}

impl WatchArgs {
    pub async fn run(self, config: SyncConfig) -> Result<()> {
        let watcher_config = WatcherConfig {
            path: config.file_path.clone(),
            max_file_size: config.max_file_size,
            debounce: Duration::from_millis(config.debounce_ms),
            max_wait: Duration::from_millis(config.throttle_ms),
            max_restarts: 5,
        };
        let coordinator = build_coordinator(config).await?;

        if self.push_first {
            coordinator
                .sync_app_to_file()
                .await
                .context("initial store → file sync failed")?;
        }

        let mut watcher = FileWatcher::new(watcher_config);
        let mut events = watcher.subscribe();
        watcher.start().context("starting file watcher")?;
        println!(
            "{} watching {} — ctrl-c to stop",
            "▶".green(),
            coordinator.status().file_path.display()
        );

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("ctrl-c handler failed")?;
                    println!("\nstopping watcher");
                    watcher.stop().await;
                    return Ok(());
                }
                event = events.recv() => {
                    match event {
                        Ok(WatchEvent::Change(_)) | Ok(WatchEvent::Add(_)) => {
                            match coordinator.sync_file_to_app().await {
                                Ok(report) if report.skipped_identical => {}
                                Ok(report) => println!(
                                    "{} synced: +{} ~{} -{} ({} conflict(s))",
                                    "✓".green(),
                                    report.entry.tasks_created,
                                    report.entry.tasks_updated,
                                    report.entry.tasks_deleted,
                                    report.entry.conflicts,
                                ),
                                Err(err) => eprintln!("{} sync failed: {err}", "✗".red()),
                            }
                        }
                        Ok(WatchEvent::Unlink(path)) => {
                            eprintln!("{} document removed: {}", "⚠".yellow(), path.display());
                        }
                        Ok(WatchEvent::Error(message)) => {
                            coordinator.notify_watcher_error(message.clone());
                            eprintln!("{} watcher error: {message}", "✗".red());
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event subscriber lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            eprintln!("{} watcher stopped", "⚠".yellow());
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
