//! taskbridge — keep a TODO document and a task store in sync.
//!
//! # Usage
//!
//! ```text
//! taskbridge sync [--to-file] [--dry-run]
//! taskbridge status [--json]
//! taskbridge history [--limit <n>] [--json]
//! taskbridge conflicts [--json]
//! taskbridge resolve <conflict-id> --strategy prefer_file|prefer_app|manual|merge
//! taskbridge backup create|list|restore <id>
//! taskbridge watch
//! ```
//!
//! Configuration comes from `taskbridge.yaml` in the working directory (or
//! `--config <path>`); absent a config file, the current directory is the
//! base dir and `TODO.md` the document.

mod commands;
mod store;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use taskbridge_core::config::SyncConfig;
use taskbridge_core::fsio::RealFileSystem;
use taskbridge_core::types::ResolutionStrategy;
use taskbridge_sync::SyncCoordinator;

use commands::{backup::BackupCommand, status::StatusArgs, sync::SyncArgs, watch::WatchArgs};
use store::JsonTaskStore;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "taskbridge",
    version,
    about = "Bidirectional sync between a TODO document and a task store",
    long_about = None,
)]
struct Cli {
    /// Path to a taskbridge.yaml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one sync pass (file → store by default).
    Sync(SyncArgs),

    /// Show coordinator state, breaker states, and statistics.
    Status(StatusArgs),

    /// Show recent sync attempts.
    History {
        /// Most recent entries to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },

    /// List unresolved conflicts.
    Conflicts {
        #[arg(long)]
        json: bool,
    },

    /// Resolve a queued conflict.
    Resolve {
        conflict_id: String,
        #[arg(long)]
        strategy: StrategyArg,
    },

    /// Manage document backups.
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },

    /// Watch the document and sync on change until interrupted.
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Shared strategy argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse [`ResolutionStrategy`] from CLI args.
#[derive(Debug, Clone)]
pub struct StrategyArg(pub ResolutionStrategy);

impl FromStr for StrategyArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prefer_file" | "file" => Ok(Self(ResolutionStrategy::PreferFile)),
            "prefer_app" | "app" => Ok(Self(ResolutionStrategy::PreferApp)),
            "manual" => Ok(Self(ResolutionStrategy::Manual)),
            "merge" => Ok(Self(ResolutionStrategy::Merge)),
            other => Err(format!(
                "unknown strategy '{other}'; expected: prefer_file, prefer_app, manual, merge"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn load_config(explicit: Option<&PathBuf>) -> Result<SyncConfig> {
    if let Some(path) = explicit {
        return SyncConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()));
    }
    let default = PathBuf::from("taskbridge.yaml");
    if default.exists() {
        return SyncConfig::load(&default).context("loading ./taskbridge.yaml");
    }
    let cwd = std::env::current_dir().context("determining working directory")?;
    Ok(SyncConfig::new(cwd, "TODO.md"))
}

async fn build_coordinator(config: SyncConfig) -> Result<SyncCoordinator> {
    let store = JsonTaskStore::open(config.state_dir.join("tasks.json"))
        .await
        .context("opening task store")?;
    SyncCoordinator::new(config, Arc::new(store), Arc::new(RealFileSystem))
        .context("constructing sync coordinator")
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Sync(args) => args.run(config).await,
        Commands::Status(args) => args.run(config).await,
        Commands::History { limit, json } => commands::status::history(config, limit, json).await,
        Commands::Conflicts { json } => commands::conflicts::list(config, json).await,
        Commands::Resolve {
            conflict_id,
            strategy,
        } => commands::conflicts::resolve(config, conflict_id, strategy.0).await,
        Commands::Backup { command } => commands::backup::run(config, command).await,
        Commands::Watch(args) => args.run(config).await,
    }
}
