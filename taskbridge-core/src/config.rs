//! Sync engine configuration.
//!
//! Loaded from a YAML file or built in code; [`SyncConfig::validate`] fails
//! fast on bad parameters so a misconfigured coordinator never starts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::ResolutionStrategy;

// ---------------------------------------------------------------------------
// Retry / breaker settings
// ---------------------------------------------------------------------------

/// Backoff growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Exponential,
    Linear,
    Constant,
}

/// Retry parameters for transient I/O failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first call. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds. Default: 100.
    pub initial_delay_ms: u64,
    /// Ceiling for any single delay, in milliseconds. Default: 5000.
    pub max_delay_ms: u64,
    pub backoff: BackoffKind,
    /// Randomize each delay by up to ±25% to avoid retry stampedes.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff: BackoffKind::Exponential,
            jitter: true,
        }
    }
}

/// Circuit breaker parameters for file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Error percentage over the rolling window that opens the circuit.
    /// Must be in (0, 100]. Default: 50.
    pub error_threshold_pct: f64,
    /// Minimum calls in the window before the threshold applies. Default: 5.
    pub min_volume: u32,
    /// Rolling window length in milliseconds. Default: 60 000.
    pub window_ms: u64,
    /// Time the circuit stays open before a half-open trial. Default: 30 000.
    pub reset_timeout_ms: u64,
    /// Concurrent in-flight calls allowed per breaker. Default: 4.
    pub max_concurrent: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            error_threshold_pct: 50.0,
            min_volume: 5,
            window_ms: 60_000,
            reset_timeout_ms: 30_000,
            max_concurrent: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Configuration for one coordinator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// The watched/synced document. Relative paths resolve against `base_dir`.
    pub file_path: PathBuf,
    /// Containment boundary: every path the engine touches must resolve
    /// inside this directory.
    pub base_dir: PathBuf,
    /// Directory for persisted engine state (base versions, backups index).
    pub state_dir: PathBuf,

    /// Default policy for conflicts the merger cannot settle on its own.
    pub conflict_strategy: ResolutionStrategy,
    /// Use persisted base versions for three-way merge. When off, the
    /// coordinator falls back to legacy title-matching conflict checks.
    pub three_way_merge: bool,

    /// Debounce window for watcher events, in milliseconds. Default: 500.
    pub debounce_ms: u64,
    /// Maximum quiet-period extension — a pending event fires at least once
    /// per this interval even under continuous edits. Default: 2000.
    pub throttle_ms: u64,
    /// Files larger than this are refused before read/write. Default: 5 MiB.
    pub max_file_size: u64,

    /// Write a timestamped backup before destructive file writes.
    pub auto_backup: bool,
    pub backup_dir: PathBuf,
    /// Oldest backups beyond this count are pruned. Default: 10.
    pub max_backups: usize,

    /// Serialize and report without writing the file.
    pub dry_run: bool,

    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub breaker: BreakerSettings,
}

impl SyncConfig {
    /// A config rooted at `base_dir` with defaults for everything else.
    pub fn new(base_dir: impl Into<PathBuf>, file_name: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.into();
        Self {
            file_path: base_dir.join(file_name.as_ref()),
            state_dir: base_dir.join(".taskbridge"),
            backup_dir: base_dir.join(".taskbridge").join("backups"),
            base_dir,
            conflict_strategy: ResolutionStrategy::Merge,
            three_way_merge: true,
            debounce_ms: 500,
            throttle_ms: 2_000,
            max_file_size: 5 * 1024 * 1024,
            auto_backup: true,
            max_backups: 10,
            dry_run: false,
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
        }
    }

    /// Load and validate a config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let config: SyncConfig =
            serde_yaml::from_str(&contents).map_err(|source| CoreError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject invalid parameters before any component is constructed.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.file_path.as_os_str().is_empty() {
            return Err(CoreError::Config("file_path must not be empty".into()));
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(CoreError::Config("base_dir must not be empty".into()));
        }
        if self.debounce_ms == 0 {
            return Err(CoreError::Config("debounce_ms must be positive".into()));
        }
        if self.throttle_ms < self.debounce_ms {
            return Err(CoreError::Config(
                "throttle_ms must be at least debounce_ms".into(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(CoreError::Config("max_file_size must be positive".into()));
        }
        if self.auto_backup && self.max_backups == 0 {
            return Err(CoreError::Config(
                "max_backups must be positive when auto_backup is on".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(CoreError::Config(
                "retry.max_delay_ms must be at least retry.initial_delay_ms".into(),
            ));
        }
        if !(self.breaker.error_threshold_pct > 0.0 && self.breaker.error_threshold_pct <= 100.0) {
            return Err(CoreError::Config(
                "breaker.error_threshold_pct must be in (0, 100]".into(),
            ));
        }
        if self.breaker.min_volume == 0 {
            return Err(CoreError::Config(
                "breaker.min_volume must be at least 1".into(),
            ));
        }
        if self.breaker.max_concurrent == 0 {
            return Err(CoreError::Config(
                "breaker.max_concurrent must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
