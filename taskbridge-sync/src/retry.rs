//! Bounded retry with backoff for transient failures.
//!
//! The retryability predicate is [`SyncError::is_retryable`]: transient I/O
//! and store errors retry; security, configuration, validation, and
//! circuit-open errors surface immediately. Delays grow per the configured
//! backoff strategy, capped at `max_delay_ms`, with optional ±25% jitter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use taskbridge_core::config::{BackoffKind, RetrySettings};

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct OpRetryStats {
    /// Completed operations (successful or exhausted).
    pub operations: u64,
    /// Individual attempts across those operations.
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

impl OpRetryStats {
    /// Average retries (attempts beyond the first) per operation.
    pub fn average_retries(&self) -> f64 {
        if self.operations == 0 {
            0.0
        } else {
            (self.attempts - self.operations) as f64 / self.operations as f64
        }
    }
}

/// Per-operation-name snapshot.
pub type RetryStatsSnapshot = HashMap<String, OpRetryStats>;

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs operations with bounded retries and tracks per-name statistics.
pub struct RetryExecutor {
    settings: RetrySettings,
    stats: Mutex<RetryStatsSnapshot>,
}

impl RetryExecutor {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            settings,
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn stats(&self) -> RetryStatsSnapshot {
        self.stats.lock().expect("retry stats lock").clone()
    }

    /// Run `op` with retries, no before-retry hook.
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        self.run_with_hook(operation, op, |_, _| {}).await
    }

    /// Run `op` with retries; `on_retry(attempt, error)` fires before each
    /// re-attempt.
    pub async fn run_with_hook<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
        on_retry: impl Fn(u32, &SyncError),
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    self.record(operation, attempts, true);
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    self.record(operation, attempts, false);
                    return Err(err);
                }
                Err(err) if attempts >= max_attempts => {
                    self.record(operation, attempts, false);
                    tracing::warn!(
                        operation,
                        attempts,
                        error = %err,
                        "retries exhausted",
                    );
                    return Err(SyncError::RetryExhausted {
                        operation: operation.to_string(),
                        attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempts);
                    tracing::debug!(
                        operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure; retrying",
                    );
                    on_retry(attempts, &err);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Delay before the retry following attempt `attempt` (1-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.settings.initial_delay_ms;
        let raw = match self.settings.backoff {
            BackoffKind::Exponential => {
                initial.saturating_mul(1u64 << (attempt - 1).min(32))
            }
            BackoffKind::Linear => initial.saturating_mul(attempt as u64),
            BackoffKind::Constant => initial,
        };
        let capped = raw.min(self.settings.max_delay_ms);
        let with_jitter = if self.settings.jitter {
            apply_jitter(capped)
        } else {
            capped
        };
        Duration::from_millis(with_jitter)
    }

    fn record(&self, operation: &str, attempts: u32, success: bool) {
        let mut stats = self.stats.lock().expect("retry stats lock");
        let entry = stats.entry(operation.to_string()).or_default();
        entry.operations += 1;
        entry.attempts += attempts as u64;
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }
}

/// ±25% jitter seeded from the clock's subsecond nanos.
fn apply_jitter(delay_ms: u64) -> u64 {
    if delay_ms == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let half_range = (delay_ms / 4).max(1);
    let offset = nanos % (half_range * 2 + 1);
    delay_ms - half_range + offset
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
