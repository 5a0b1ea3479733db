//! Circuit breaker for file and store I/O.
//!
//! # State machine
//!
//! ```text
//!   Closed ──(error rate ≥ threshold over rolling window, volume met)──> Open
//!   Open ──(reset timeout elapsed)──> HalfOpen (one trial call)
//!   HalfOpen ──(trial succeeds)──> Closed
//!   HalfOpen ──(trial fails)──> Open
//! ```
//!
//! While open, calls fail fast with [`SyncError::CircuitOpen`] or run the
//! provided fallback. A semaphore caps concurrent in-flight calls per
//! breaker. State lives behind a `std::sync::Mutex` and is never held
//! across an await.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;

use taskbridge_core::config::BreakerSettings;

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open { since: Instant },
    /// A trial call is in flight; further calls fail fast until it lands.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: State,
    /// Rolling window of (when, succeeded) call outcomes.
    window: VecDeque<(Instant, bool)>,
}

/// Observable per-breaker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct BreakerStats {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub fallbacks: u64,
    pub rejected: u64,
    /// Closed→Open transitions.
    pub opens: u64,
}

impl BreakerStats {
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            100.0
        } else {
            self.successes as f64 * 100.0 / total as f64
        }
    }

    pub fn error_rate(&self) -> f64 {
        100.0 - self.success_rate()
    }
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

/// A named circuit breaker wrapping async operations.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    stats: Mutex<BreakerStats>,
    permits: Semaphore,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let permits = Semaphore::new(settings.max_concurrent as usize);
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(Inner {
                state: State::Closed,
                window: VecDeque::new(),
            }),
            stats: Mutex::new(BreakerStats::default()),
            permits,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"closed"`, `"open"`, or `"half_open"`.
    pub fn state_name(&self) -> &'static str {
        match self.inner.lock().expect("breaker lock").state {
            State::Closed => "closed",
            State::Open { .. } => "open",
            State::HalfOpen => "half_open",
        }
    }

    pub fn stats(&self) -> BreakerStats {
        *self.stats.lock().expect("breaker stats lock")
    }

    /// Run `op` through the breaker, failing fast while open.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        self.execute_inner(op, None::<fn() -> T>).await
    }

    /// Like [`execute`](Self::execute), but while open the fallback runs
    /// instead of returning [`SyncError::CircuitOpen`].
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        op: F,
        fallback: impl FnOnce() -> T,
    ) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        self.execute_inner(op, Some(fallback)).await
    }

    async fn execute_inner<T, F, Fut, FB>(
        &self,
        op: F,
        fallback: Option<FB>,
    ) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
        FB: FnOnce() -> T,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SyncError::Config(format!("breaker '{}' permits closed", self.name)))?;

        if !self.try_acquire_call() {
            let mut stats = self.stats.lock().expect("breaker stats lock");
            stats.rejected += 1;
            if let Some(fallback) = fallback {
                stats.fallbacks += 1;
                drop(stats);
                tracing::debug!(breaker = %self.name, "circuit open; running fallback");
                return Ok(fallback());
            }
            return Err(SyncError::CircuitOpen {
                name: self.name.clone(),
            });
        }

        let result = op().await;
        match &result {
            Ok(_) => self.record(true, false),
            Err(err) => self.record(false, err.is_timeout()),
        }
        result
    }

    /// Gate a call: true when the call may proceed (and, in half-open, is
    /// the designated trial call).
    fn try_acquire_call(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock");
        match inner.state {
            State::Closed => true,
            State::HalfOpen => false,
            State::Open { since } => {
                if since.elapsed() >= Duration::from_millis(self.settings.reset_timeout_ms) {
                    tracing::info!(breaker = %self.name, "reset timeout elapsed; trying half-open trial");
                    inner.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record(&self, success: bool, timeout: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("breaker lock");
        let mut stats = self.stats.lock().expect("breaker stats lock");
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
            if timeout {
                stats.timeouts += 1;
            }
        }

        match inner.state {
            State::HalfOpen => {
                if success {
                    tracing::info!(breaker = %self.name, "trial succeeded; closing circuit");
                    inner.state = State::Closed;
                    inner.window.clear();
                } else {
                    tracing::warn!(breaker = %self.name, "trial failed; reopening circuit");
                    inner.state = State::Open { since: now };
                }
            }
            State::Closed => {
                inner.window.push_back((now, success));
                let window = Duration::from_millis(self.settings.window_ms);
                while let Some((at, _)) = inner.window.front() {
                    if now.duration_since(*at) > window {
                        inner.window.pop_front();
                    } else {
                        break;
                    }
                }

                let total = inner.window.len() as u32;
                if total >= self.settings.min_volume {
                    let failures = inner.window.iter().filter(|(_, ok)| !ok).count() as f64;
                    let rate = failures * 100.0 / total as f64;
                    if rate >= self.settings.error_threshold_pct {
                        tracing::warn!(
                            breaker = %self.name,
                            error_rate = rate,
                            volume = total,
                            "error rate over threshold; opening circuit",
                        );
                        inner.state = State::Open { since: now };
                        stats.opens += 1;
                    }
                }
            }
            // A concurrent call that started before the trip finishes here;
            // its outcome does not move an already-open circuit.
            State::Open { .. } => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            error_threshold_pct: 50.0,
            min_volume: 4,
            window_ms: 60_000,
            reset_timeout_ms: 50,
            max_concurrent: 4,
        }
    }

    fn io_fail() -> SyncError {
        SyncError::Io {
            path: "/x".into(),
            source: std::io::Error::other("boom"),
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), SyncError> {
        breaker.execute(|| async { Err::<(), _>(io_fail()) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), SyncError> {
        breaker.execute(|| async { Ok(()) }).await
    }

    async fn trip(breaker: &CircuitBreaker) {
        for _ in 0..4 {
            let _ = fail(breaker).await;
        }
        assert_eq!(breaker.state_name(), "open");
    }

    #[tokio::test]
    async fn stays_closed_below_volume_threshold() {
        let breaker = CircuitBreaker::new("file-read", settings());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state_name(), "closed", "min volume not reached");
    }

    #[tokio::test]
    async fn opens_once_error_rate_exceeds_threshold() {
        let breaker = CircuitBreaker::new("file-read", settings());
        trip(&breaker).await;
        assert_eq!(breaker.stats().opens, 1);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_calling_op() {
        let breaker = CircuitBreaker::new("file-read", settings());
        trip(&breaker).await;

        let called = std::sync::atomic::AtomicBool::new(false);
        let result = breaker
            .execute(|| {
                called.store(true, std::sync::atomic::Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(SyncError::CircuitOpen { .. })));
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(breaker.stats().rejected, 1);
    }

    #[tokio::test]
    async fn open_circuit_runs_fallback_instead_of_erroring() {
        let breaker = CircuitBreaker::new("file-read", settings());
        trip(&breaker).await;

        let result = breaker
            .execute_with_fallback(|| async { Ok::<_, SyncError>("live".to_string()) }, || {
                "cached".to_string()
            })
            .await
            .expect("fallback result");
        assert_eq!(result, "cached");
        assert_eq!(breaker.stats().fallbacks, 1);
    }

    #[tokio::test]
    async fn half_open_trial_success_closes_circuit() {
        let breaker = CircuitBreaker::new("file-read", settings());
        trip(&breaker).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        succeed(&breaker).await.expect("trial");
        assert_eq!(breaker.state_name(), "closed");

        // A fresh failure after recovery does not instantly re-open.
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state_name(), "closed", "window cleared on close");
    }

    #[tokio::test]
    async fn half_open_trial_failure_reopens_circuit() {
        let breaker = CircuitBreaker::new("file-read", settings());
        trip(&breaker).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state_name(), "open");
    }

    #[tokio::test]
    async fn success_and_error_rates_are_tracked() {
        let breaker = CircuitBreaker::new("file-read", settings());
        succeed(&breaker).await.expect("ok");
        let _ = fail(&breaker).await;
        let stats = breaker.stats();
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 1);
        assert!((stats.success_rate() - 50.0).abs() < f64::EPSILON);
        assert!((stats.error_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn timeouts_are_counted_separately() {
        let breaker = CircuitBreaker::new("file-read", settings());
        let _ = breaker
            .execute(|| async {
                Err::<(), _>(SyncError::Io {
                    path: "/x".into(),
                    source: std::io::Error::from(std::io::ErrorKind::TimedOut),
                })
            })
            .await;
        assert_eq!(breaker.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn concurrency_is_capped_by_max_concurrent() {
        let mut s = settings();
        s.max_concurrent = 1;
        let breaker = std::sync::Arc::new(CircuitBreaker::new("file-read", s));

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let holder = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .execute(|| async move {
                        let _ = release_rx.await;
                        Ok::<_, SyncError>(())
                    })
                    .await
            })
        };

        // Give the holder time to take the only permit.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let queued = {
            let breaker = breaker.clone();
            tokio::spawn(async move { breaker.execute(|| async { Ok::<_, SyncError>(()) }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!queued.is_finished(), "second call waits for the permit");

        release_tx.send(()).expect("release");
        holder.await.expect("join").expect("holder result");
        queued.await.expect("join").expect("queued result");
    }
}
