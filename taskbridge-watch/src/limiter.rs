//! Combined debounce + throttle limiter.
//!
//! Pure state machine over `tokio::time::Instant` so the timer semantics
//! are testable under paused time. The async pump in
//! [`crate::watcher`] drives it with `sleep_until(deadline())`.
//!
//! - **Debounce**: a pending event fires `debounce` after the *last*
//!   trigger, collapsing bursts into one firing.
//! - **Throttle**: under continuous triggers the debounce deadline keeps
//!   moving, so a second deadline caps the wait at `max_wait` after the
//!   *first* trigger of the burst.

use std::time::Duration;

use tokio::time::Instant;

/// Debounce+throttle over a single pending event slot. A newer event of the
/// same burst replaces the pending one (last-writer-wins), which is the
/// right semantics for "the file changed" notifications.
#[derive(Debug)]
pub struct DebounceThrottle<T> {
    debounce: Duration,
    max_wait: Duration,
    pending: Option<T>,
    /// When the current burst began.
    burst_started: Option<Instant>,
    /// Last trigger of the current burst.
    last_trigger: Option<Instant>,
}

impl<T> DebounceThrottle<T> {
    pub fn new(debounce: Duration, max_wait: Duration) -> Self {
        Self {
            debounce,
            max_wait,
            pending: None,
            burst_started: None,
            last_trigger: None,
        }
    }

    /// Record a trigger, replacing any pending event.
    pub fn on_event(&mut self, event: T, now: Instant) {
        if self.pending.is_none() {
            self.burst_started = Some(now);
        }
        self.pending = Some(event);
        self.last_trigger = Some(now);
    }

    /// When the pending event (if any) is due.
    pub fn deadline(&self) -> Option<Instant> {
        let last = self.last_trigger?;
        let started = self.burst_started?;
        self.pending.as_ref()?;
        let debounce_due = last + self.debounce;
        let throttle_due = started + self.max_wait;
        Some(debounce_due.min(throttle_due))
    }

    /// Fire the pending event when its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let due = self.deadline()?;
        if now < due {
            return None;
        }
        self.take()
    }

    /// Force immediate delivery of any pending event (shutdown path).
    pub fn flush(&mut self) -> Option<T> {
        self.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn take(&mut self) -> Option<T> {
        self.burst_started = None;
        self.last_trigger = None;
        self.pending.take()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
