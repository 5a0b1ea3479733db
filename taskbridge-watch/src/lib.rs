//! # taskbridge-watch
//!
//! Filesystem change notification for one watched document, rate-limited
//! before delivery.
//!
//! Raw backend events flow through a combined debounce+throttle limiter:
//! debounce collapses save bursts into one firing after quiescence, and
//! throttle guarantees at least one firing per interval under continuous
//! edits, so sync stays both responsive and bounded.

pub mod error;
pub mod limiter;
pub mod watcher;

pub use error::WatchError;
pub use limiter::DebounceThrottle;
pub use watcher::{FileWatcher, WatchEvent, WatchStats, WatcherConfig};
