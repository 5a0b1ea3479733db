//! Watcher for a single validated document path.
//!
//! The notify backend watches the file's parent directory (non-recursive)
//! and raw events are filtered to the watched path, classified, guarded
//! against oversized files, then routed through the
//! [`DebounceThrottle`](crate::limiter::DebounceThrottle) limiter before
//! being re-broadcast as typed [`WatchEvent`]s.
//!
//! On backend failure the watcher restarts the backend up to
//! `max_restarts` times before giving up with a final `Error` event.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::error::{io_err, WatchError};
use crate::limiter::DebounceThrottle;

// ---------------------------------------------------------------------------
// Config / events / stats
// ---------------------------------------------------------------------------

/// Watcher parameters; the path must already be validated for containment.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub path: PathBuf,
    /// Change events for files above this size are dropped with a warning.
    pub max_file_size: u64,
    pub debounce: Duration,
    /// Throttle ceiling: at least one delivery per this interval under
    /// continuous edits.
    pub max_wait: Duration,
    /// Backend restart attempts before giving up.
    pub max_restarts: u32,
}

/// Typed events delivered to subscribers. The broadcast stream itself is
/// the unified `event` feed; match on the variant for per-kind handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Change(PathBuf),
    Add(PathBuf),
    Unlink(PathBuf),
    Error(String),
}

/// Cumulative watcher counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchStats {
    pub changes: u64,
    pub adds: u64,
    pub unlinks: u64,
    pub errors: u64,
    pub retries: u64,
    pub oversize_skips: u64,
}

// ---------------------------------------------------------------------------
// FileWatcher
// ---------------------------------------------------------------------------

enum PumpExit {
    Shutdown,
    BackendDead,
}

pub struct FileWatcher {
    config: WatcherConfig,
    events: broadcast::Sender<WatchEvent>,
    stats: Arc<Mutex<WatchStats>>,
    shutdown: broadcast::Sender<()>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FileWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        let (shutdown, _) = broadcast::channel(4);
        Self {
            config,
            events,
            stats: Arc::new(Mutex::new(WatchStats::default())),
            shutdown,
            task: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> WatchStats {
        *self.stats.lock().expect("watch stats lock")
    }

    /// Start the backend and the event pump.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.task.is_some() {
            return Err(WatchError::AlreadyStarted);
        }
        let parent = watch_root(&self.config.path)?;

        let config = self.config.clone();
        let events = self.events.clone();
        let stats = self.stats.clone();
        let shutdown = self.shutdown.clone();

        self.task = Some(tokio::spawn(async move {
            let mut restarts = 0u32;
            loop {
                let (raw_tx, raw_rx) = mpsc::unbounded_channel();
                let backend = match spawn_backend(&parent, raw_tx) {
                    Ok(backend) => backend,
                    Err(err) => {
                        stats.lock().expect("watch stats lock").errors += 1;
                        let _ = events.send(WatchEvent::Error(err.to_string()));
                        if !bump_restarts(&mut restarts, &config, &stats, &events) {
                            return;
                        }
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        continue;
                    }
                };

                let exit = event_pump(
                    &config,
                    raw_rx,
                    &events,
                    &stats,
                    shutdown.subscribe(),
                )
                .await;
                drop(backend);

                match exit {
                    PumpExit::Shutdown => return,
                    PumpExit::BackendDead => {
                        if !bump_restarts(&mut restarts, &config, &stats, &events) {
                            return;
                        }
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
        }));

        tracing::info!(path = %self.config.path.display(), "file watcher started");
        Ok(())
    }

    /// Stop the watcher; any pending limited event is flushed first.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::info!(path = %self.config.path.display(), "file watcher stopped");
    }
}

fn bump_restarts(
    restarts: &mut u32,
    config: &WatcherConfig,
    stats: &Arc<Mutex<WatchStats>>,
    events: &broadcast::Sender<WatchEvent>,
) -> bool {
    *restarts += 1;
    if *restarts > config.max_restarts {
        tracing::error!(
            path = %config.path.display(),
            restarts = *restarts - 1,
            "watch backend kept failing; giving up",
        );
        let _ = events.send(WatchEvent::Error(
            "watch backend failed repeatedly; watcher stopped".to_string(),
        ));
        return false;
    }
    stats.lock().expect("watch stats lock").retries += 1;
    tracing::warn!(
        path = %config.path.display(),
        attempt = *restarts,
        "restarting watch backend",
    );
    true
}

fn watch_root(path: &Path) -> Result<PathBuf, WatchError> {
    let parent = path
        .parent()
        .ok_or_else(|| io_err(path, std::io::Error::other("watched path has no parent")))?;
    if !parent.exists() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    Ok(parent.to_path_buf())
}

fn spawn_backend(
    parent: &Path,
    raw_tx: mpsc::UnboundedSender<notify::Result<Event>>,
) -> Result<RecommendedWatcher, WatchError> {
    let mut backend = recommended_watcher(move |event| {
        let _ = raw_tx.send(event);
    })?;
    backend.watch(parent, RecursiveMode::NonRecursive)?;
    Ok(backend)
}

// ---------------------------------------------------------------------------
// Event pump
// ---------------------------------------------------------------------------

async fn event_pump(
    config: &WatcherConfig,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    events: &broadcast::Sender<WatchEvent>,
    stats: &Arc<Mutex<WatchStats>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> PumpExit {
    let mut limiter: DebounceThrottle<WatchEvent> =
        DebounceThrottle::new(config.debounce, config.max_wait);

    loop {
        let deadline = limiter.deadline();
        let sleep_until = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            _ = shutdown_rx.recv() => {
                if let Some(event) = limiter.flush() {
                    emit(events, stats, event);
                }
                return PumpExit::Shutdown;
            }
            raw = raw_rx.recv() => {
                match raw {
                    None => {
                        if let Some(event) = limiter.flush() {
                            emit(events, stats, event);
                        }
                        return PumpExit::BackendDead;
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "watch backend error");
                        stats.lock().expect("watch stats lock").errors += 1;
                        let _ = events.send(WatchEvent::Error(err.to_string()));
                        if let Some(event) = limiter.flush() {
                            emit(events, stats, event);
                        }
                        return PumpExit::BackendDead;
                    }
                    Some(Ok(raw_event)) => {
                        if let Some(event) = classify(&raw_event, &config.path) {
                            if oversized(&event, config.max_file_size) {
                                stats.lock().expect("watch stats lock").oversize_skips += 1;
                                tracing::warn!(
                                    path = %config.path.display(),
                                    limit = config.max_file_size,
                                    "change ignored: file exceeds size ceiling",
                                );
                            } else {
                                limiter.on_event(event, Instant::now());
                            }
                        }
                    }
                }
            }
            _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                if let Some(event) = limiter.poll(Instant::now()) {
                    emit(events, stats, event);
                }
            }
        }
    }
}

/// Map a raw backend event onto the watched path, if it concerns it.
fn classify(raw: &Event, watched: &Path) -> Option<WatchEvent> {
    let concerns_watched = raw
        .paths
        .iter()
        .any(|p| p == watched || p.file_name() == watched.file_name());
    if !concerns_watched {
        return None;
    }
    match raw.kind {
        EventKind::Create(_) => Some(WatchEvent::Add(watched.to_path_buf())),
        EventKind::Modify(_) => Some(WatchEvent::Change(watched.to_path_buf())),
        EventKind::Remove(_) => Some(WatchEvent::Unlink(watched.to_path_buf())),
        _ => None,
    }
}

fn oversized(event: &WatchEvent, limit: u64) -> bool {
    let path = match event {
        WatchEvent::Change(path) | WatchEvent::Add(path) => path,
        _ => return false,
    };
    match std::fs::metadata(path) {
        Ok(meta) => meta.len() > limit,
        Err(_) => false,
    }
}

fn emit(
    events: &broadcast::Sender<WatchEvent>,
    stats: &Arc<Mutex<WatchStats>>,
    event: WatchEvent,
) {
    {
        let mut stats = stats.lock().expect("watch stats lock");
        match &event {
            WatchEvent::Change(_) => stats.changes += 1,
            WatchEvent::Add(_) => stats.adds += 1,
            WatchEvent::Unlink(_) => stats.unlinks += 1,
            WatchEvent::Error(_) => stats.errors += 1,
        }
    }
    tracing::debug!(event = ?event, "delivering watch event");
    let _ = events.send(event);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn raw(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    fn watched() -> PathBuf {
        PathBuf::from("/ws/TODO.md")
    }

    #[test]
    fn classify_maps_event_kinds() {
        let watched = watched();
        assert_eq!(
            classify(&raw(EventKind::Create(CreateKind::File), &watched), &watched),
            Some(WatchEvent::Add(watched.clone()))
        );
        assert_eq!(
            classify(&raw(EventKind::Modify(ModifyKind::Any), &watched), &watched),
            Some(WatchEvent::Change(watched.clone()))
        );
        assert_eq!(
            classify(&raw(EventKind::Remove(RemoveKind::File), &watched), &watched),
            Some(WatchEvent::Unlink(watched.clone()))
        );
        assert_eq!(
            classify(&raw(EventKind::Access(notify::event::AccessKind::Any), &watched), &watched),
            None,
            "access events are noise"
        );
    }

    #[test]
    fn classify_ignores_sibling_files() {
        let watched = watched();
        let other = PathBuf::from("/ws/notes.md");
        assert_eq!(
            classify(&raw(EventKind::Modify(ModifyKind::Any), &other), &watched),
            None
        );
    }

    fn pump_config(path: PathBuf) -> WatcherConfig {
        WatcherConfig {
            path,
            max_file_size: 1024,
            debounce: Duration::from_millis(50),
            max_wait: Duration::from_millis(200),
            max_restarts: 2,
        }
    }

    async fn run_pump(
        config: WatcherConfig,
        raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        events: broadcast::Sender<WatchEvent>,
        stats: Arc<Mutex<WatchStats>>,
        shutdown: broadcast::Receiver<()>,
    ) -> PumpExit {
        event_pump(&config, raw_rx, &events, &stats, shutdown).await
    }

    #[tokio::test(start_paused = true)]
    async fn pump_debounces_raw_bursts_into_one_delivery() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("TODO.md");
        std::fs::write(&path, "- [ ] x\n").expect("write");

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (events, mut events_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stats = Arc::new(Mutex::new(WatchStats::default()));

        let pump = tokio::spawn(run_pump(
            pump_config(path.clone()),
            raw_rx,
            events.clone(),
            stats.clone(),
            shutdown_rx,
        ));

        for _ in 0..5 {
            raw_tx
                .send(Ok(raw(EventKind::Modify(ModifyKind::Any), &path)))
                .expect("send raw");
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let event = events_rx.try_recv().expect("one delivery");
        assert_eq!(event, WatchEvent::Change(path.clone()));
        assert!(events_rx.try_recv().is_err(), "burst collapsed to one event");
        assert_eq!(stats.lock().expect("stats").changes, 1);

        shutdown_tx.send(()).expect("shutdown");
        assert!(matches!(pump.await.expect("join"), PumpExit::Shutdown));
    }

    #[tokio::test(start_paused = true)]
    async fn pump_flushes_pending_event_on_shutdown() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("TODO.md");
        std::fs::write(&path, "- [ ] x\n").expect("write");

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (events, mut events_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stats = Arc::new(Mutex::new(WatchStats::default()));

        let pump = tokio::spawn(run_pump(
            pump_config(path.clone()),
            raw_rx,
            events,
            stats,
            shutdown_rx,
        ));

        raw_tx
            .send(Ok(raw(EventKind::Modify(ModifyKind::Any), &path)))
            .expect("send raw");
        tokio::task::yield_now().await;
        shutdown_tx.send(()).expect("shutdown");
        pump.await.expect("join");

        assert_eq!(
            events_rx.try_recv().expect("flushed event"),
            WatchEvent::Change(path)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pump_reports_backend_death_after_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("TODO.md");

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (events, mut events_rx) = broadcast::channel(16);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stats = Arc::new(Mutex::new(WatchStats::default()));

        let pump = tokio::spawn(run_pump(
            pump_config(path),
            raw_rx,
            events,
            stats.clone(),
            shutdown_rx,
        ));

        raw_tx
            .send(Err(notify::Error::generic("backend exploded")))
            .expect("send error");
        let exit = pump.await.expect("join");
        assert!(matches!(exit, PumpExit::BackendDead));
        assert!(matches!(
            events_rx.try_recv().expect("error event"),
            WatchEvent::Error(_)
        ));
        assert_eq!(stats.lock().expect("stats").errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_changes_are_dropped_with_a_counter() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("TODO.md");
        std::fs::write(&path, vec![b'x'; 4096]).expect("write");

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (events, mut events_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stats = Arc::new(Mutex::new(WatchStats::default()));

        let pump = tokio::spawn(run_pump(
            pump_config(path.clone()), // limit is 1024
            raw_rx,
            events,
            stats.clone(),
            shutdown_rx,
        ));

        raw_tx
            .send(Ok(raw(EventKind::Modify(ModifyKind::Any), &path)))
            .expect("send raw");
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(events_rx.try_recv().is_err(), "oversized change suppressed");
        assert_eq!(stats.lock().expect("stats").oversize_skips, 1);

        shutdown_tx.send(()).expect("shutdown");
        pump.await.expect("join");
    }
}
