//! Error types for taskbridge-watch.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the file watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Notification backend failure.
    #[error("watch backend error: {0}")]
    Backend(#[from] notify::Error),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `start` called twice on the same watcher.
    #[error("watcher already started")]
    AlreadyStarted,
}

/// Convenience constructor for [`WatchError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WatchError {
    WatchError::Io {
        path: path.into(),
        source,
    }
}
