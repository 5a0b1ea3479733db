//! Error taxonomy for the sync engine.
//!
//! Classes and their handling:
//!
//! | Class | Handling |
//! |---|---|
//! | `Config` | fail fast at construction, never retried |
//! | `Security` | fatal, never retried, logged as a security event |
//! | `Io` / `Store` | transient — retried with backoff, then surfaced |
//! | `CircuitOpen` | fast-fail with optional fallback, bypasses retry |
//! | `Codec` | fatal for the sync attempt; the file is not written |
//!
//! Conflicts are *not* errors — they are recorded as data and either
//! auto-resolved or queued for manual resolution.

use std::path::PathBuf;

use thiserror::Error;

use taskbridge_codec::CodecError;
use taskbridge_core::error::{CoreError, StoreError};

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad parameters — fail fast, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Path containment violation — always fatal.
    #[error("security violation: {0}")]
    Security(String),

    /// Transient I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File exceeded the configured size ceiling.
    #[error("file too large: {path} is {size} bytes (limit {limit})")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    /// The named circuit is open; the call was not attempted.
    #[error("circuit '{name}' is open; failing fast")]
    CircuitOpen { name: String },

    /// Retries exhausted for an operation.
    #[error("operation '{operation}' failed after {attempts} attempt(s): {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<SyncError>,
    },

    /// Rendered-document validation failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Task store failure — treated as transient.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Persisted engine state (base versions, backups index) is corrupt.
    #[error("state error at {path}: {message}")]
    State { path: PathBuf, message: String },
}

impl SyncError {
    /// Whether the retry layer may re-attempt this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Io { .. } | SyncError::Store(_))
    }

    /// Whether this I/O error looks like a timeout (tracked separately in
    /// breaker statistics).
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SyncError::Io { source, .. } if source.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(msg) => SyncError::Config(msg),
            CoreError::ConfigParse { path, source } => {
                SyncError::Config(format!("parse failure at {}: {source}", path.display()))
            }
            CoreError::PathEscape { .. } => SyncError::Security(err.to_string()),
            CoreError::FileTooLarge { path, size, limit } => {
                SyncError::FileTooLarge { path, size, limit }
            }
            CoreError::Io { path, source } => SyncError::Io { path, source },
        }
    }
}
