//! Error types for taskbridge-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::TaskId;

/// Errors from configuration, path validation, and filesystem access.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid configuration — fail fast at construction, never retried.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Config file parse failure, with path context.
    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A path resolved outside the allowed base directory. Always fatal,
    /// never retried, always logged as a security event.
    #[error("path '{path}' escapes allowed directory '{base}'")]
    PathEscape { path: PathBuf, base: PathBuf },

    /// A file exceeded the configured size ceiling.
    #[error("file too large: {path} is {size} bytes (limit {limit})")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}

/// Errors surfaced by [`crate::store::TaskStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("duplicate task id: {0}")]
    Duplicate(TaskId),

    /// Backend-specific failure (connection loss, lock timeout, ...).
    /// Treated as transient by the resilience layer.
    #[error("store backend error: {0}")]
    Backend(String),
}
