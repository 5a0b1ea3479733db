//! # taskbridge-core
//!
//! Domain types and injected interfaces for the taskbridge sync engine.
//!
//! The engine never assumes a concrete task store or filesystem: both are
//! consumed through the [`store::TaskStore`] and [`fsio::FileSystem`] traits
//! and injected at construction time. This crate also carries the two hard
//! safety boundaries every other crate relies on: [`paths::PathValidator`]
//! (directory containment) and [`sanitize::sanitize_text`] (markup
//! stripping for user-authored content).

pub mod config;
pub mod error;
pub mod fsio;
pub mod paths;
pub mod sanitize;
pub mod store;
pub mod types;

pub use config::SyncConfig;
pub use error::{CoreError, StoreError};
pub use fsio::{FileMeta, FileSystem, InMemoryFileSystem, RealFileSystem};
pub use paths::PathValidator;
pub use store::{BatchSummary, InMemoryTaskStore, StoreStats, TaskBatch, TaskPage, TaskQuery, TaskStore};
