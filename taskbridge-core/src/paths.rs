//! Path containment and size validation.
//!
//! Every path the engine reads or writes passes through [`PathValidator`]
//! first. Containment is a hard security boundary: a path that resolves
//! outside the allowed base directory (after symlink resolution) is rejected
//! with [`CoreError::PathEscape`], never retried, and logged as a security
//! event.

use std::path::{Component, Path, PathBuf};

use crate::error::{io_err, CoreError};

/// Validates paths against one allowed base directory.
#[derive(Debug, Clone)]
pub struct PathValidator {
    base: PathBuf,
}

impl PathValidator {
    /// Canonicalize the base directory; it must exist.
    pub fn new(base: &Path) -> Result<Self, CoreError> {
        let base = std::fs::canonicalize(base).map_err(|e| io_err(base, e))?;
        Ok(Self { base })
    }

    /// The canonicalized base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve `input` against the base and reject anything escaping it.
    ///
    /// Relative inputs are joined onto the base. Existing paths are fully
    /// canonicalized (resolving symlinks); a non-existent leaf is resolved
    /// through its parent so that a file which is *about to be created* can
    /// still be validated.
    pub fn validate(&self, input: &Path) -> Result<PathBuf, CoreError> {
        let joined = if input.is_absolute() {
            input.to_path_buf()
        } else {
            self.base.join(input)
        };

        let resolved = resolve(&joined)?;
        if !resolved.starts_with(&self.base) {
            tracing::warn!(
                path = %input.display(),
                resolved = %resolved.display(),
                base = %self.base.display(),
                "security: rejected path escaping allowed directory",
            );
            return Err(CoreError::PathEscape {
                path: input.to_path_buf(),
                base: self.base.clone(),
            });
        }
        Ok(resolved)
    }

    /// Reject files above the configured size ceiling before read/write.
    pub fn ensure_within_size(&self, path: &Path, size: u64, limit: u64) -> Result<(), CoreError> {
        if size > limit {
            return Err(CoreError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                limit,
            });
        }
        Ok(())
    }
}

/// Canonicalize, tolerating a non-existent final component.
fn resolve(path: &Path) -> Result<PathBuf, CoreError> {
    match std::fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let parent = path
                .parent()
                .ok_or_else(|| io_err(path, std::io::Error::other("path has no parent")))?;
            let file_name = path
                .file_name()
                .ok_or_else(|| io_err(path, std::io::Error::other("path has no file name")))?;
            // `..` in the missing leaf would bypass the parent check.
            if matches!(Path::new(file_name).components().next(), Some(Component::ParentDir)) {
                return Err(io_err(path, std::io::Error::other("invalid path component")));
            }
            let parent = std::fs::canonicalize(parent).map_err(|e| io_err(parent, e))?;
            Ok(parent.join(file_name))
        }
        Err(err) => Err(io_err(path, err)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
