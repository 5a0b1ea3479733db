//! Error types for taskbridge-codec.

use thiserror::Error;

/// Codec failures. Parsing itself never fails — only validation of a
/// *rendered* document can, and that is fatal for the sync attempt that
/// produced it (the file is not written).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("rendered document failed validation: {reason}")]
    ValidationFailed { reason: String },
}
