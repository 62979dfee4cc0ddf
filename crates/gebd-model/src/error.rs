//! Error types for boundary detection.
//!
//! Three classes of failure exist: shape/precondition errors between
//! collaborating components, decode-order errors in the propagation walk, and
//! unsupported configuration. Masked or padded frames are never errors; they
//! are skipped structurally.

use thiserror::Error;

/// Boundary-detection errors.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// Tensor shapes disagree between collaborating components.
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// A precondition on the input was violated.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The decode order is malformed (out of range, duplicated, or it visits
    /// a frame before one of its references).
    #[error("Invalid decode order: {message}")]
    DecodeOrder { message: String },

    /// A propagation buffer slot was written twice.
    #[error("Propagation slot {frame} already written")]
    SlotAlreadyWritten { frame: usize },

    /// Requested behaviour exists as a configuration value but has no
    /// implementation.
    #[error("Not implemented: {feature}")]
    NotImplemented { feature: String },

    /// Configuration is invalid.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Tensor backend failure.
    #[error("Tensor operation failed: {message}")]
    TensorError { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<candle_core::Error> for BoundaryError {
    fn from(err: candle_core::Error) -> Self {
        BoundaryError::TensorError {
            message: err.to_string(),
        }
    }
}

impl BoundaryError {
    /// Build a [`BoundaryError::ShapeMismatch`] from anything debug-printable.
    pub fn shape(
        context: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        BoundaryError::ShapeMismatch {
            context: context.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Build a [`BoundaryError::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        BoundaryError::InvalidInput {
            message: message.into(),
        }
    }
}

/// Result type for boundary-detection operations.
pub type BoundaryResult<T> = Result<T, BoundaryError>;
