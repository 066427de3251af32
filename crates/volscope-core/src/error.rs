//! Error types for the volscope data model.

use thiserror::Error;

/// The main error type for volscope-core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A per-component accessor was called with an index past the last slot.
    #[error("component index {index} out of range (max {max})")]
    ComponentOutOfRange { index: usize, max: usize },

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Image data with an unsupported number of scalar components.
    #[error("unsupported number of scalar components: {0}")]
    UnsupportedComponents(usize),

    /// Image data with a zero-sized axis.
    #[error("image dimensions must be non-zero, got {0:?}")]
    EmptyDimensions([u32; 3]),

    /// A direction matrix that cannot be inverted.
    #[error("image direction matrix is singular")]
    SingularDirection,

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for volscope-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
