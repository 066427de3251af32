//! Error type of the facade.

use thiserror::Error;
use volscope_core::CoreError;
use volscope_render::RenderError;

/// Errors from any layer of volscope-rs.
#[derive(Error, Debug)]
pub enum VolscopeError {
    /// Scene data error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// GPU or pass error.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Mapping the readback buffer failed.
    #[error("readback failed: {0}")]
    ReadbackFailed(String),

    /// Depth bounds do not cover the image.
    #[error("expected {expected} depth values, got {actual}")]
    DepthSizeMismatch { expected: usize, actual: usize },
}

/// Result alias of the facade.
pub type Result<T> = std::result::Result<T, VolscopeError>;
