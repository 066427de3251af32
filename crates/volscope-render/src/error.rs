//! Rendering error types.

use thiserror::Error;

use volscope_core::CoreError;

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Pipeline creation failed.
    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),

    /// Buffer creation or layout failed.
    #[error("buffer error: {0}")]
    BufferCreationFailed(String),

    /// Texture creation failed.
    #[error("texture creation failed: {0}")]
    TextureCreationFailed(String),

    /// The volume pass was asked to build without any volumes.
    #[error("volume pass has no volumes")]
    NoVolumes,

    /// The volume pass was asked to draw without ray bound textures.
    #[error("volume pass has no ray bounds; call set_ray_bounds first")]
    MissingRayBounds,

    /// A transfer function with an empty declared range.
    #[error("volume {volume}: {function} transfer function has degenerate range [{lo}, {hi}]")]
    DegenerateRange {
        volume: usize,
        function: &'static str,
        lo: f64,
        hi: f64,
    },

    /// Error from the scene data model.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Timeout waiting for GPU.
    #[error("timeout waiting for GPU")]
    Timeout,
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
