//! volscope-rs: multi-volume ray-cast compositing on wgpu.
//!
//! Any number of volumes, each with its own transform and transfer
//! functions, are ray-cast in a single full-screen pass and composited front
//! to back onto an existing color target.
//!
//! # Quick Start
//!
//! ```no_run
//! use volscope::*;
//!
//! fn main() -> Result<()> {
//!     init();
//!
//!     let image = ImageData::from_fn([32, 32, 32], |i, j, k| (i + j + k) as f32)?;
//!     let volume = Volume::new(VolumeMapper::new(image)).into_handle();
//!
//!     let mut camera = Camera::new(1.0);
//!     camera.look_at_box(DVec3::ZERO, DVec3::splat(31.0));
//!
//!     let mut renderer = HeadlessRenderer::new(256, 256, VolumePassOptions::default())?;
//!     let pixels = renderer.render(&[volume], &camera)?;
//!     assert_eq!(pixels.len(), 256 * 256 * 4);
//!     Ok(())
//! }
//! ```
//!
//! # Crates
//!
//! - `volscope-core`: volumes, properties, transfer functions, image data
//! - `volscope-render`: lookup tables, transform records, shaders and the
//!   [`VolumePass`] itself

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

mod error;
mod headless;

pub use error::{Result, VolscopeError};
pub use headless::{render_to_image, HeadlessRenderer};

// Re-export core types
pub use volscope_core::{
    load_options, BlendMode, ColorMode, ColorTransferFunction, CoreError, DMat3, DMat4, DVec3,
    ImageData, InterpolationType, PiecewiseFunction, TimeStamp, Volume, VolumeHandle,
    VolumeMapper, VolumePassOptions, VolumeProperty, MAX_COMPONENTS,
};

// Re-export render types
pub use volscope_render::{
    pipeline_hash, Camera, Drawable, FrameContext, FullScreenQuad, ProjectionMode, RayBounds,
    RenderDevice, RenderError, RendererState, ShaderSources, VolumePass,
};

/// Installs the `env_logger` backend, honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls leave the first logger in place.
pub fn init() {
    if env_logger::try_init().is_ok() {
        log::info!("volscope-rs initialized");
    }
}
