//! The per-frame drawing interface shared by passes.

use crate::device::RenderDevice;
use crate::error::RenderResult;
use crate::renderer::RendererState;

/// Everything a pass needs to record its commands for one frame.
pub struct FrameContext<'a> {
    pub device: &'a RenderDevice,
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Color target the pass composites onto.
    pub target: &'a wgpu::TextureView,
    pub target_format: wgpu::TextureFormat,
    pub renderer: &'a RendererState,
}

/// A pass that can record itself into a frame.
pub trait Drawable {
    /// Updates whatever is stale and records the draw.
    fn build(&mut self, ctx: &mut FrameContext<'_>) -> RenderResult<()>;
}
