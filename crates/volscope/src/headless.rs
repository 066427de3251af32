//! Headless rendering of volume sets.
//!
//! Renders volumes into an offscreen RGBA target and reads the pixels back,
//! without a window. Used by the integration tests and for batch images.

use pollster::FutureExt;
use volscope_core::{VolumeHandle, VolumePassOptions};
use volscope_render::{
    Camera, Drawable, FrameContext, RayBounds, RenderDevice, RendererState, VolumePass,
};

use crate::error::{Result, VolscopeError};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Copy rows must start on 256-byte boundaries.
fn aligned_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// An offscreen target, its device and a volume pass that persists between
/// frames, so pipelines and lookup tables are reused.
pub struct HeadlessRenderer {
    device: RenderDevice,
    pass: VolumePass,
    renderer: Option<RendererState>,
    width: u32,
    height: u32,
    target: wgpu::Texture,
    readback: wgpu::Buffer,
    background: wgpu::Color,
    min_depths: Vec<f32>,
    max_depths: Vec<f32>,
    bounds_dirty: bool,
}

impl HeadlessRenderer {
    /// Creates a device and a `width x height` target.
    pub fn new(width: u32, height: u32, options: VolumePassOptions) -> Result<Self> {
        let device = RenderDevice::new_headless().block_on()?;
        Ok(Self::with_device(device, width, height, options))
    }

    /// Uses an existing device.
    pub fn with_device(
        device: RenderDevice,
        width: u32,
        height: u32,
        options: VolumePassOptions,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let target = device.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("headless target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let readback = device.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("headless readback"),
            size: u64::from(aligned_bytes_per_row(width)) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let pixels = (width * height) as usize;

        Self {
            device,
            pass: VolumePass::new(options),
            renderer: None,
            width,
            height,
            target,
            readback,
            background: wgpu::Color::BLACK,
            min_depths: vec![0.0; pixels],
            max_depths: vec![1.0; pixels],
            bounds_dirty: true,
        }
    }

    /// Target size in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the device.
    pub fn device(&self) -> &RenderDevice {
        &self.device
    }

    /// Returns the volume pass.
    pub fn pass(&self) -> &VolumePass {
        &self.pass
    }

    /// Returns the volume pass for editing.
    pub fn pass_mut(&mut self) -> &mut VolumePass {
        &mut self.pass
    }

    /// Color the target is cleared to before compositing.
    pub fn set_background(&mut self, color: wgpu::Color) {
        self.background = color;
    }

    /// Per-pixel ray bounds in clip depth, row-major. Defaults to the whole
    /// `[0, 1]` depth range.
    pub fn set_depth_bounds(&mut self, min_depths: Vec<f32>, max_depths: Vec<f32>) -> Result<()> {
        let expected = (self.width * self.height) as usize;
        for depths in [&min_depths, &max_depths] {
            if depths.len() != expected {
                return Err(VolscopeError::DepthSizeMismatch {
                    expected,
                    actual: depths.len(),
                });
            }
        }
        self.min_depths = min_depths;
        self.max_depths = max_depths;
        self.bounds_dirty = true;
        Ok(())
    }

    /// Clears the target, composites `volumes` seen from `camera` and returns
    /// `width * height * 4` RGBA bytes, top row first.
    pub fn render(&mut self, volumes: &[VolumeHandle], camera: &Camera) -> Result<Vec<u8>> {
        let options = self.pass.options().clone();
        let renderer = self
            .renderer
            .get_or_insert_with(|| RendererState::new(camera.clone(), &options));
        *renderer.camera_mut() = camera.clone();
        renderer.update(&self.device)?;

        self.pass.set_volumes(volumes);
        if self.bounds_dirty {
            self.pass.set_ray_bounds(RayBounds::from_depths(
                &self.device,
                self.width,
                self.height,
                &self.min_depths,
                &self.max_depths,
            )?);
            self.bounds_dirty = false;
        }

        let view = self
            .target
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("headless render encoder"),
            });

        {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("headless clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.background),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
        }

        let mut ctx = FrameContext {
            device: &self.device,
            encoder: &mut encoder,
            target: &view,
            target_format: TARGET_FORMAT,
            renderer: &*renderer,
        };
        self.pass.build(&mut ctx)?;

        self.copy_to_readback(encoder)
    }

    fn copy_to_readback(&self, mut encoder: wgpu::CommandEncoder) -> Result<Vec<u8>> {
        let bytes_per_row = aligned_bytes_per_row(self.width);
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.device.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| VolscopeError::ReadbackFailed(e.to_string()))?
            .map_err(|e| VolscopeError::ReadbackFailed(e.to_string()))?;

        // Strip the row padding
        let data = slice.get_mapped_range();
        let row_bytes = (self.width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height {
            let start = (row * bytes_per_row) as usize;
            pixels.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        self.readback.unmap();

        Ok(pixels)
    }
}

/// Renders `volumes` once into a fresh headless target and returns the RGBA
/// pixels.
///
/// # Example
/// ```no_run
/// use volscope::*;
///
/// let image = ImageData::from_fn([8, 8, 8], |i, _, _| i as f32).unwrap();
/// let volume = Volume::new(VolumeMapper::new(image)).into_handle();
/// let pixels = render_to_image(&[volume], &Camera::new(1.0), 64, 64).unwrap();
/// assert_eq!(pixels.len(), 64 * 64 * 4);
/// ```
pub fn render_to_image(
    volumes: &[VolumeHandle],
    camera: &Camera,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    HeadlessRenderer::new(width, height, VolumePassOptions::default())?.render(volumes, camera)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
        assert_eq!(aligned_bytes_per_row(200), 1024);
    }

    proptest! {
        #[test]
        fn prop_aligned_rows_fit_one_padding_block(width in 1_u32..8192) {
            let row = aligned_bytes_per_row(width);
            prop_assert_eq!(row % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);
            prop_assert!(row >= width * 4);
            prop_assert!(row < width * 4 + wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        }
    }
}
