//! GPU device handle shared by every pass.

use crate::error::{RenderError, RenderResult};
use crate::texture::TextureManager;

/// The wgpu device and queue plus the texture manager allocating through them.
pub struct RenderDevice {
    /// The wgpu device.
    pub device: wgpu::Device,
    /// The wgpu queue.
    pub queue: wgpu::Queue,
    textures: TextureManager,
}

impl RenderDevice {
    /// Wraps an existing device and queue.
    #[must_use]
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            textures: TextureManager::default(),
        }
    }

    /// Creates a device without a surface.
    pub async fn new_headless() -> RenderResult<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::AdapterCreationFailed)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("volscope device"),
                    ..Default::default()
                },
                None,
            )
            .await?;

        log::info!("created headless device on {:?}", adapter.get_info().name);
        Ok(Self::from_parts(device, queue))
    }

    /// Returns the texture manager.
    #[must_use]
    pub fn texture_manager(&self) -> &TextureManager {
        &self.textures
    }
}
