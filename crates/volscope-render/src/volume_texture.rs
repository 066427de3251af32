//! Per-volume 3D scalar textures.
//!
//! Raw scalars are normalized per component into `[0, 1]` before upload so
//! they fit half-float storage. The normalization is kept as a
//! [`VolumeInfo`]: `raw = sampled * scale + offset`.

use volscope_core::{ImageData, VolumeHandle};

use crate::device::RenderDevice;
use crate::error::RenderResult;
use crate::texture::{TexelData, TextureRequest, TextureView};

/// How raw scalars were encoded into a volume texture, per component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeInfo {
    pub scale: [f64; 4],
    pub offset: [f64; 4],
}

impl Default for VolumeInfo {
    fn default() -> Self {
        Self {
            scale: [1.0; 4],
            offset: [0.0; 4],
        }
    }
}

impl VolumeInfo {
    /// Derives the encoding from each component's scalar range. Constant
    /// components keep a unit scale.
    pub fn from_image(image: &ImageData) -> Self {
        let mut info = Self::default();
        for c in 0..image.number_of_components() {
            let [lo, hi] = image.scalar_range(c);
            let (lo, hi) = (f64::from(lo), f64::from(hi));
            info.offset[c] = lo;
            info.scale[c] = if hi > lo { hi - lo } else { 1.0 };
        }
        info
    }

    /// Maps a raw scalar of `component` to its encoded value.
    pub fn encode(&self, component: usize, raw: f64) -> f64 {
        (raw - self.offset[component]) / self.scale[component]
    }
}

/// Normalized texels ready for upload.
#[derive(Debug, Clone)]
pub struct ScalarTextureData {
    pub dimensions: [u32; 3],
    /// Channels per texel on the GPU (1, 2 or 4).
    pub channels: usize,
    pub texels: Vec<f32>,
    pub info: VolumeInfo,
}

impl ScalarTextureData {
    /// Normalizes an image's scalars. Three-component data is padded to four.
    pub fn from_image(image: &ImageData) -> Self {
        let info = VolumeInfo::from_image(image);
        let components = image.number_of_components();
        let channels = match components {
            1 => 1,
            2 => 2,
            _ => 4,
        };

        let mut texels = Vec::with_capacity(image.number_of_points() * channels);
        for point in image.scalars().chunks_exact(components) {
            for c in 0..channels {
                let v = point
                    .get(c)
                    .map_or(0.0, |&raw| info.encode(c, f64::from(raw)));
                texels.push(if v.is_finite() { v as f32 } else { 0.0 });
            }
        }

        Self {
            dimensions: image.dimensions(),
            channels,
            texels,
            info,
        }
    }

    /// Upload payload.
    pub fn texel_data(&self) -> TexelData<'_> {
        match self.channels {
            1 => TexelData::R16Float(&self.texels),
            2 => TexelData::Rg16Float(&self.texels),
            _ => TexelData::Rgba16Float(&self.texels),
        }
    }
}

struct CachedTexture {
    image_mtime: u64,
    view: TextureView,
}

/// One uploaded 3D texture per volume slot, re-uploaded when the slot's
/// image changes.
#[derive(Default)]
pub struct VolumeTextureCache {
    slots: Vec<Option<CachedTexture>>,
}

impl VolumeTextureCache {
    /// Uploads textures for images that changed. Returns whether any did.
    pub fn update(&mut self, device: &RenderDevice, volumes: &[VolumeHandle]) -> RenderResult<bool> {
        self.slots.resize_with(volumes.len(), || None);
        let mut changed = false;

        for (i, (slot, handle)) in self.slots.iter_mut().zip(volumes).enumerate() {
            let volume = handle.borrow();
            let image = volume.mapper().input();
            if slot.as_ref().is_some_and(|s| s.image_mtime == image.mtime()) {
                continue;
            }

            let data = ScalarTextureData::from_image(image);
            let [width, height, depth] = data.dimensions;
            let name = format!("volume_texture_{i}");
            let texture = device.texture_manager().get_texture(
                &device.device,
                &device.queue,
                &TextureRequest {
                    label: &name,
                    width,
                    height,
                    depth,
                    dimension: wgpu::TextureDimension::D3,
                    data: data.texel_data(),
                },
            )?;
            *slot = Some(CachedTexture {
                image_mtime: image.mtime(),
                view: texture.create_view(&name),
            });
            changed = true;
        }
        Ok(changed)
    }

    /// Returns the view of volume slot `index`, if uploaded.
    pub fn view(&self, index: usize) -> Option<&TextureView> {
        self.slots.get(index)?.as_ref().map(|s| &s.view)
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_from_range() {
        let image = ImageData::new([2, 1, 1], 2, vec![10.0, 5.0, 30.0, 5.0]).unwrap();
        let info = VolumeInfo::from_image(&image);
        assert_eq!(info.offset[0], 10.0);
        assert_eq!(info.scale[0], 20.0);
        // Constant component
        assert_eq!(info.offset[1], 5.0);
        assert_eq!(info.scale[1], 1.0);
        // Unused slots stay identity
        assert_eq!(info.scale[3], 1.0);
    }

    #[test]
    fn test_normalized_texels() {
        let image = ImageData::new([3, 1, 1], 1, vec![-1.0, 0.0, 1.0]).unwrap();
        let data = ScalarTextureData::from_image(&image);
        assert_eq!(data.channels, 1);
        assert_eq!(data.texels, vec![0.0, 0.5, 1.0]);
        // Decoding recovers the raw value
        let raw = f64::from(data.texels[1]) * data.info.scale[0] + data.info.offset[0];
        assert!(raw.abs() < 1e-12);
    }

    #[test]
    fn test_three_components_padded() {
        let image = ImageData::new([1, 1, 2], 3, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        let data = ScalarTextureData::from_image(&image);
        assert_eq!(data.channels, 4);
        assert_eq!(data.texels, vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0]);
        assert!(matches!(data.texel_data(), TexelData::Rgba16Float(_)));
    }

    #[test]
    fn test_non_finite_scalars_zeroed() {
        let image = ImageData::new([2, 1, 1], 1, vec![f32::NAN, 2.0]).unwrap();
        let data = ScalarTextureData::from_image(&image);
        assert_eq!(data.texels[0], 0.0);
    }
}
