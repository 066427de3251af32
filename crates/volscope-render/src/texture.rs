//! Texture allocation, views and samplers.

use std::borrow::Cow;
use std::cell::Cell;

use half::f16;

use crate::error::{RenderError, RenderResult};

/// Texel payload of a texture request. Float data is kept as `f32` on the CPU
/// and packed to half floats on upload where the format asks for it.
#[derive(Debug, Clone, Copy)]
pub enum TexelData<'a> {
    /// Four normalized bytes per texel.
    Rgba8Unorm(&'a [u8]),
    /// One filterable half float per texel.
    R16Float(&'a [f32]),
    /// Two filterable half floats per texel.
    Rg16Float(&'a [f32]),
    /// Four filterable half floats per texel.
    Rgba16Float(&'a [f32]),
    /// One unfilterable full float per texel.
    R32Float(&'a [f32]),
}

impl TexelData<'_> {
    /// The wgpu format the data is uploaded as.
    pub fn format(&self) -> wgpu::TextureFormat {
        match self {
            TexelData::Rgba8Unorm(_) => wgpu::TextureFormat::Rgba8Unorm,
            TexelData::R16Float(_) => wgpu::TextureFormat::R16Float,
            TexelData::Rg16Float(_) => wgpu::TextureFormat::Rg16Float,
            TexelData::Rgba16Float(_) => wgpu::TextureFormat::Rgba16Float,
            TexelData::R32Float(_) => wgpu::TextureFormat::R32Float,
        }
    }

    /// Number of values per texel.
    pub fn channels(&self) -> usize {
        match self {
            TexelData::R16Float(_) | TexelData::R32Float(_) => 1,
            TexelData::Rg16Float(_) => 2,
            TexelData::Rgba8Unorm(_) | TexelData::Rgba16Float(_) => 4,
        }
    }

    /// Bytes per texel once uploaded.
    pub fn bytes_per_texel(&self) -> usize {
        match self {
            TexelData::Rgba8Unorm(_) | TexelData::R32Float(_) => 4,
            TexelData::R16Float(_) => 2,
            TexelData::Rg16Float(_) => 4,
            TexelData::Rgba16Float(_) => 8,
        }
    }

    fn len(&self) -> usize {
        match self {
            TexelData::Rgba8Unorm(d) => d.len(),
            TexelData::R16Float(d)
            | TexelData::Rg16Float(d)
            | TexelData::Rgba16Float(d)
            | TexelData::R32Float(d) => d.len(),
        }
    }

    /// Returns the upload bytes, packing half floats as needed.
    pub fn bytes(&self) -> Cow<'_, [u8]> {
        match self {
            TexelData::Rgba8Unorm(d) => Cow::Borrowed(d),
            TexelData::R32Float(d) => Cow::Borrowed(bytemuck::cast_slice(d)),
            TexelData::R16Float(d) | TexelData::Rg16Float(d) | TexelData::Rgba16Float(d) => {
                Cow::Owned(
                    d.iter()
                        .flat_map(|&v| f16::from_f32(v).to_le_bytes())
                        .collect(),
                )
            }
        }
    }

    /// Whether samplers may filter this format.
    pub fn filterable(&self) -> bool {
        !matches!(self, TexelData::R32Float(_))
    }
}

/// A request for a texture initialized with data.
#[derive(Debug, Clone, Copy)]
pub struct TextureRequest<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    /// Depth in texels; only meaningful for 3D textures.
    pub depth: u32,
    pub dimension: wgpu::TextureDimension,
    pub data: TexelData<'a>,
}

impl TextureRequest<'_> {
    /// Checks that the data covers the extent exactly.
    pub fn validate(&self) -> RenderResult<()> {
        let texels = self.width as usize * self.height as usize * self.depth as usize;
        let expected = texels * self.data.channels();
        if texels == 0 || self.data.len() != expected {
            return Err(RenderError::TextureCreationFailed(format!(
                "'{}': {}x{}x{} needs {expected} values, got {}",
                self.label,
                self.width,
                self.height,
                self.depth,
                self.data.len()
            )));
        }
        if self.dimension == wgpu::TextureDimension::D2 && self.depth != 1 {
            return Err(RenderError::TextureCreationFailed(format!(
                "'{}': 2D texture with depth {}",
                self.label, self.depth
            )));
        }
        Ok(())
    }

    /// Checks the extent against the device's texture dimension limits.
    pub fn validate_limits(&self, limits: &wgpu::Limits) -> RenderResult<()> {
        let max = match self.dimension {
            wgpu::TextureDimension::D1 => limits.max_texture_dimension_1d,
            wgpu::TextureDimension::D2 => limits.max_texture_dimension_2d,
            wgpu::TextureDimension::D3 => limits.max_texture_dimension_3d,
        };
        let largest = self.width.max(self.height).max(self.depth);
        if largest > max {
            return Err(RenderError::TextureCreationFailed(format!(
                "'{}': {}x{}x{} exceeds the device limit of {max} texels per side",
                self.label, self.width, self.height, self.depth
            )));
        }
        Ok(())
    }
}

/// Allocates textures and counts allocations.
#[derive(Debug, Default)]
pub struct TextureManager {
    allocations: Cell<usize>,
}

impl TextureManager {
    /// Creates a texture and uploads the request's data.
    pub fn get_texture(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        request: &TextureRequest<'_>,
    ) -> RenderResult<Texture> {
        request.validate()?;
        request.validate_limits(&device.limits())?;

        let size = wgpu::Extent3d {
            width: request.width,
            height: request.height,
            depth_or_array_layers: request.depth,
        };
        let format = request.data.format();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(request.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: request.dimension,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &request.data.bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(request.width * request.data.bytes_per_texel() as u32),
                rows_per_image: Some(request.height),
            },
            size,
        );

        self.allocations.set(self.allocations.get() + 1);
        log::debug!(
            "allocated texture '{}' {}x{}x{} {format:?}",
            request.label,
            request.width,
            request.height,
            request.depth
        );

        Ok(Texture {
            texture,
            dimension: request.dimension,
            filterable: request.data.filterable(),
        })
    }

    /// Number of textures allocated so far.
    pub fn allocation_count(&self) -> usize {
        self.allocations.get()
    }
}

/// A texture created by the [`TextureManager`].
pub struct Texture {
    texture: wgpu::Texture,
    dimension: wgpu::TextureDimension,
    filterable: bool,
}

impl Texture {
    /// Returns the wgpu texture.
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Creates a named view over the whole texture.
    pub fn create_view(&self, name: &str) -> TextureView {
        let view_dimension = match self.dimension {
            wgpu::TextureDimension::D1 => wgpu::TextureViewDimension::D1,
            wgpu::TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            wgpu::TextureDimension::D3 => wgpu::TextureViewDimension::D3,
        };
        let view = self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(name),
            dimension: Some(view_dimension),
            ..Default::default()
        });
        TextureView {
            binding: TextureBinding {
                name: name.to_string(),
                view_dimension,
                filterable: self.filterable,
            },
            view,
            sampler: None,
        }
    }
}

/// Shader-facing description of a sampled texture binding.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    pub name: String,
    pub view_dimension: wgpu::TextureViewDimension,
    pub filterable: bool,
}

impl TextureBinding {
    /// WGSL declaration, e.g. `var tfun_texture: texture_2d<f32>;`.
    pub fn shader_declaration(&self, group: u32, binding: u32) -> String {
        let ty = match self.view_dimension {
            wgpu::TextureViewDimension::D1 => "texture_1d<f32>",
            wgpu::TextureViewDimension::D3 => "texture_3d<f32>",
            _ => "texture_2d<f32>",
        };
        format!("@group({group}) @binding({binding}) var {}: {ty};", self.name)
    }

    /// Bind group layout entry type.
    pub fn binding_type(&self) -> wgpu::BindingType {
        wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float {
                filterable: self.filterable,
            },
            view_dimension: self.view_dimension,
            multisampled: false,
        }
    }
}

/// A named texture view, optionally carrying its own sampler.
pub struct TextureView {
    binding: TextureBinding,
    view: wgpu::TextureView,
    sampler: Option<Sampler>,
}

impl TextureView {
    /// Wraps a view created elsewhere, e.g. a caller-owned depth texture.
    pub fn from_wgpu(
        name: &str,
        view: wgpu::TextureView,
        view_dimension: wgpu::TextureViewDimension,
        filterable: bool,
    ) -> Self {
        Self {
            binding: TextureBinding {
                name: name.to_string(),
                view_dimension,
                filterable,
            },
            view,
            sampler: None,
        }
    }

    /// Returns the WGSL name.
    pub fn name(&self) -> &str {
        &self.binding.name
    }

    /// Returns the binding description.
    pub fn binding(&self) -> &TextureBinding {
        &self.binding
    }

    /// Returns the wgpu view.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Attaches a sampler named `{view name}_sampler`.
    pub fn add_sampler(&mut self, device: &wgpu::Device, options: SamplerOptions) {
        let name = format!("{}_sampler", self.binding.name);
        self.sampler = Some(Sampler::new(device, &name, options));
    }

    /// Returns the attached sampler.
    pub fn sampler(&self) -> Option<&Sampler> {
        self.sampler.as_ref()
    }
}

/// Filtering choice for a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerOptions {
    pub filter: wgpu::FilterMode,
}

impl SamplerOptions {
    /// Linear filtering, clamped.
    pub fn linear() -> Self {
        Self {
            filter: wgpu::FilterMode::Linear,
        }
    }

    /// Nearest filtering, clamped.
    pub fn nearest() -> Self {
        Self {
            filter: wgpu::FilterMode::Nearest,
        }
    }
}

/// Shader-facing description of a sampler binding.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerBinding {
    pub name: String,
}

impl SamplerBinding {
    /// WGSL declaration.
    pub fn shader_declaration(&self, group: u32, binding: u32) -> String {
        format!("@group({group}) @binding({binding}) var {}: sampler;", self.name)
    }

    /// Bind group layout entry type. Filtering samplers accept nearest too.
    pub fn binding_type(&self) -> wgpu::BindingType {
        wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
    }
}

/// A named sampler.
pub struct Sampler {
    binding: SamplerBinding,
    options: SamplerOptions,
    sampler: wgpu::Sampler,
}

impl Sampler {
    /// Creates a clamp-to-edge sampler.
    pub fn new(device: &wgpu::Device, name: &str, options: SamplerOptions) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(name),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: options.filter,
            min_filter: options.filter,
            ..Default::default()
        });
        Self {
            binding: SamplerBinding {
                name: name.to_string(),
            },
            options,
            sampler,
        }
    }

    /// Returns the binding description.
    pub fn binding(&self) -> &SamplerBinding {
        &self.binding
    }

    /// Returns the options the sampler was created with.
    pub fn options(&self) -> SamplerOptions {
        self.options
    }

    /// Returns the wgpu sampler.
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_packing() {
        let data = [1.0_f32, 0.5];
        let texels = TexelData::R16Float(&data);
        let bytes = texels.bytes();
        assert_eq!(bytes.len(), 4);
        assert_eq!(&bytes[0..2], &f16::from_f32(1.0).to_le_bytes());
        assert_eq!(&bytes[2..4], &f16::from_f32(0.5).to_le_bytes());
        assert_eq!(texels.format(), wgpu::TextureFormat::R16Float);
    }

    #[test]
    fn test_full_float_is_borrowed_and_unfilterable() {
        let data = [0.25_f32; 4];
        let texels = TexelData::R32Float(&data);
        assert!(matches!(texels.bytes(), Cow::Borrowed(_)));
        assert!(!texels.filterable());
    }

    #[test]
    fn test_request_validation() {
        let color = vec![0u8; 4 * 8 * 2];
        let mut request = TextureRequest {
            label: "lut",
            width: 8,
            height: 2,
            depth: 1,
            dimension: wgpu::TextureDimension::D2,
            data: TexelData::Rgba8Unorm(&color),
        };
        assert!(request.validate().is_ok());

        request.height = 3;
        assert!(request.validate().is_err());

        request.height = 1;
        request.depth = 2;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_request_limits() {
        let limits = wgpu::Limits::downlevel_defaults();
        let opacity = vec![0.0_f32; 4096];
        let wide = TextureRequest {
            label: "ofun_texture",
            width: 4096,
            height: 1,
            depth: 1,
            dimension: wgpu::TextureDimension::D2,
            data: TexelData::R32Float(&opacity),
        };
        assert!(wide.validate_limits(&wgpu::Limits::default()).is_ok());
        assert!(matches!(
            wide.validate_limits(&limits),
            Err(RenderError::TextureCreationFailed(_))
        ));

        let voxels = vec![0.0_f32; 512];
        let tall = TextureRequest {
            label: "volume_texture_0",
            width: 1,
            height: 1,
            depth: 512,
            dimension: wgpu::TextureDimension::D3,
            data: TexelData::R32Float(&voxels),
        };
        assert!(tall.validate_limits(&limits).is_err());
        assert!(tall.validate_limits(&wgpu::Limits::default()).is_ok());
    }

    #[test]
    fn test_binding_declarations() {
        let tex = TextureBinding {
            name: "volume_texture_0".into(),
            view_dimension: wgpu::TextureViewDimension::D3,
            filterable: true,
        };
        assert_eq!(
            tex.shader_declaration(0, 7),
            "@group(0) @binding(7) var volume_texture_0: texture_3d<f32>;"
        );
        let sampler = SamplerBinding {
            name: "tfun_texture_sampler".into(),
        };
        assert_eq!(
            sampler.shader_declaration(0, 4),
            "@group(0) @binding(4) var tfun_texture_sampler: sampler;"
        );
    }
}
