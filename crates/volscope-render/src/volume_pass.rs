//! Multi-volume ray-casting pass.
//!
//! One full-screen draw marches every pixel's ray between caller-supplied
//! near/far depths and composites all volumes front to back. Per frame the
//! pass:
//!
//! 1. computes the pipeline hash from the volume count and blend mode,
//! 2. refreshes the mapper uniform, the volume textures, the lookup tables
//!    and the per-volume transform records, each only when stale,
//! 3. draws through its [`FullScreenQuad`], whose pipeline cache is keyed by
//!    that hash.

use std::rc::Rc;

use volscope_core::{
    BlendMode, InterpolationType, TimeStamp, VolumeHandle, VolumePassOptions,
};

use crate::buffer::{EntryType, UniformBuffer};
use crate::device::RenderDevice;
use crate::drawable::{Drawable, FrameContext};
use crate::error::{RenderError, RenderResult};
use crate::fullscreen_quad::{BindingDeclaration, FullScreenQuad};
use crate::lookup_table::LookupTableBuilder;
use crate::renderer::RendererState;
use crate::shader::ShaderDescription;
use crate::texture::{
    Sampler, SamplerBinding, SamplerOptions, TexelData, TextureBinding, TextureRequest,
    TextureView,
};
use crate::volume_shader::{apply_hooks, VolumeShaderParams, VOLUME_FRAGMENT_TEMPLATE};
use crate::volume_texture::VolumeTextureCache;
use crate::volume_transform::VolumeTransformBuffer;

/// Caller-owned per-pixel ray bounds: the depth (in `[0, 1]` clip depth) at
/// which each ray enters and leaves the volumes. Rays with `max <= min` are
/// skipped.
pub struct RayBounds {
    min: TextureView,
    max: TextureView,
}

impl RayBounds {
    /// Wraps two `R32Float` 2D views the size of the target.
    pub fn new(min: wgpu::TextureView, max: wgpu::TextureView) -> Self {
        Self {
            min: TextureView::from_wgpu("min_texture", min, D2, false),
            max: TextureView::from_wgpu("max_texture", max, D2, false),
        }
    }

    /// Uploads per-pixel depth arrays (row-major, `width * height` each).
    pub fn from_depths(
        device: &RenderDevice,
        width: u32,
        height: u32,
        min_depths: &[f32],
        max_depths: &[f32],
    ) -> RenderResult<Self> {
        let upload = |name: &str, depths: &[f32]| {
            device
                .texture_manager()
                .get_texture(
                    &device.device,
                    &device.queue,
                    &TextureRequest {
                        label: name,
                        width,
                        height,
                        depth: 1,
                        dimension: wgpu::TextureDimension::D2,
                        data: TexelData::R32Float(depths),
                    },
                )
                .map(|texture| texture.create_view(name))
        };
        Ok(Self {
            min: upload("min_texture", min_depths)?,
            max: upload("max_texture", max_depths)?,
        })
    }
}

struct LutViews {
    color: TextureView,
    opacity: TextureView,
}

/// Binding slots in `@binding` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    RendererUbo,
    MapperUbo,
    VolumeSsbo,
    TfunTexture,
    TfunSampler,
    OfunTexture,
    MinTexture,
    MaxTexture,
    VolumeSampler,
    VolumeTexture(usize),
}

fn slots(volume_count: usize) -> Vec<Slot> {
    let mut slots = vec![
        Slot::RendererUbo,
        Slot::MapperUbo,
        Slot::VolumeSsbo,
        Slot::TfunTexture,
        Slot::TfunSampler,
        Slot::OfunTexture,
        Slot::MinTexture,
        Slot::MaxTexture,
        Slot::VolumeSampler,
    ];
    slots.extend((0..volume_count).map(Slot::VolumeTexture));
    slots
}

const D2: wgpu::TextureViewDimension = wgpu::TextureViewDimension::D2;
const D3: wgpu::TextureViewDimension = wgpu::TextureViewDimension::D3;

fn texture_declaration(
    name: String,
    view_dimension: wgpu::TextureViewDimension,
    filterable: bool,
    binding: u32,
) -> (wgpu::BindingType, String) {
    let texture = TextureBinding {
        name,
        view_dimension,
        filterable,
    };
    (texture.binding_type(), texture.shader_declaration(0, binding))
}

fn not_ready(what: &str) -> RenderError {
    RenderError::PipelineCreationFailed(format!("{what} has not been uploaded"))
}

/// GPU-side state owned by the pass, kept apart from the quad so both can be
/// borrowed while drawing.
struct PassResources {
    mapper_ubo: UniformBuffer,
    lut: LookupTableBuilder,
    lut_views: Option<LutViews>,
    transforms: VolumeTransformBuffer,
    volume_textures: VolumeTextureCache,
    volume_sampler: Option<Sampler>,
    ray_bounds: Option<RayBounds>,
}

impl PassResources {
    fn declaration(&self, slot: Slot, binding: u32, renderer: &RendererState) -> BindingDeclaration {
        let (ty, wgsl) = match slot {
            Slot::RendererUbo => (
                renderer.ubo().binding_type(),
                renderer.ubo().shader_declaration(0, binding),
            ),
            Slot::MapperUbo => (
                self.mapper_ubo.binding_type(),
                self.mapper_ubo.shader_declaration(0, binding),
            ),
            Slot::VolumeSsbo => {
                let ssbo = self.transforms.storage_buffer();
                (ssbo.binding_type(), ssbo.shader_declaration(0, binding))
            }
            Slot::TfunSampler | Slot::VolumeSampler => {
                let name = if slot == Slot::TfunSampler {
                    "tfun_texture_sampler"
                } else {
                    "volume_sampler"
                };
                let sampler = SamplerBinding { name: name.into() };
                (sampler.binding_type(), sampler.shader_declaration(0, binding))
            }
            Slot::TfunTexture => texture_declaration("tfun_texture".into(), D2, true, binding),
            Slot::OfunTexture => texture_declaration("ofun_texture".into(), D2, true, binding),
            Slot::MinTexture => texture_declaration("min_texture".into(), D2, false, binding),
            Slot::MaxTexture => texture_declaration("max_texture".into(), D2, false, binding),
            Slot::VolumeTexture(i) => {
                texture_declaration(format!("volume_texture_{i}"), D3, true, binding)
            }
        };
        BindingDeclaration { ty, wgsl }
    }

    fn resource<'a>(
        &'a self,
        slot: Slot,
        renderer: &'a RendererState,
    ) -> RenderResult<wgpu::BindingResource<'a>> {
        let resource = match slot {
            Slot::RendererUbo => renderer
                .ubo()
                .buffer()
                .ok_or_else(|| not_ready("renderer_ubo"))?
                .as_entire_binding(),
            Slot::MapperUbo => self
                .mapper_ubo
                .buffer()
                .ok_or_else(|| not_ready("mapper_ubo"))?
                .as_entire_binding(),
            Slot::VolumeSsbo => self
                .transforms
                .storage_buffer()
                .buffer()
                .ok_or_else(|| not_ready("volume_ssbo"))?
                .as_entire_binding(),
            Slot::TfunTexture | Slot::TfunSampler | Slot::OfunTexture => {
                let views = self.lut_views.as_ref().ok_or_else(|| not_ready("lookup table"))?;
                match slot {
                    Slot::TfunTexture => wgpu::BindingResource::TextureView(views.color.view()),
                    Slot::OfunTexture => wgpu::BindingResource::TextureView(views.opacity.view()),
                    _ => wgpu::BindingResource::Sampler(
                        views
                            .color
                            .sampler()
                            .ok_or_else(|| not_ready("lookup table sampler"))?
                            .sampler(),
                    ),
                }
            }
            Slot::MinTexture | Slot::MaxTexture => {
                let bounds = self.ray_bounds.as_ref().ok_or(RenderError::MissingRayBounds)?;
                let view = if slot == Slot::MinTexture {
                    &bounds.min
                } else {
                    &bounds.max
                };
                wgpu::BindingResource::TextureView(view.view())
            }
            Slot::VolumeSampler => wgpu::BindingResource::Sampler(
                self.volume_sampler
                    .as_ref()
                    .ok_or_else(|| not_ready("volume_sampler"))?
                    .sampler(),
            ),
            Slot::VolumeTexture(i) => wgpu::BindingResource::TextureView(
                self.volume_textures
                    .view(i)
                    .ok_or_else(|| not_ready("volume texture"))?
                    .view(),
            ),
        };
        Ok(resource)
    }
}

/// Final shader source of a pass configuration.
#[derive(Debug, Clone)]
pub struct ShaderSources {
    pub hash: String,
    pub vertex: String,
    pub fragment: String,
}

/// Ray-casting compositor drawing a list of volumes with one full-screen quad.
pub struct VolumePass {
    quad: FullScreenQuad,
    options: VolumePassOptions,
    volumes: Vec<VolumeHandle>,
    time: TimeStamp,
    blend_mode: BlendMode,
    pipeline_hash: String,
    sample_distance: Option<f64>,
    res: PassResources,
}

impl Default for VolumePass {
    fn default() -> Self {
        Self::new(VolumePassOptions::default())
    }
}

impl VolumePass {
    /// Creates a pass with no volumes.
    pub fn new(options: VolumePassOptions) -> Self {
        let mut mapper_ubo = UniformBuffer::new("mapper_ubo");
        mapper_ubo.add_entry("SampleDistance", EntryType::F32);
        mapper_ubo.add_entry("OpacitySaturation", EntryType::F32);

        Self {
            quad: FullScreenQuad::new("volume pass", VOLUME_FRAGMENT_TEMPLATE),
            volumes: Vec::new(),
            time: TimeStamp::now(),
            blend_mode: BlendMode::Composite,
            pipeline_hash: String::new(),
            sample_distance: None,
            res: PassResources {
                mapper_ubo,
                lut: LookupTableBuilder::new(options.row_length),
                lut_views: None,
                transforms: VolumeTransformBuffer::new(),
                volume_textures: VolumeTextureCache::default(),
                volume_sampler: None,
                ray_bounds: None,
            },
            options,
        }
    }

    /// Returns the options.
    pub fn options(&self) -> &VolumePassOptions {
        &self.options
    }

    /// Replaces the options.
    pub fn set_options(&mut self, options: VolumePassOptions) -> RenderResult<()> {
        if self.options == options {
            return Ok(());
        }
        self.res.lut.set_row_length(options.row_length);
        self.res
            .mapper_ubo
            .set_value("OpacitySaturation", f64::from(options.opacity_saturation))?;
        self.options = options;
        self.time.modified();
        Ok(())
    }

    /// Modification time of the pass itself.
    pub fn mtime(&self) -> u64 {
        self.time.mtime()
    }

    /// Returns the volumes in draw order.
    pub fn volumes(&self) -> &[VolumeHandle] {
        &self.volumes
    }

    /// Replaces the volume list. The pass is marked modified only when the
    /// length differs or any position holds a different volume.
    pub fn set_volumes(&mut self, volumes: &[VolumeHandle]) -> bool {
        let unchanged = self.volumes.len() == volumes.len()
            && self
                .volumes
                .iter()
                .zip(volumes)
                .all(|(a, b)| Rc::ptr_eq(a, b));
        if unchanged {
            return false;
        }
        self.volumes = volumes.to_vec();
        self.time.modified();
        true
    }

    /// Sets the per-pixel ray bounds used by the next draws.
    pub fn set_ray_bounds(&mut self, bounds: RayBounds) {
        self.res.ray_bounds = Some(bounds);
    }

    /// Blend mode of the last hash computation.
    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Pipeline hash of the last hash computation.
    pub fn pipeline_hash(&self) -> &str {
        &self.pipeline_hash
    }

    fn shader_params(&self) -> RenderResult<VolumeShaderParams> {
        let first = self.volumes.first().ok_or(RenderError::NoVolumes)?;
        let blend_mode = first.borrow().mapper().blend_mode();
        Ok(VolumeShaderParams {
            volume_count: self.volumes.len(),
            blend_mode,
        })
    }

    /// Computes the pipeline hash. The blend mode comes from the first
    /// volume only.
    pub fn compute_pipeline_hash(&mut self) -> RenderResult<&str> {
        let params = self.shader_params()?;
        self.blend_mode = params.blend_mode;
        self.pipeline_hash = params.hash();
        Ok(&self.pipeline_hash)
    }

    /// Smallest sample distance over all volumes.
    pub fn min_sample_distance(&self) -> Option<f64> {
        self.volumes
            .iter()
            .map(|v| v.borrow().mapper().sample_distance())
            .reduce(f64::min)
    }

    /// Declarations in `@binding` order.
    fn binding_declarations(&self, renderer: &RendererState) -> Vec<BindingDeclaration> {
        slots(self.volumes.len())
            .into_iter()
            .enumerate()
            .map(|(i, slot)| self.res.declaration(slot, i as u32, renderer))
            .collect()
    }

    /// Assembles the shaders the next draw would compile, without a device.
    pub fn shader_sources(&self, renderer: &RendererState) -> RenderResult<ShaderSources> {
        let params = self.shader_params()?;
        let hash = params.hash();
        let declarations = self.binding_declarations(renderer);
        let hooks = |v: &mut ShaderDescription, f: &mut ShaderDescription| apply_hooks(&params, v, f);
        let (vertex, fragment) = self.quad.assemble_shaders(&hash, &declarations, &hooks);
        Ok(ShaderSources {
            hash,
            vertex: vertex.code().to_string(),
            fragment: fragment.code().to_string(),
        })
    }

    /// Rebuilds the lookup-table textures if stale. Returns whether it did.
    pub fn update_lut_image(&mut self, device: &RenderDevice) -> RenderResult<bool> {
        let sample_distance = self.sample_distance.unwrap_or(1.0);
        let Some(image) = self
            .res
            .lut
            .build(&self.volumes, self.time.mtime(), sample_distance)?
        else {
            return Ok(false);
        };

        let manager = device.texture_manager();
        let color = manager.get_texture(
            &device.device,
            &device.queue,
            &TextureRequest {
                label: "tfun_texture",
                width: image.row_length(),
                height: image.height(),
                depth: 1,
                dimension: wgpu::TextureDimension::D2,
                data: TexelData::Rgba8Unorm(image.color()),
            },
        )?;
        let opacity = manager.get_texture(
            &device.device,
            &device.queue,
            &TextureRequest {
                label: "ofun_texture",
                width: image.row_length(),
                height: image.height(),
                depth: 1,
                dimension: wgpu::TextureDimension::D2,
                data: TexelData::R16Float(image.opacity()),
            },
        )?;

        let mut color = color.create_view("tfun_texture");
        // The opacity lookup samples through this sampler as well.
        color.add_sampler(&device.device, SamplerOptions::linear());
        self.res.lut_views = Some(LutViews {
            color,
            opacity: opacity.create_view("ofun_texture"),
        });
        self.res.lut.mark_built();
        Ok(true)
    }

    /// Rebuilds and uploads the transform records if stale. Returns whether
    /// it did.
    pub fn update_ssbo(&mut self, device: &RenderDevice, renderer: &RendererState) -> RenderResult<bool> {
        let rebuilt = self.res.transforms.update(
            &self.volumes,
            renderer.stabilized_center(),
            self.time.mtime(),
            renderer.stabilized_time(),
        )?;
        if rebuilt || self.res.transforms.storage_buffer().buffer().is_none() {
            self.res.transforms.send(device);
        }
        Ok(rebuilt)
    }

    fn update_volume_sampler(&mut self, device: &RenderDevice) {
        let interpolation = self
            .volumes
            .first()
            .map_or(InterpolationType::default(), |v| {
                v.borrow().property().interpolation_type()
            });
        let options = match interpolation {
            InterpolationType::Nearest => SamplerOptions::nearest(),
            InterpolationType::Linear | InterpolationType::FastLinear => SamplerOptions::linear(),
        };
        if self.res.volume_sampler.as_ref().map(Sampler::options) != Some(options) {
            self.res.volume_sampler = Some(Sampler::new(&device.device, "volume_sampler", options));
        }
    }

    /// Writes the minimum sample distance and the saturation threshold into
    /// the CPU image of the mapper uniform.
    fn prepare_mapper_ubo(&mut self) -> RenderResult<()> {
        let sample_distance = self.min_sample_distance().ok_or(RenderError::NoVolumes)?;
        let changed = self
            .sample_distance
            .map_or(true, |d| (d - sample_distance).abs() > f64::EPSILON);
        if changed {
            self.sample_distance = Some(sample_distance);
            self.res.mapper_ubo.set_value("SampleDistance", sample_distance)?;
        }
        self.res.mapper_ubo.set_value(
            "OpacitySaturation",
            f64::from(self.options.opacity_saturation),
        )
    }

    /// Pushes the minimum sample distance to the mapper uniform, then
    /// refreshes volume textures, lookup tables and transform records.
    pub fn update_buffers(&mut self, device: &RenderDevice, renderer: &RendererState) -> RenderResult<()> {
        self.prepare_mapper_ubo()?;
        self.res.mapper_ubo.send_if_needed(device);

        self.res.volume_textures.update(device, &self.volumes)?;
        self.update_volume_sampler(device);
        self.update_lut_image(device)?;
        self.update_ssbo(device, renderer)?;
        Ok(())
    }
}

impl Drawable for VolumePass {
    fn build(&mut self, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        if self.volumes.is_empty() {
            return Err(RenderError::NoVolumes);
        }
        if self.res.ray_bounds.is_none() {
            return Err(RenderError::MissingRayBounds);
        }

        let renderer = ctx.renderer;
        let params = self.shader_params()?;
        self.compute_pipeline_hash()?;
        self.update_buffers(ctx.device, renderer)?;

        let declarations = self.binding_declarations(renderer);
        let resources = slots(self.volumes.len())
            .into_iter()
            .map(|slot| self.res.resource(slot, renderer))
            .collect::<RenderResult<Vec<_>>>()?;

        let hooks = |v: &mut ShaderDescription, f: &mut ShaderDescription| apply_hooks(&params, v, f);
        self.quad
            .draw(ctx, &self.pipeline_hash, &declarations, resources, &hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use volscope_core::{ImageData, Volume, VolumeMapper};

    fn volume() -> VolumeHandle {
        let image = ImageData::new([2, 2, 2], 1, vec![0.0; 8]).unwrap();
        Volume::new(VolumeMapper::new(image)).into_handle()
    }

    fn renderer() -> RendererState {
        RendererState::new(Camera::new(1.0), &VolumePassOptions::default())
    }

    #[test]
    fn test_set_volumes_marks_modified_only_on_change() {
        let (a, b) = (volume(), volume());
        let mut pass = VolumePass::default();
        let t0 = pass.mtime();

        assert!(pass.set_volumes(&[a.clone(), b.clone()]));
        let t1 = pass.mtime();
        assert!(t1 > t0);

        // Same handles, same order
        assert!(!pass.set_volumes(&[a.clone(), b.clone()]));
        assert_eq!(pass.mtime(), t1);

        // Same length, swapped order
        assert!(pass.set_volumes(&[b.clone(), a.clone()]));
        let t2 = pass.mtime();
        assert!(t2 > t1);

        // Different length
        assert!(pass.set_volumes(&[b]));
        assert!(pass.mtime() > t2);
    }

    #[test]
    fn test_hash_uses_first_volume_blend_mode() {
        let (a, b) = (volume(), volume());
        b.borrow_mut()
            .mapper_mut()
            .set_blend_mode(BlendMode::MaximumIntensity);

        let mut pass = VolumePass::default();
        pass.set_volumes(&[a.clone(), b.clone()]);
        assert_eq!(pass.compute_pipeline_hash().unwrap(), "volfsq2b0");
        assert_eq!(pass.blend_mode(), BlendMode::Composite);

        pass.set_volumes(&[b, a]);
        assert_eq!(pass.compute_pipeline_hash().unwrap(), "volfsq2b1");
        assert_eq!(pass.pipeline_hash(), "volfsq2b1");
    }

    #[test]
    fn test_empty_pass_errors() {
        let mut pass = VolumePass::default();
        assert!(matches!(pass.compute_pipeline_hash(), Err(RenderError::NoVolumes)));
        assert!(matches!(pass.shader_sources(&renderer()), Err(RenderError::NoVolumes)));
        assert_eq!(pass.min_sample_distance(), None);
    }

    #[test]
    fn test_min_sample_distance() {
        let (a, b) = (volume(), volume());
        a.borrow_mut().mapper_mut().set_sample_distance(0.75);
        b.borrow_mut().mapper_mut().set_sample_distance(0.25);
        let mut pass = VolumePass::default();
        pass.set_volumes(&[a, b]);
        assert_eq!(pass.min_sample_distance(), Some(0.25));
    }

    #[test]
    fn test_shader_sources_complete() {
        let mut pass = VolumePass::default();
        pass.set_volumes(&[volume(), volume(), volume()]);
        let sources = pass.shader_sources(&renderer()).unwrap();

        assert_eq!(sources.hash, "volfsq3b0");
        for code in [&sources.vertex, &sources.fragment] {
            assert!(!code.contains("// #"), "unfilled marker in:\n{code}");
        }
        let frag = &sources.fragment;
        assert!(frag.contains("var<uniform> renderer_ubo: renderer_ubo_struct;"));
        assert!(frag.contains("PCSCMatrix: mat4x4<f32>,"));
        assert!(frag.contains("var<uniform> mapper_ubo: mapper_ubo_struct;"));
        assert!(frag.contains("var<storage, read> volume_ssbo: volume_ssbo_array;"));
        assert!(frag.contains("tfunRow: f32,"));
        assert!(frag.contains("@binding(11) var volume_texture_2: texture_3d<f32>;"));
        assert!(!frag.contains("volume_texture_3"));
        assert!(frag.contains("@builtin(position) frag_pos: vec4<f32>"));
        assert!(sources.vertex.contains("output.position = vec4<f32>(vertex_bc, 0.0, 1.0);"));
    }

    #[test]
    fn test_shader_sources_deterministic() {
        let (a, b) = (volume(), volume());
        let mut first = VolumePass::default();
        first.set_volumes(&[a, b]);
        let mut second = VolumePass::default();
        second.set_volumes(&[volume(), volume()]);

        let r = renderer();
        let s1 = first.shader_sources(&r).unwrap();
        let s2 = second.shader_sources(&r).unwrap();
        assert_eq!(s1.hash, s2.hash);
        assert_eq!(s1.fragment, s2.fragment);
        assert_eq!(s1.vertex, s2.vertex);
    }

    #[test]
    fn test_options_propagate() {
        let mut pass = VolumePass::default();
        let t0 = pass.mtime();
        let options = VolumePassOptions {
            row_length: 64,
            opacity_saturation: 0.5,
            ..VolumePassOptions::default()
        };
        pass.set_options(options.clone()).unwrap();
        assert_eq!(pass.options(), &options);
        assert_eq!(pass.res.lut.row_length(), 64);
        assert_eq!(pass.res.mapper_ubo.get_array("OpacitySaturation"), Some(vec![0.5]));
        assert!(pass.mtime() > t0);
    }

    #[test]
    fn test_mapper_ubo_follows_volumes_and_options() {
        let (a, b) = (volume(), volume());
        a.borrow_mut().mapper_mut().set_sample_distance(0.5);
        let mut pass = VolumePass::new(VolumePassOptions {
            opacity_saturation: 0.75,
            ..VolumePassOptions::default()
        });
        assert!(matches!(pass.prepare_mapper_ubo(), Err(RenderError::NoVolumes)));

        pass.set_volumes(&[a, b]);
        pass.prepare_mapper_ubo().unwrap();
        let ubo = &pass.res.mapper_ubo;
        assert_eq!(ubo.get_array("SampleDistance"), Some(vec![0.5]));
        assert_eq!(ubo.get_array("OpacitySaturation"), Some(vec![0.75]));
        assert!(ubo.is_dirty());
    }

    #[test]
    fn test_slot_order() {
        let slots = slots(2);
        assert_eq!(slots.len(), 11);
        assert_eq!(slots[0], Slot::RendererUbo);
        assert_eq!(slots[9], Slot::VolumeTexture(0));
        assert_eq!(slots[10], Slot::VolumeTexture(1));
    }
}
