//! Full-screen quad base pass.
//!
//! Draws a single triangle covering the viewport with a fragment template
//! supplied by the owner. Pipelines are cached by the owner's pipeline hash
//! and the target format; shader assembly runs only on a cache miss.

use std::collections::HashMap;

use crate::drawable::{Drawable, FrameContext};
use crate::error::{RenderError, RenderResult};
use crate::shader::{markers, ShaderDescription, ShaderStage};

/// Vertex template shared by every full-screen pass.
pub const FSQ_VERTEX_TEMPLATE: &str = include_str!("shaders/fullscreen_quad.wgsl");

/// Fragment template used when the owner supplies none.
pub const FSQ_FRAGMENT_TEMPLATE: &str = include_str!("shaders/fullscreen_quad_fragment.wgsl");

/// A binding slot: its layout type and WGSL declaration.
#[derive(Debug, Clone)]
pub struct BindingDeclaration {
    pub ty: wgpu::BindingType,
    pub wgsl: String,
}

/// Callback that edits the vertex and fragment descriptions on a cache miss.
pub type ShaderReplacer<'a> = &'a dyn Fn(&mut ShaderDescription, &mut ShaderDescription);

struct CachedPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Full-screen triangle draw with a hash-keyed pipeline cache.
pub struct FullScreenQuad {
    label: String,
    fragment_template: String,
    pipelines: HashMap<(String, wgpu::TextureFormat), CachedPipeline>,
}

impl FullScreenQuad {
    /// Creates a quad drawing `fragment_template`.
    pub fn new(label: &str, fragment_template: &str) -> Self {
        Self {
            label: label.to_string(),
            fragment_template: fragment_template.to_string(),
            pipelines: HashMap::new(),
        }
    }

    /// Returns the fragment template.
    pub fn fragment_template(&self) -> &str {
        &self.fragment_template
    }

    /// Replaces the fragment template and drops cached pipelines.
    pub fn set_fragment_template(&mut self, template: &str) {
        if self.fragment_template != template {
            self.fragment_template = template.to_string();
            self.pipelines.clear();
        }
    }

    /// Number of cached pipelines.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether a pipeline for `hash` and `format` is cached.
    pub fn has_pipeline(&self, hash: &str, format: wgpu::TextureFormat) -> bool {
        self.pipelines.contains_key(&(hash.to_string(), format))
    }

    /// Produces the final vertex and fragment source for `hash`.
    ///
    /// Owner hooks run first; the quad then fills whatever markers are left:
    /// a default position, the binding declarations and the IO structs.
    pub fn assemble_shaders(
        &self,
        hash: &str,
        declarations: &[BindingDeclaration],
        replace: ShaderReplacer<'_>,
    ) -> (ShaderDescription, ShaderDescription) {
        let mut vertex = ShaderDescription::new(ShaderStage::Vertex, hash, FSQ_VERTEX_TEMPLATE);
        let mut fragment =
            ShaderDescription::new(ShaderStage::Fragment, hash, &self.fragment_template);

        vertex.add_builtin_input("vertex_index", "vertex_index", "u32");
        vertex.add_output("tcoord_vs", "vec2<f32>");
        fragment.add_input("tcoord_vs", "vec2<f32>");
        fragment.add_output("color", "vec4<f32>");

        replace(&mut vertex, &mut fragment);

        let default_position = [
            "    output.tcoord_vs = vertex_bc * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5, 0.5);"
                .to_string(),
            "    output.position = vec4<f32>(vertex_bc, 0.0, 1.0);".to_string(),
        ];
        if vertex.substitute(markers::POSITION_IMPL, &default_position, false) {
            vertex.add_builtin_output("position", "position", "vec4<f32>");
        }

        let decls: Vec<String> = declarations.iter().map(|d| d.wgsl.clone()).collect();
        vertex.substitute(markers::BINDINGS_DEC, &[], false);
        fragment.substitute(markers::BINDINGS_DEC, &decls, false);
        vertex.replace_io_structs();
        fragment.replace_io_structs();

        (vertex, fragment)
    }

    fn create_pipeline(
        &self,
        device: &wgpu::Device,
        hash: &str,
        format: wgpu::TextureFormat,
        declarations: &[BindingDeclaration],
        replace: ShaderReplacer<'_>,
    ) -> CachedPipeline {
        let (vertex, fragment) = self.assemble_shaders(hash, declarations, replace);
        let vertex_module = vertex.create_module(device);
        let fragment_module = fragment.create_module(device);

        let entries: Vec<wgpu::BindGroupLayoutEntry> = declarations
            .iter()
            .enumerate()
            .map(|(i, d)| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: d.ty,
                count: None,
            })
            .collect();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} bind group layout", self.label)),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} pipeline layout", self.label)),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(hash),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        log::debug!("created pipeline '{hash}' for {format:?}");
        CachedPipeline {
            pipeline,
            bind_group_layout,
        }
    }

    /// Records the full-screen draw, compositing onto the frame target.
    ///
    /// `resources[i]` is bound at `@binding(i)` and must match
    /// `declarations[i]`.
    pub fn draw(
        &mut self,
        ctx: &mut FrameContext<'_>,
        hash: &str,
        declarations: &[BindingDeclaration],
        resources: Vec<wgpu::BindingResource<'_>>,
        replace: ShaderReplacer<'_>,
    ) -> RenderResult<()> {
        if declarations.len() != resources.len() {
            return Err(RenderError::PipelineCreationFailed(format!(
                "'{hash}': {} declarations but {} resources",
                declarations.len(),
                resources.len()
            )));
        }

        let key = (hash.to_string(), ctx.target_format);
        if !self.pipelines.contains_key(&key) {
            let cached = self.create_pipeline(
                &ctx.device.device,
                hash,
                ctx.target_format,
                declarations,
                replace,
            );
            self.pipelines.insert(key.clone(), cached);
        }
        let cached = self
            .pipelines
            .get(&key)
            .ok_or_else(|| RenderError::PipelineCreationFailed(hash.to_string()))?;

        let entries: Vec<wgpu::BindGroupEntry> = resources
            .into_iter()
            .enumerate()
            .map(|(i, resource)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource,
            })
            .collect();
        let bind_group = ctx
            .device
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} bind group", self.label)),
                layout: &cached.bind_group_layout,
                entries: &entries,
            });

        let mut render_pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: ctx.target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });
        render_pass.set_pipeline(&cached.pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);
        Ok(())
    }
}

impl Drawable for FullScreenQuad {
    /// Draws the fragment template as is, without bindings.
    fn build(&mut self, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        let hash = format!("{}-fsq", self.label);
        self.draw(ctx, &hash, &[], Vec::new(), &|_, _| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_assembly_fills_every_marker() {
        let quad = FullScreenQuad::new("plain", FSQ_FRAGMENT_TEMPLATE);
        let (vertex, fragment) = quad.assemble_shaders("plain-fsq", &[], &|_, _| {});
        for code in [vertex.code(), fragment.code()] {
            assert!(!code.contains("// #"), "unfilled marker in:\n{code}");
        }
        assert!(vertex.code().contains("@builtin(vertex_index) vertex_index: u32"));
        assert!(vertex.code().contains("@builtin(position) position: vec4<f32>"));
        assert!(vertex.code().contains("@location(0) tcoord_vs: vec2<f32>"));
        assert!(fragment.code().contains("@location(0) tcoord_vs: vec2<f32>"));
        assert!(fragment.code().contains("@location(0) color: vec4<f32>"));
    }

    #[test]
    fn test_owner_hook_runs_before_defaults() {
        let quad = FullScreenQuad::new("custom", FSQ_FRAGMENT_TEMPLATE);
        let (vertex, _) = quad.assemble_shaders("h", &[], &|v: &mut ShaderDescription, _: &mut ShaderDescription| {
            v.add_builtin_output("position", "position", "vec4<f32>");
            v.substitute(
                markers::POSITION_IMPL,
                &["    output.position = vec4<f32>(0.0);".to_string()],
                false,
            );
        });
        assert!(vertex.code().contains("output.position = vec4<f32>(0.0);"));
        assert!(!vertex.code().contains("output.tcoord_vs ="));
        assert_eq!(vertex.code().matches("@builtin(position)").count(), 1);
    }

    #[test]
    fn test_declarations_substituted_in_order() {
        let quad = FullScreenQuad::new("decl", FSQ_FRAGMENT_TEMPLATE);
        let decls = vec![
            BindingDeclaration {
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                wgsl: "@group(0) @binding(0) var a: sampler;".into(),
            },
            BindingDeclaration {
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                wgsl: "@group(0) @binding(1) var b: sampler;".into(),
            },
        ];
        let (vertex, fragment) = quad.assemble_shaders("h", &decls, &|_, _| {});
        let code = fragment.code();
        let a = code.find("var a: sampler").unwrap();
        let b = code.find("var b: sampler").unwrap();
        assert!(a < b);
        assert!(!vertex.code().contains("var a"));
    }

    #[test]
    fn test_set_template_clears_cache_only_on_change() {
        let mut quad = FullScreenQuad::new("t", FSQ_FRAGMENT_TEMPLATE);
        quad.set_fragment_template(FSQ_FRAGMENT_TEMPLATE);
        assert_eq!(quad.fragment_template(), FSQ_FRAGMENT_TEMPLATE);
        assert_eq!(quad.pipeline_count(), 0);
        assert!(!quad.has_pipeline("t-fsq", wgpu::TextureFormat::Rgba8Unorm));
    }
}
