//! Shader specialization for the volume pass.
//!
//! The fragment template is specialized by the number of volumes (unrolled
//! per-volume calls and texture bindings) and by the blend mode (which loop
//! is injected). Both are captured in the pipeline hash, so equal hashes
//! always produce identical shader source.

use volscope_core::BlendMode;

use crate::shader::{markers, ShaderDescription};

/// Fragment template of the volume pass.
pub const VOLUME_FRAGMENT_TEMPLATE: &str = include_str!("shaders/volume_pass.wgsl");

/// Pipeline hash for a volume count and blend mode.
pub fn pipeline_hash(volume_count: usize, blend_mode: BlendMode) -> String {
    format!("volfsq{volume_count}b{}", blend_mode.code())
}

/// Everything shader specialization depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeShaderParams {
    pub volume_count: usize,
    pub blend_mode: BlendMode,
}

impl VolumeShaderParams {
    /// Pipeline hash of these parameters.
    pub fn hash(&self) -> String {
        pipeline_hash(self.volume_count, self.blend_mode)
    }
}

/// Unrolled per-volume sampling and front-to-back accumulation.
pub fn volume_calls(volume_count: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(volume_count * 2);
    for i in 0..volume_count {
        lines.push(format!(
            "        sample_color = process_volume({i}, volume_texture_{i}, ray_pos_sc, tfun_rows);"
        ));
        lines.push(
            "        computed_color = vec4<f32>(\
             sample_color.a * sample_color.rgb * (1.0 - computed_color.a) + computed_color.rgb, \
             (1.0 - computed_color.a) * sample_color.a + computed_color.a);"
                .to_string(),
        );
    }
    lines
}

/// Loop body for a blend mode. Only compositing is implemented; other modes
/// produce a transparent result.
pub fn volume_loop(blend_mode: BlendMode) -> Vec<String> {
    match blend_mode {
        BlendMode::Composite => vec![
            "    var computed_color: vec4<f32> = composite(ray_length_sc, min_pos_sc, ray_step_sc);"
                .to_string(),
        ],
        other => {
            log::warn!("blend mode {other:?} is not supported by the volume pass; drawing nothing");
            vec!["    var computed_color: vec4<f32> = vec4<f32>(0.0, 0.0, 0.0, 0.0);".to_string()]
        }
    }
}

/// Named points at which the volume pass edits its shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderHook {
    Position,
    Volume,
}

type HookFn = fn(&VolumeShaderParams, &mut ShaderDescription, &mut ShaderDescription);

/// Hooks in application order.
pub const SHADER_HOOKS: [(ShaderHook, HookFn); 2] = [
    (ShaderHook::Position, replace_shader_position),
    (ShaderHook::Volume, replace_shader_volume),
];

/// Writes the full-screen-triangle position and texture coordinate, and
/// exposes the fragment position to the fragment stage.
pub fn replace_shader_position(
    _params: &VolumeShaderParams,
    vertex: &mut ShaderDescription,
    fragment: &mut ShaderDescription,
) {
    vertex.add_builtin_output("position", "position", "vec4<f32>");
    vertex.substitute(
        markers::POSITION_IMPL,
        &[
            "    output.tcoord_vs = vertex_bc * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5, 0.5);"
                .to_string(),
            "    output.position = vec4<f32>(vertex_bc, 0.0, 1.0);".to_string(),
        ],
        false,
    );
    fragment.add_builtin_input("position", "frag_pos", "vec4<f32>");
}

/// Injects the per-volume calls and the blend-mode loop.
pub fn replace_shader_volume(
    params: &VolumeShaderParams,
    _vertex: &mut ShaderDescription,
    fragment: &mut ShaderDescription,
) {
    fragment.substitute(markers::VOLUME_CALLS, &volume_calls(params.volume_count), false);
    fragment.substitute(markers::VOLUME_LOOP, &volume_loop(params.blend_mode), false);
}

/// Runs every hook in order.
pub fn apply_hooks(
    params: &VolumeShaderParams,
    vertex: &mut ShaderDescription,
    fragment: &mut ShaderDescription,
) {
    for (hook, apply) in SHADER_HOOKS {
        log::trace!("applying {hook:?} hook for {}", params.hash());
        apply(params, vertex, fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderStage;
    use proptest::prelude::*;

    fn blend_mode() -> impl Strategy<Value = BlendMode> {
        (0_u32..6).prop_map(BlendMode::from_code)
    }

    fn fragment_for(params: &VolumeShaderParams) -> String {
        let mut vertex = ShaderDescription::new(ShaderStage::Vertex, &params.hash(), "// #position_impl");
        let mut fragment =
            ShaderDescription::new(ShaderStage::Fragment, &params.hash(), VOLUME_FRAGMENT_TEMPLATE);
        apply_hooks(params, &mut vertex, &mut fragment);
        fragment.code().to_string()
    }

    #[test]
    fn test_hash_format() {
        assert_eq!(pipeline_hash(2, BlendMode::Composite), "volfsq2b0");
        assert_eq!(pipeline_hash(1, BlendMode::MaximumIntensity), "volfsq1b1");
        assert_eq!(pipeline_hash(12, BlendMode::RadonTransform), "volfsq12b5");
    }

    #[test]
    fn test_volume_calls_unrolled() {
        let calls = volume_calls(3);
        assert_eq!(calls.len(), 6);
        assert!(calls[0].contains("process_volume(0, volume_texture_0,"));
        assert!(calls[4].contains("process_volume(2, volume_texture_2,"));
    }

    #[test]
    fn test_composite_loop_selected() {
        let code = fragment_for(&VolumeShaderParams {
            volume_count: 2,
            blend_mode: BlendMode::Composite,
        });
        assert!(code.contains("= composite(ray_length_sc, min_pos_sc, ray_step_sc);"));
        assert!(code.contains("process_volume(1, volume_texture_1,"));
        assert!(!code.contains(markers::VOLUME_CALLS));
        assert!(!code.contains(markers::VOLUME_LOOP));
    }

    #[test]
    fn test_other_blend_modes_are_transparent() {
        let code = fragment_for(&VolumeShaderParams {
            volume_count: 1,
            blend_mode: BlendMode::MaximumIntensity,
        });
        assert!(code.contains("var computed_color: vec4<f32> = vec4<f32>(0.0, 0.0, 0.0, 0.0);"));
        assert!(!code.contains("= composite("));
    }

    #[test]
    fn test_position_hook() {
        let params = VolumeShaderParams {
            volume_count: 1,
            blend_mode: BlendMode::Composite,
        };
        let mut vertex = ShaderDescription::new(ShaderStage::Vertex, "h", "// #io_structs_dec\n// #position_impl");
        let mut fragment = ShaderDescription::new(ShaderStage::Fragment, "h", "// #io_structs_dec");
        replace_shader_position(&params, &mut vertex, &mut fragment);
        vertex.replace_io_structs();
        fragment.replace_io_structs();
        assert!(vertex.code().contains("@builtin(position) position: vec4<f32>"));
        assert!(vertex.code().contains("output.position = vec4<f32>(vertex_bc, 0.0, 1.0);"));
        assert!(fragment.code().contains("@builtin(position) frag_pos: vec4<f32>"));
    }

    #[test]
    fn test_template_untouched() {
        let before = VOLUME_FRAGMENT_TEMPLATE.to_string();
        let _ = fragment_for(&VolumeShaderParams {
            volume_count: 4,
            blend_mode: BlendMode::Composite,
        });
        assert_eq!(VOLUME_FRAGMENT_TEMPLATE, before);
        assert!(VOLUME_FRAGMENT_TEMPLATE.contains(markers::VOLUME_CALLS));
    }

    proptest! {
        #[test]
        fn prop_equal_params_give_equal_source(count in 1_usize..8, mode in blend_mode()) {
            let params = VolumeShaderParams { volume_count: count, blend_mode: mode };
            prop_assert_eq!(params.hash(), pipeline_hash(count, mode));
            prop_assert_eq!(fragment_for(&params), fragment_for(&params));
        }

        #[test]
        fn prop_distinct_params_give_distinct_hashes(
            a in 1_usize..8, ma in blend_mode(), b in 1_usize..8, mb in blend_mode()
        ) {
            let same = a == b && ma == mb;
            prop_assert_eq!(pipeline_hash(a, ma) == pipeline_hash(b, mb), same);
        }
    }
}
