//! Shader templates and marker substitution.
//!
//! A template is WGSL source containing marker comments such as
//! `// #volume_calls`. Passes copy the template into a [`ShaderDescription`],
//! replace markers with generated statement lists, and compile the result.

use std::fmt::Write as _;

/// Result of [`substitute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub result: String,
    pub replaced: bool,
}

/// Replaces `marker` in `source` with `lines` joined by newlines.
///
/// Only the first occurrence is replaced unless `all` is set.
pub fn substitute(source: &str, marker: &str, lines: &[String], all: bool) -> Substitution {
    if marker.is_empty() || !source.contains(marker) {
        return Substitution {
            result: source.to_string(),
            replaced: false,
        };
    }
    let replacement = lines.join("\n");
    let result = if all {
        source.replace(marker, &replacement)
    } else {
        source.replacen(marker, &replacement, 1)
    };
    Substitution {
        result,
        replaced: true,
    }
}

/// Marker comments recognized in templates.
pub mod markers {
    pub const IO_STRUCTS_DEC: &str = "// #io_structs_dec";
    pub const BINDINGS_DEC: &str = "// #bindings_dec";
    pub const POSITION_IMPL: &str = "// #position_impl";
    pub const VOLUME_CALLS: &str = "// #volume_calls";
    pub const VOLUME_LOOP: &str = "// #volume_loop";
}

/// Pipeline stage a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn prefix(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// A struct member of a stage's input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IoField {
    /// `Some("position")` for `@builtin(position)`, `None` for a location.
    builtin: Option<String>,
    name: String,
    ty: String,
}

/// Mutable working copy of a shader template plus its stage interface.
#[derive(Debug, Clone)]
pub struct ShaderDescription {
    stage: ShaderStage,
    hash: String,
    code: String,
    inputs: Vec<IoField>,
    outputs: Vec<IoField>,
}

impl ShaderDescription {
    /// Copies `template` into a new description.
    pub fn new(stage: ShaderStage, hash: &str, template: &str) -> Self {
        Self {
            stage,
            hash: hash.to_string(),
            code: template.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Returns the stage.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Returns the pipeline hash this description was created for.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Returns the current source.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Replaces the current source.
    pub fn set_code(&mut self, code: String) {
        self.code = code;
    }

    /// Substitutes a marker in this description's source.
    pub fn substitute(&mut self, marker: &str, lines: &[String], all: bool) -> bool {
        let sub = substitute(&self.code, marker, lines, all);
        self.code = sub.result;
        sub.replaced
    }

    fn push_unique(fields: &mut Vec<IoField>, field: IoField) {
        if !fields.iter().any(|f| f.name == field.name) {
            fields.push(field);
        }
    }

    /// Adds a `@builtin(..)` input.
    pub fn add_builtin_input(&mut self, builtin: &str, name: &str, ty: &str) {
        Self::push_unique(
            &mut self.inputs,
            IoField {
                builtin: Some(builtin.to_string()),
                name: name.to_string(),
                ty: ty.to_string(),
            },
        );
    }

    /// Adds a `@builtin(..)` output.
    pub fn add_builtin_output(&mut self, builtin: &str, name: &str, ty: &str) {
        Self::push_unique(
            &mut self.outputs,
            IoField {
                builtin: Some(builtin.to_string()),
                name: name.to_string(),
                ty: ty.to_string(),
            },
        );
    }

    /// Adds a location input; locations are assigned in insertion order.
    pub fn add_input(&mut self, name: &str, ty: &str) {
        Self::push_unique(
            &mut self.inputs,
            IoField {
                builtin: None,
                name: name.to_string(),
                ty: ty.to_string(),
            },
        );
    }

    /// Adds a location output; locations are assigned in insertion order.
    pub fn add_output(&mut self, name: &str, ty: &str) {
        Self::push_unique(
            &mut self.outputs,
            IoField {
                builtin: None,
                name: name.to_string(),
                ty: ty.to_string(),
            },
        );
    }

    fn io_struct(name: &str, fields: &[IoField]) -> String {
        let mut out = format!("struct {name} {{\n");
        let mut location = 0;
        for f in fields {
            match &f.builtin {
                Some(builtin) => {
                    let _ = writeln!(out, "  @builtin({builtin}) {}: {},", f.name, f.ty);
                }
                None => {
                    let _ = writeln!(out, "  @location({location}) {}: {},", f.name, f.ty);
                    location += 1;
                }
            }
        }
        out.push('}');
        out
    }

    /// Generates `{stage}_input` and `{stage}_output` struct declarations.
    pub fn io_declarations(&self) -> Vec<String> {
        let prefix = self.stage.prefix();
        vec![
            Self::io_struct(&format!("{prefix}_input"), &self.inputs),
            Self::io_struct(&format!("{prefix}_output"), &self.outputs),
        ]
    }

    /// Substitutes the generated IO structs into the source.
    pub fn replace_io_structs(&mut self) -> bool {
        let decls = self.io_declarations();
        self.substitute(markers::IO_STRUCTS_DEC, &decls, false)
    }

    /// Compiles the current source.
    pub fn create_module(&self, device: &wgpu::Device) -> wgpu::ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.hash),
            source: wgpu::ShaderSource::Wgsl(self.code.as_str().into()),
        })
    }
}
