//! Rendering backend for volscope-rs.
//!
//! This crate provides the wgpu side of the volume pass, including:
//! - GPU resource management (structured buffers, textures, samplers)
//! - Shader templates and marker substitution (WGSL)
//! - Transfer-function lookup tables and per-volume transform records
//! - Camera and stabilized-center renderer state
//! - The full-screen quad base pass and the multi-volume [`VolumePass`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Texture sizes, binding indices and table lengths cross between usize/u32/f32
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod buffer;
pub mod camera;
pub mod device;
pub mod drawable;
pub mod error;
pub mod fullscreen_quad;
pub mod lookup_table;
pub mod renderer;
pub mod shader;
pub mod texture;
pub mod volume_pass;
pub mod volume_shader;
pub mod volume_texture;
pub mod volume_transform;

pub use buffer::{BufferLayout, EntryType, StorageBuffer, UniformBuffer};
pub use camera::{Camera, ProjectionMode};
pub use device::RenderDevice;
pub use drawable::{Drawable, FrameContext};
pub use error::{RenderError, RenderResult};
pub use fullscreen_quad::{BindingDeclaration, FullScreenQuad};
pub use lookup_table::{opacity_correction, LookupTableBuilder, LookupTableImage};
pub use renderer::RendererState;
pub use shader::{substitute, ShaderDescription, ShaderStage, Substitution};
pub use texture::{TexelData, Texture, TextureManager, TextureRequest, TextureView};
pub use volume_pass::{RayBounds, ShaderSources, VolumePass};
pub use volume_shader::{pipeline_hash, ShaderHook, VolumeShaderParams};
pub use volume_texture::VolumeInfo;
pub use volume_transform::{sctc_matrix, VolumeRecord, VolumeTransformBuffer};
