//! GPU buffer management.
//!
//! [`StorageBuffer`] and [`UniformBuffer`] hold a CPU-side byte image laid
//! out by a [`BufferLayout`] of named entries. The layout also emits the WGSL
//! struct and binding declaration, so a shader substituted with that
//! declaration always agrees with the bytes that are uploaded.

use std::fmt::Write as _;

use volscope_core::TimeStamp;
use wgpu::util::DeviceExt;

use crate::device::RenderDevice;
use crate::error::{RenderError, RenderResult};

/// Creates a buffer with the given usage from raw bytes.
pub fn create_buffer(
    device: &wgpu::Device,
    contents: &[u8],
    usage: wgpu::BufferUsages,
    label: Option<&str>,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label,
        contents,
        usage: usage | wgpu::BufferUsages::COPY_DST,
    })
}

/// Updates a buffer with new data.
pub fn update_buffer<T: bytemuck::Pod>(queue: &wgpu::Queue, buffer: &wgpu::Buffer, data: &[T]) {
    queue.write_buffer(buffer, 0, bytemuck::cast_slice(data));
}

/// Scalar, vector and matrix types a buffer entry can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    F32,
    U32,
    I32,
    Vec2F32,
    Vec4F32,
    Mat4x4F32,
}

impl EntryType {
    /// Number of 32-bit scalars.
    pub fn components(self) -> usize {
        match self {
            EntryType::F32 | EntryType::U32 | EntryType::I32 => 1,
            EntryType::Vec2F32 => 2,
            EntryType::Vec4F32 => 4,
            EntryType::Mat4x4F32 => 16,
        }
    }

    /// Size in bytes.
    pub fn size(self) -> usize {
        self.components() * 4
    }

    /// Alignment in bytes (identical under std140 and std430 for these types).
    pub fn align(self) -> usize {
        match self {
            EntryType::F32 | EntryType::U32 | EntryType::I32 => 4,
            EntryType::Vec2F32 => 8,
            EntryType::Vec4F32 | EntryType::Mat4x4F32 => 16,
        }
    }

    /// WGSL spelling.
    pub fn wgsl(self) -> &'static str {
        match self {
            EntryType::F32 => "f32",
            EntryType::U32 => "u32",
            EntryType::I32 => "i32",
            EntryType::Vec2F32 => "vec2<f32>",
            EntryType::Vec4F32 => "vec4<f32>",
            EntryType::Mat4x4F32 => "mat4x4<f32>",
        }
    }

    fn encode(self, value: f64) -> [u8; 4] {
        match self {
            EntryType::U32 => (value as u32).to_le_bytes(),
            EntryType::I32 => (value as i32).to_le_bytes(),
            _ => (value as f32).to_le_bytes(),
        }
    }
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// A named field inside a buffer record.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferEntry {
    pub name: String,
    pub ty: EntryType,
    pub offset: usize,
}

/// An ordered list of named entries packed with WGSL host-shareable rules.
#[derive(Debug, Clone, Default)]
pub struct BufferLayout {
    entries: Vec<BufferEntry>,
}

impl BufferLayout {
    /// Appends an entry; adding an existing name is a no-op.
    pub fn add_entry(&mut self, name: &str, ty: EntryType) {
        if self.entry(name).is_some() {
            return;
        }
        let end = self.entries.last().map_or(0, |e| e.offset + e.ty.size());
        self.entries.push(BufferEntry {
            name: name.to_string(),
            ty,
            offset: round_up(end, ty.align()),
        });
    }

    /// Looks up an entry by name.
    pub fn entry(&self, name: &str) -> Option<&BufferEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Returns all entries in declaration order.
    pub fn entries(&self) -> &[BufferEntry] {
        &self.entries
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Largest member alignment.
    pub fn align(&self) -> usize {
        self.entries.iter().map(|e| e.ty.align()).max().unwrap_or(4)
    }

    /// Size of one record, rounded up to its alignment (the array stride).
    pub fn stride(&self) -> usize {
        let end = self.entries.last().map_or(0, |e| e.offset + e.ty.size());
        round_up(end.max(4), self.align())
    }

    /// Emits `struct {name} { ... }`.
    pub fn wgsl_struct(&self, name: &str) -> String {
        let mut out = format!("struct {name} {{\n");
        for e in &self.entries {
            let _ = writeln!(out, "  {}: {},", e.name, e.ty.wgsl());
        }
        out.push('}');
        out
    }

    fn unknown(name: &str) -> RenderError {
        RenderError::BufferCreationFailed(format!("unknown buffer entry '{name}'"))
    }
}

/// A storage buffer holding an array of records, one per instance.
pub struct StorageBuffer {
    label: String,
    layout: BufferLayout,
    number_of_instances: usize,
    data: Vec<u8>,
    buffer: Option<wgpu::Buffer>,
    send_time: TimeStamp,
}

impl StorageBuffer {
    /// Creates an empty buffer. `label` is also the WGSL variable name.
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            layout: BufferLayout::default(),
            number_of_instances: 0,
            data: Vec::new(),
            buffer: None,
            send_time: TimeStamp::new(),
        }
    }

    /// Returns the WGSL variable name.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Drops all entries and data. The GPU buffer is kept until the next send.
    pub fn clear_data(&mut self) {
        self.layout.clear();
        self.number_of_instances = 0;
        self.data.clear();
    }

    /// Sets the number of records.
    pub fn set_number_of_instances(&mut self, count: usize) {
        self.number_of_instances = count;
        self.resize();
    }

    /// Returns the number of records.
    pub fn number_of_instances(&self) -> usize {
        self.number_of_instances
    }

    /// Appends a field to the record layout.
    pub fn add_entry(&mut self, name: &str, ty: EntryType) {
        self.layout.add_entry(name, ty);
        self.resize();
    }

    /// Returns the record layout.
    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    fn resize(&mut self) {
        self.data
            .resize(self.layout.stride() * self.number_of_instances, 0);
    }

    /// Fills one field of every record from a flat array of
    /// `number_of_instances * components` values. Matrices are column-major.
    pub fn set_all_instances_from_array(&mut self, name: &str, values: &[f64]) -> RenderResult<()> {
        let entry = self
            .layout
            .entry(name)
            .ok_or_else(|| BufferLayout::unknown(name))?
            .clone();
        let n = entry.ty.components();
        if values.len() != n * self.number_of_instances {
            return Err(RenderError::BufferCreationFailed(format!(
                "entry '{name}' expects {} values, got {}",
                n * self.number_of_instances,
                values.len()
            )));
        }

        let stride = self.layout.stride();
        for (instance, chunk) in values.chunks_exact(n).enumerate() {
            let base = instance * stride + entry.offset;
            for (k, &v) in chunk.iter().enumerate() {
                let at = base + k * 4;
                self.data[at..at + 4].copy_from_slice(&entry.ty.encode(v));
            }
        }
        Ok(())
    }

    /// Returns the packed CPU image.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Tick of the last upload, 0 if never sent.
    pub fn send_time(&self) -> u64 {
        self.send_time.mtime()
    }

    /// Uploads the CPU image, reallocating the GPU buffer if its size changed.
    pub fn send(&mut self, device: &RenderDevice) {
        // Zero-sized bindings are invalid; keep at least one record.
        let size = self.data.len().max(self.layout.stride());
        let mut bytes = self.data.clone();
        bytes.resize(size, 0);

        match &self.buffer {
            Some(buffer) if buffer.size() == size as u64 => {
                update_buffer(&device.queue, buffer, &bytes);
            }
            _ => {
                self.buffer = Some(create_buffer(
                    &device.device,
                    &bytes,
                    wgpu::BufferUsages::STORAGE,
                    Some(&self.label),
                ));
            }
        }
        self.send_time.modified();
        log::debug!("sent storage buffer '{}' ({size} bytes)", self.label);
    }

    /// Returns the GPU buffer, if sent.
    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    /// WGSL declaration of the record struct, array wrapper and binding.
    pub fn shader_declaration(&self, group: u32, binding: u32) -> String {
        let record = format!("{}_struct", self.label);
        format!(
            "{}\nstruct {label}_array {{\n  values: array<{record}>,\n}}\n\
             @group({group}) @binding({binding}) var<storage, read> {label}: {label}_array;",
            self.layout.wgsl_struct(&record),
            label = self.label,
        )
    }

    /// Bind group layout entry type.
    pub fn binding_type(&self) -> wgpu::BindingType {
        wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        }
    }
}

/// A uniform buffer holding a single record.
pub struct UniformBuffer {
    label: String,
    layout: BufferLayout,
    data: Vec<u8>,
    buffer: Option<wgpu::Buffer>,
    dirty: bool,
    send_time: TimeStamp,
}

impl UniformBuffer {
    /// Creates an empty buffer. `label` is also the WGSL variable name.
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            layout: BufferLayout::default(),
            data: Vec::new(),
            buffer: None,
            dirty: true,
            send_time: TimeStamp::new(),
        }
    }

    /// Returns the WGSL variable name.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Appends a field to the record layout.
    pub fn add_entry(&mut self, name: &str, ty: EntryType) {
        self.layout.add_entry(name, ty);
        // Uniform structs are sized in 16-byte units.
        self.data.resize(round_up(self.layout.stride(), 16), 0);
        self.dirty = true;
    }

    /// Returns the record layout.
    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    /// Sets a scalar field.
    pub fn set_value(&mut self, name: &str, value: f64) -> RenderResult<()> {
        self.set_array(name, &[value])
    }

    /// Sets a vector or matrix field (column-major).
    pub fn set_array(&mut self, name: &str, values: &[f64]) -> RenderResult<()> {
        let entry = self
            .layout
            .entry(name)
            .ok_or_else(|| BufferLayout::unknown(name))?;
        if values.len() != entry.ty.components() {
            return Err(RenderError::BufferCreationFailed(format!(
                "entry '{name}' expects {} values, got {}",
                entry.ty.components(),
                values.len()
            )));
        }
        let (ty, offset) = (entry.ty, entry.offset);
        for (k, &v) in values.iter().enumerate() {
            let at = offset + k * 4;
            let bytes = ty.encode(v);
            if self.data[at..at + 4] != bytes {
                self.data[at..at + 4].copy_from_slice(&bytes);
                self.dirty = true;
            }
        }
        Ok(())
    }

    /// Reads back a field as f32 values.
    pub fn get_array(&self, name: &str) -> Option<Vec<f32>> {
        let entry = self.layout.entry(name)?;
        Some(
            (0..entry.ty.components())
                .map(|k| {
                    let at = entry.offset + k * 4;
                    let bytes = [
                        self.data[at],
                        self.data[at + 1],
                        self.data[at + 2],
                        self.data[at + 3],
                    ];
                    f32::from_le_bytes(bytes)
                })
                .collect(),
        )
    }

    /// Returns whether the CPU image changed since the last upload.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Tick of the last upload, 0 if never sent.
    pub fn send_time(&self) -> u64 {
        self.send_time.mtime()
    }

    /// Uploads when the CPU image changed or the GPU buffer does not exist.
    pub fn send_if_needed(&mut self, device: &RenderDevice) {
        if !self.dirty && self.buffer.is_some() {
            return;
        }
        match &self.buffer {
            Some(buffer) if buffer.size() == self.data.len() as u64 => {
                update_buffer(&device.queue, buffer, &self.data);
            }
            _ => {
                self.buffer = Some(create_buffer(
                    &device.device,
                    &self.data,
                    wgpu::BufferUsages::UNIFORM,
                    Some(&self.label),
                ));
            }
        }
        self.dirty = false;
        self.send_time.modified();
    }

    /// Returns the GPU buffer, if sent.
    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    /// WGSL declaration of the struct and binding.
    pub fn shader_declaration(&self, group: u32, binding: u32) -> String {
        let record = format!("{}_struct", self.label);
        format!(
            "{}\n@group({group}) @binding({binding}) var<uniform> {label}: {record};",
            self.layout.wgsl_struct(&record),
            label = self.label,
        )
    }

    /// Bind group layout entry type.
    pub fn binding_type(&self) -> wgpu::BindingType {
        wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        }
    }
}
