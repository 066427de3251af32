//! Renderable volumes.

use std::cell::RefCell;
use std::rc::Rc;

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::image_data::ImageData;
use crate::time_stamp::TimeStamp;
use crate::volume_property::VolumeProperty;

/// How samples along a ray are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BlendMode {
    /// Front-to-back alpha compositing.
    #[default]
    Composite,
    /// Maximum intensity projection.
    MaximumIntensity,
    /// Minimum intensity projection.
    MinimumIntensity,
    /// Average intensity projection.
    AverageIntensity,
    /// Additive intensity.
    Additive,
    /// Radon transform.
    RadonTransform,
}

impl BlendMode {
    /// Returns the stable integer code used in pipeline hashes.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            BlendMode::Composite => 0,
            BlendMode::MaximumIntensity => 1,
            BlendMode::MinimumIntensity => 2,
            BlendMode::AverageIntensity => 3,
            BlendMode::Additive => 4,
            BlendMode::RadonTransform => 5,
        }
    }

    /// Converts from the integer code. Unknown codes map to `Composite`.
    #[must_use]
    #[allow(clippy::match_same_arms)] // 0 and _ both map to Composite (default) intentionally
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => BlendMode::Composite,
            1 => BlendMode::MaximumIntensity,
            2 => BlendMode::MinimumIntensity,
            3 => BlendMode::AverageIntensity,
            4 => BlendMode::Additive,
            5 => BlendMode::RadonTransform,
            _ => BlendMode::Composite,
        }
    }
}

/// Maps image data into a volume rendering: input, sample distance and blending.
#[derive(Debug, Clone)]
pub struct VolumeMapper {
    input: ImageData,
    sample_distance: f64,
    blend_mode: BlendMode,
    time: TimeStamp,
}

impl VolumeMapper {
    /// Creates a mapper for the given input with unit sample distance.
    pub fn new(input: ImageData) -> Self {
        Self {
            input,
            sample_distance: 1.0,
            blend_mode: BlendMode::Composite,
            time: TimeStamp::now(),
        }
    }

    /// Returns the input image.
    pub fn input(&self) -> &ImageData {
        &self.input
    }

    /// Returns the input image for editing. Edits move the image's own mtime.
    pub fn input_mut(&mut self) -> &mut ImageData {
        &mut self.input
    }

    /// Replaces the input image.
    pub fn set_input(&mut self, input: ImageData) {
        self.input = input;
        self.time.modified();
    }

    /// Returns the ray step length in world units.
    pub fn sample_distance(&self) -> f64 {
        self.sample_distance
    }

    /// Sets the ray step length in world units.
    pub fn set_sample_distance(&mut self, distance: f64) {
        if (self.sample_distance - distance).abs() > f64::EPSILON {
            self.sample_distance = distance;
            self.time.modified();
        }
    }

    /// Returns the blend mode.
    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Sets the blend mode.
    pub fn set_blend_mode(&mut self, blend_mode: BlendMode) {
        if self.blend_mode != blend_mode {
            self.blend_mode = blend_mode;
            self.time.modified();
        }
    }

    /// Returns the modification time (excluding the input image).
    pub fn mtime(&self) -> u64 {
        self.time.mtime()
    }
}

/// A volume: a mapper, a rendering property and a model-to-world transform.
#[derive(Debug, Clone)]
pub struct Volume {
    matrix: DMat4,
    mapper: VolumeMapper,
    property: VolumeProperty,
    time: TimeStamp,
}

/// Shared handle to a volume. Identity (not contents) is what the volume pass
/// compares when its volume list is replaced.
pub type VolumeHandle = Rc<RefCell<Volume>>;

impl Volume {
    /// Creates a volume with an identity transform and a default property.
    pub fn new(mapper: VolumeMapper) -> Self {
        Self::with_property(mapper, VolumeProperty::new())
    }

    /// Creates a volume with an identity transform and the given property.
    pub fn with_property(mapper: VolumeMapper, property: VolumeProperty) -> Self {
        Self {
            matrix: DMat4::IDENTITY,
            mapper,
            property,
            time: TimeStamp::now(),
        }
    }

    /// Wraps the volume in a shared handle.
    pub fn into_handle(self) -> VolumeHandle {
        Rc::new(RefCell::new(self))
    }

    /// Returns the model-to-world matrix.
    pub fn matrix(&self) -> DMat4 {
        self.matrix
    }

    /// Sets the model-to-world matrix.
    pub fn set_matrix(&mut self, matrix: DMat4) {
        if self.matrix != matrix {
            self.matrix = matrix;
            self.time.modified();
        }
    }

    /// Sets the model-to-world matrix to a pure translation.
    pub fn set_position(&mut self, position: DVec3) {
        self.set_matrix(DMat4::from_translation(position));
    }

    /// Returns the mapper.
    pub fn mapper(&self) -> &VolumeMapper {
        &self.mapper
    }

    /// Returns the mapper for editing.
    pub fn mapper_mut(&mut self) -> &mut VolumeMapper {
        &mut self.mapper
    }

    /// Returns the property.
    pub fn property(&self) -> &VolumeProperty {
        &self.property
    }

    /// Returns the property for editing.
    pub fn property_mut(&mut self) -> &mut VolumeProperty {
        &mut self.property
    }

    /// Returns the modification time of the volume, its mapper and its property.
    ///
    /// The input image is tracked separately, see [`ImageData::mtime`].
    pub fn mtime(&self) -> u64 {
        self.time
            .mtime()
            .max(self.mapper.mtime())
            .max(self.property.mtime())
    }
}
