//! Volume rendering property: per-component transfer functions and settings.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::time_stamp::TimeStamp;
use crate::transfer_function::{ColorTransferFunction, PiecewiseFunction};

/// Maximum number of independently mapped scalar components.
pub const MAX_COMPONENTS: usize = 4;

/// Which color function a component uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ColorMode {
    /// Single-channel gray ramp, replicated into RGB.
    Gray,
    /// Full RGB transfer function.
    #[default]
    Rgb,
}

/// Sampling interpolation of the scalar volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InterpolationType {
    /// Nearest-neighbour sampling.
    Nearest,
    /// Trilinear sampling.
    Linear,
    /// Hardware trilinear sampling (default).
    #[default]
    FastLinear,
}

#[derive(Debug, Clone)]
struct ComponentData {
    color_mode: ColorMode,
    gray_transfer_function: PiecewiseFunction,
    rgb_transfer_function: ColorTransferFunction,
    scalar_opacity: PiecewiseFunction,
    scalar_opacity_unit_distance: f64,
    component_weight: f64,
}

impl Default for ComponentData {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::Rgb,
            gray_transfer_function: PiecewiseFunction::from_points(&[(0.0, 0.0), (1024.0, 1.0)]),
            rgb_transfer_function: ColorTransferFunction::default_ramp(),
            scalar_opacity: PiecewiseFunction::from_points(&[(0.0, 1.0), (1024.0, 1.0)]),
            scalar_opacity_unit_distance: 1.0,
            component_weight: 1.0,
        }
    }
}

impl ComponentData {
    fn color_range(&self) -> [f64; 2] {
        match self.color_mode {
            ColorMode::Gray => self.gray_transfer_function.range(),
            ColorMode::Rgb => self.rgb_transfer_function.range(),
        }
    }

    fn mtime(&self) -> u64 {
        let color = match self.color_mode {
            ColorMode::Gray => self.gray_transfer_function.mtime(),
            ColorMode::Rgb => self.rgb_transfer_function.mtime(),
        };
        color.max(self.scalar_opacity.mtime())
    }
}

/// Rendering property of a volume.
///
/// Every component slot starts with the default ramps (black-to-white color over
/// `[0, 1024]`, fully opaque scalar opacity), so reads never need to allocate.
#[derive(Debug, Clone)]
pub struct VolumeProperty {
    components: [ComponentData; MAX_COMPONENTS],
    independent_components: bool,
    interpolation_type: InterpolationType,
    time: TimeStamp,
}

impl Default for VolumeProperty {
    fn default() -> Self {
        Self {
            components: Default::default(),
            independent_components: true,
            interpolation_type: InterpolationType::default(),
            time: TimeStamp::now(),
        }
    }
}

impl VolumeProperty {
    /// Creates a property with default transfer functions.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, index: usize) -> Result<&ComponentData> {
        self.components
            .get(index)
            .ok_or(CoreError::ComponentOutOfRange {
                index,
                max: MAX_COMPONENTS - 1,
            })
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut ComponentData> {
        self.components
            .get_mut(index)
            .ok_or(CoreError::ComponentOutOfRange {
                index,
                max: MAX_COMPONENTS - 1,
            })
    }

    /// Returns the modification time, including every transfer function in use.
    pub fn mtime(&self) -> u64 {
        self.components
            .iter()
            .map(ComponentData::mtime)
            .fold(self.time.mtime(), u64::max)
    }

    /// Returns whether each scalar component gets its own transfer functions.
    pub fn independent_components(&self) -> bool {
        self.independent_components
    }

    /// Sets independent component mode. Returns whether the value changed.
    pub fn set_independent_components(&mut self, independent: bool) -> bool {
        if self.independent_components == independent {
            return false;
        }
        self.independent_components = independent;
        self.time.modified();
        true
    }

    /// Returns the sampling interpolation type.
    pub fn interpolation_type(&self) -> InterpolationType {
        self.interpolation_type
    }

    /// Sets the sampling interpolation type. Returns whether the value changed.
    pub fn set_interpolation_type(&mut self, interpolation: InterpolationType) -> bool {
        if self.interpolation_type == interpolation {
            return false;
        }
        self.interpolation_type = interpolation;
        self.time.modified();
        true
    }

    /// Returns the color mode of a component.
    pub fn color_mode(&self, index: usize) -> Result<ColorMode> {
        Ok(self.slot(index)?.color_mode)
    }

    /// Returns the RGB transfer function of a component.
    pub fn rgb_transfer_function(&self, index: usize) -> Result<&ColorTransferFunction> {
        Ok(&self.slot(index)?.rgb_transfer_function)
    }

    /// Returns the RGB transfer function of a component for editing.
    pub fn rgb_transfer_function_mut(&mut self, index: usize) -> Result<&mut ColorTransferFunction> {
        Ok(&mut self.slot_mut(index)?.rgb_transfer_function)
    }

    /// Replaces the RGB transfer function of a component and switches it to RGB mode.
    pub fn set_rgb_transfer_function(
        &mut self,
        index: usize,
        func: ColorTransferFunction,
    ) -> Result<()> {
        let slot = self.slot_mut(index)?;
        slot.rgb_transfer_function = func;
        slot.color_mode = ColorMode::Rgb;
        self.time.modified();
        Ok(())
    }

    /// Returns the gray transfer function of a component.
    pub fn gray_transfer_function(&self, index: usize) -> Result<&PiecewiseFunction> {
        Ok(&self.slot(index)?.gray_transfer_function)
    }

    /// Returns the gray transfer function of a component for editing.
    pub fn gray_transfer_function_mut(&mut self, index: usize) -> Result<&mut PiecewiseFunction> {
        Ok(&mut self.slot_mut(index)?.gray_transfer_function)
    }

    /// Replaces the gray transfer function of a component and switches it to gray mode.
    pub fn set_gray_transfer_function(&mut self, index: usize, func: PiecewiseFunction) -> Result<()> {
        let slot = self.slot_mut(index)?;
        slot.gray_transfer_function = func;
        slot.color_mode = ColorMode::Gray;
        self.time.modified();
        Ok(())
    }

    /// Returns the scalar opacity function of a component.
    pub fn scalar_opacity(&self, index: usize) -> Result<&PiecewiseFunction> {
        Ok(&self.slot(index)?.scalar_opacity)
    }

    /// Returns the scalar opacity function of a component for editing.
    pub fn scalar_opacity_mut(&mut self, index: usize) -> Result<&mut PiecewiseFunction> {
        Ok(&mut self.slot_mut(index)?.scalar_opacity)
    }

    /// Replaces the scalar opacity function of a component.
    pub fn set_scalar_opacity(&mut self, index: usize, func: PiecewiseFunction) -> Result<()> {
        self.slot_mut(index)?.scalar_opacity = func;
        self.time.modified();
        Ok(())
    }

    /// Returns the distance over which the scalar opacity applies unattenuated.
    pub fn scalar_opacity_unit_distance(&self, index: usize) -> Result<f64> {
        Ok(self.slot(index)?.scalar_opacity_unit_distance)
    }

    /// Sets the scalar opacity unit distance. Returns whether the value changed.
    pub fn set_scalar_opacity_unit_distance(&mut self, index: usize, distance: f64) -> Result<bool> {
        let slot = self.slot_mut(index)?;
        if (slot.scalar_opacity_unit_distance - distance).abs() <= f64::EPSILON {
            return Ok(false);
        }
        slot.scalar_opacity_unit_distance = distance;
        self.time.modified();
        Ok(true)
    }

    /// Returns the mixing weight of a component.
    pub fn component_weight(&self, index: usize) -> Result<f64> {
        Ok(self.slot(index)?.component_weight)
    }

    /// Sets the mixing weight of a component, clamped to `[0, 1]`.
    /// Returns whether the value changed.
    pub fn set_component_weight(&mut self, index: usize, weight: f64) -> Result<bool> {
        let weight = weight.clamp(0.0, 1.0);
        let slot = self.slot_mut(index)?;
        if (slot.component_weight - weight).abs() <= f64::EPSILON {
            return Ok(false);
        }
        slot.component_weight = weight;
        self.time.modified();
        Ok(true)
    }

    /// Returns the declared range of the color function in use for a component.
    pub fn color_range(&self, index: usize) -> Result<[f64; 2]> {
        Ok(self.slot(index)?.color_range())
    }

    /// Samples the color function in use across its own range.
    ///
    /// Gray functions are replicated into all three channels.
    pub fn color_table(&self, index: usize, n: usize) -> Result<Vec<[f32; 3]>> {
        let slot = self.slot(index)?;
        let [lo, hi] = slot.color_range();
        let table = match slot.color_mode {
            ColorMode::Rgb => slot.rgb_transfer_function.table(lo, hi, n),
            ColorMode::Gray => slot
                .gray_transfer_function
                .table(lo, hi, n)
                .into_iter()
                .map(|g| [g, g, g])
                .collect(),
        };
        Ok(table)
    }

    /// Samples the scalar opacity function across its own range.
    pub fn opacity_table(&self, index: usize, n: usize) -> Result<Vec<f32>> {
        let func = &self.slot(index)?.scalar_opacity;
        let [lo, hi] = func.range();
        Ok(func.table(lo, hi, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let prop = VolumeProperty::new();
        assert!(prop.independent_components());
        assert_eq!(prop.interpolation_type(), InterpolationType::FastLinear);
        assert_eq!(prop.color_mode(0).unwrap(), ColorMode::Rgb);
        assert_eq!(prop.color_range(0).unwrap(), [0.0, 1024.0]);
        assert_eq!(prop.scalar_opacity(3).unwrap().range(), [0.0, 1024.0]);
        assert!((prop.scalar_opacity_unit_distance(0).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_component_out_of_range() {
        let prop = VolumeProperty::new();
        let err = prop.scalar_opacity(MAX_COMPONENTS).unwrap_err();
        assert!(matches!(err, CoreError::ComponentOutOfRange { index: 4, max: 3 }));
    }

    #[test]
    fn test_transfer_function_edit_moves_property_mtime() {
        let mut prop = VolumeProperty::new();
        let before = prop.mtime();
        prop.scalar_opacity_mut(1).unwrap().add_point(512.0, 0.5);
        assert!(prop.mtime() > before);
    }

    #[test]
    fn test_unchanged_setter_does_not_modify() {
        let mut prop = VolumeProperty::new();
        let before = prop.mtime();
        assert!(!prop.set_independent_components(true));
        assert!(!prop.set_scalar_opacity_unit_distance(0, 1.0).unwrap());
        assert_eq!(prop.mtime(), before);
        assert!(prop.set_scalar_opacity_unit_distance(0, 2.0).unwrap());
        assert!(prop.mtime() > before);
    }

    #[test]
    fn test_component_weight_is_clamped() {
        let mut prop = VolumeProperty::new();
        prop.set_component_weight(0, 3.0).unwrap();
        assert!((prop.component_weight(0).unwrap() - 1.0).abs() < f64::EPSILON);
        prop.set_component_weight(0, -1.0).unwrap();
        assert!(prop.component_weight(0).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn test_gray_mode_replicates_channels() {
        let mut prop = VolumeProperty::new();
        prop.set_gray_transfer_function(0, PiecewiseFunction::from_points(&[(0.0, 0.0), (10.0, 1.0)]))
            .unwrap();
        assert_eq!(prop.color_mode(0).unwrap(), ColorMode::Gray);
        assert_eq!(prop.color_range(0).unwrap(), [0.0, 10.0]);
        let table = prop.color_table(0, 3).unwrap();
        assert_eq!(table[1], [0.5, 0.5, 0.5]);
    }
}
