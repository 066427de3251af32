//! Regular scalar grids.

use glam::{DMat3, DMat4, DVec3};

use crate::error::{CoreError, Result};
use crate::time_stamp::TimeStamp;

/// A regular 3D grid of point scalars.
///
/// Scalars are stored interleaved, x fastest: the value of component `c` at
/// index `(i, j, k)` lives at `((k * ny + j) * nx + i) * components + c`.
#[derive(Debug, Clone)]
pub struct ImageData {
    dimensions: [u32; 3],
    spacing: DVec3,
    origin: DVec3,
    direction: DMat3,
    scalars: Vec<f32>,
    number_of_components: usize,
    time: TimeStamp,
}

impl ImageData {
    /// Creates image data with unit spacing, zero origin and identity direction.
    pub fn new(dimensions: [u32; 3], number_of_components: usize, scalars: Vec<f32>) -> Result<Self> {
        if !(1..=4).contains(&number_of_components) {
            return Err(CoreError::UnsupportedComponents(number_of_components));
        }
        if dimensions.contains(&0) {
            return Err(CoreError::EmptyDimensions(dimensions));
        }
        let expected = Self::point_count(dimensions) * number_of_components;
        if scalars.len() != expected {
            return Err(CoreError::SizeMismatch {
                expected,
                actual: scalars.len(),
            });
        }

        Ok(Self {
            dimensions,
            spacing: DVec3::ONE,
            origin: DVec3::ZERO,
            direction: DMat3::IDENTITY,
            scalars,
            number_of_components,
            time: TimeStamp::now(),
        })
    }

    /// Creates a single-component grid filled by evaluating `f(i, j, k)`.
    pub fn from_fn(dimensions: [u32; 3], mut f: impl FnMut(u32, u32, u32) -> f32) -> Result<Self> {
        let mut scalars = Vec::with_capacity(Self::point_count(dimensions));
        for k in 0..dimensions[2] {
            for j in 0..dimensions[1] {
                for i in 0..dimensions[0] {
                    scalars.push(f(i, j, k));
                }
            }
        }
        Self::new(dimensions, 1, scalars)
    }

    fn point_count(dimensions: [u32; 3]) -> usize {
        dimensions.iter().map(|&d| d as usize).product()
    }

    /// Returns the grid dimensions in points.
    pub fn dimensions(&self) -> [u32; 3] {
        self.dimensions
    }

    /// Returns the number of grid points.
    pub fn number_of_points(&self) -> usize {
        Self::point_count(self.dimensions)
    }

    /// Returns the number of scalar components per point.
    pub fn number_of_components(&self) -> usize {
        self.number_of_components
    }

    /// Returns the interleaved scalar values.
    pub fn scalars(&self) -> &[f32] {
        &self.scalars
    }

    /// Replaces the scalar values, keeping dimensions and component count.
    pub fn set_scalars(&mut self, scalars: Vec<f32>) -> Result<()> {
        let expected = self.number_of_points() * self.number_of_components;
        if scalars.len() != expected {
            return Err(CoreError::SizeMismatch {
                expected,
                actual: scalars.len(),
            });
        }
        self.scalars = scalars;
        self.time.modified();
        Ok(())
    }

    /// Returns the point spacing.
    pub fn spacing(&self) -> DVec3 {
        self.spacing
    }

    /// Sets the point spacing.
    pub fn set_spacing(&mut self, spacing: DVec3) {
        if self.spacing != spacing {
            self.spacing = spacing;
            self.time.modified();
        }
    }

    /// Returns the world position of index `(0, 0, 0)`.
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// Sets the world position of index `(0, 0, 0)`.
    pub fn set_origin(&mut self, origin: DVec3) {
        if self.origin != origin {
            self.origin = origin;
            self.time.modified();
        }
    }

    /// Returns the axis direction matrix.
    pub fn direction(&self) -> DMat3 {
        self.direction
    }

    /// Sets the axis direction matrix.
    pub fn set_direction(&mut self, direction: DMat3) -> Result<()> {
        if direction.determinant().abs() < f64::EPSILON {
            return Err(CoreError::SingularDirection);
        }
        if self.direction != direction {
            self.direction = direction;
            self.time.modified();
        }
        Ok(())
    }

    /// Returns the index-to-world matrix: `T(origin) * D * S(spacing)`.
    pub fn index_to_world(&self) -> DMat4 {
        DMat4::from_translation(self.origin)
            * DMat4::from_mat3(self.direction)
            * DMat4::from_scale(self.spacing)
    }

    /// Returns the world-to-index matrix.
    ///
    /// When the image is attached to a volume this maps the volume's model
    /// coordinates, not scene world coordinates, to continuous indices.
    pub fn world_to_index(&self) -> DMat4 {
        self.index_to_world().inverse()
    }

    /// Returns the `[min, max]` of one scalar component (`[0, 0]` if empty).
    pub fn scalar_range(&self, component: usize) -> [f32; 2] {
        let values = self
            .scalars
            .iter()
            .skip(component)
            .step_by(self.number_of_components)
            .copied();
        let mut range: Option<[f32; 2]> = None;
        for v in values.filter(|v| v.is_finite()) {
            range = Some(match range {
                None => [v, v],
                Some([lo, hi]) => [lo.min(v), hi.max(v)],
            });
        }
        range.unwrap_or([0.0, 0.0])
    }

    /// Returns the modification time.
    pub fn mtime(&self) -> u64 {
        self.time.mtime()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_validation() {
        let err = ImageData::new([2, 2, 2], 1, vec![0.0; 7]).unwrap_err();
        assert!(matches!(err, CoreError::SizeMismatch { expected: 8, actual: 7 }));
        assert!(matches!(
            ImageData::new([2, 2, 2], 5, vec![0.0; 40]),
            Err(CoreError::UnsupportedComponents(5))
        ));
        assert!(matches!(
            ImageData::new([0, 2, 2], 1, vec![]),
            Err(CoreError::EmptyDimensions(_))
        ));
    }

    #[test]
    fn test_from_fn_ordering() {
        let image = ImageData::from_fn([3, 2, 1], |i, j, _| (i + 10 * j) as f32).unwrap();
        assert_eq!(image.scalars(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_index_world_round_trip() {
        let mut image = ImageData::new([4, 4, 4], 1, vec![0.0; 64]).unwrap();
        image.set_origin(DVec3::new(1.0, 2.0, 3.0));
        image.set_spacing(DVec3::new(0.5, 2.0, 1.0));
        let world = image.index_to_world().transform_point3(DVec3::new(2.0, 1.0, 3.0));
        assert!((world - DVec3::new(2.0, 4.0, 6.0)).length() < 1e-12);
        let index = image.world_to_index().transform_point3(world);
        assert!((index - DVec3::new(2.0, 1.0, 3.0)).length() < 1e-12);
    }

    #[test]
    fn test_scalar_range_per_component() {
        let image = ImageData::new([2, 1, 1], 2, vec![1.0, -5.0, 3.0, 7.0]).unwrap();
        assert_eq!(image.scalar_range(0), [1.0, 3.0]);
        assert_eq!(image.scalar_range(1), [-5.0, 7.0]);
    }

    #[test]
    fn test_setters_only_modify_on_change() {
        let mut image = ImageData::new([1, 1, 1], 1, vec![0.0]).unwrap();
        let before = image.mtime();
        image.set_origin(DVec3::ZERO);
        assert_eq!(image.mtime(), before);
        image.set_origin(DVec3::X);
        assert!(image.mtime() > before);
        assert!(matches!(
            image.set_direction(DMat3::ZERO),
            Err(CoreError::SingularDirection)
        ));
    }
}
