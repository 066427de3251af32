//! Camera and view management.

use glam::{DMat4, DVec3};

/// Camera projection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    /// Perspective projection.
    #[default]
    Perspective,
    /// Orthographic projection.
    Orthographic,
}

/// A 3D camera for viewing the scene.
///
/// Kept in double precision: the volume pass re-centers its stabilized
/// coordinates on the camera, and that only pays off if the camera itself
/// does not lose precision far from the origin.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space.
    pub position: DVec3,
    /// Point the camera is looking at.
    pub target: DVec3,
    /// Up vector.
    pub up: DVec3,
    /// Field of view in radians.
    pub fov: f64,
    /// Aspect ratio (width / height).
    pub aspect_ratio: f64,
    /// Near clipping plane.
    pub near: f64,
    /// Far clipping plane.
    pub far: f64,
    /// Projection mode.
    pub projection_mode: ProjectionMode,
    /// Orthographic half height (used when `projection_mode` is Orthographic).
    pub ortho_scale: f64,
}

impl Camera {
    /// Creates a new camera with default settings.
    #[must_use]
    pub fn new(aspect_ratio: f64) -> Self {
        Self {
            position: DVec3::new(0.0, 0.0, 3.0),
            target: DVec3::ZERO,
            up: DVec3::Y,
            fov: std::f64::consts::FRAC_PI_4, // 45 degrees
            aspect_ratio,
            near: 0.01,
            far: 1000.0,
            projection_mode: ProjectionMode::Perspective,
            ortho_scale: 1.0,
        }
    }

    /// Sets the aspect ratio.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f64) {
        self.aspect_ratio = aspect_ratio;
    }

    /// Returns the view matrix.
    #[must_use]
    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Returns the projection matrix (depth in `[0, 1]`).
    #[must_use]
    pub fn projection_matrix(&self) -> DMat4 {
        match self.projection_mode {
            ProjectionMode::Perspective => {
                DMat4::perspective_rh(self.fov, self.aspect_ratio, self.near, self.far)
            }
            ProjectionMode::Orthographic => {
                let half_height = self.ortho_scale;
                let half_width = half_height * self.aspect_ratio;
                DMat4::orthographic_rh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    self.near,
                    self.far,
                )
            }
        }
    }

    /// Returns the combined view-projection matrix.
    #[must_use]
    pub fn view_projection_matrix(&self) -> DMat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Returns the camera's forward direction.
    #[must_use]
    pub fn forward(&self) -> DVec3 {
        (self.target - self.position).normalize()
    }

    /// Returns `[near, far]`.
    #[must_use]
    pub fn clipping_range(&self) -> [f64; 2] {
        [self.near, self.far]
    }

    /// Resets the camera to look at the given bounding box.
    pub fn look_at_box(&mut self, min: DVec3, max: DVec3) {
        let center = (min + max) * 0.5;
        let size = (max - min).length().max(f64::EPSILON);
        let extents = max - min;

        self.target = center;
        self.position = center + DVec3::new(0.0, 0.0, size * 1.5);
        self.near = size * 0.001;
        self.far = size * 100.0;

        let half_height = extents.y.max(extents.x / self.aspect_ratio) * 0.6;
        self.ortho_scale = half_height.max(0.1);
    }

    /// Sets the projection mode.
    pub fn set_projection_mode(&mut self, mode: ProjectionMode) {
        self.projection_mode = mode;
    }

    /// Sets the field of view in radians.
    pub fn set_fov(&mut self, fov: f64) {
        self.fov = fov.clamp(0.1, std::f64::consts::PI - 0.1);
    }

    /// Sets the near clipping plane.
    pub fn set_near(&mut self, near: f64) {
        self.near = near.max(1e-6);
    }

    /// Sets the far clipping plane.
    pub fn set_far(&mut self, far: f64) {
        self.far = far.max(self.near * 2.0);
    }

    /// Returns FOV in degrees.
    #[must_use]
    pub fn fov_degrees(&self) -> f64 {
        self.fov.to_degrees()
    }

    /// Sets FOV from degrees.
    pub fn set_fov_degrees(&mut self, degrees: f64) {
        self.set_fov(degrees.to_radians());
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(16.0 / 9.0)
    }
}
