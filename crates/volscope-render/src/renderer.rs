//! Renderer state shared by passes: camera, stabilized center and the
//! renderer uniform buffer.
//!
//! Volume positions are expressed relative to a "stabilized center" near the
//! camera so that f32 shader math stays precise for scenes far from the
//! world origin. The center only moves when the camera drifts far enough,
//! and every move bumps [`RendererState::stabilized_time`] so dependent
//! per-volume transforms get rebuilt.

use glam::{DMat4, DVec3};
use volscope_core::{TimeStamp, VolumePassOptions};

use crate::buffer::{EntryType, UniformBuffer};
use crate::camera::Camera;
use crate::device::RenderDevice;
use crate::error::RenderResult;

/// Camera, stabilized center and the `renderer_ubo` uniform.
pub struct RendererState {
    camera: Camera,
    stabilized_center: DVec3,
    stabilized_time: TimeStamp,
    recenter_threshold: f64,
    ubo: UniformBuffer,
}

impl RendererState {
    /// Creates renderer state around a camera.
    pub fn new(camera: Camera, options: &VolumePassOptions) -> Self {
        let mut ubo = UniformBuffer::new("renderer_ubo");
        ubo.add_entry("PCSCMatrix", EntryType::Mat4x4F32);
        ubo.add_entry("SCVCMatrix", EntryType::Mat4x4F32);
        Self {
            camera,
            stabilized_center: DVec3::ZERO,
            stabilized_time: TimeStamp::new(),
            recenter_threshold: options.recenter_threshold,
            ubo,
        }
    }

    /// Returns the camera.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Returns the camera for editing.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Returns the current stabilized center in world coordinates.
    pub fn stabilized_center(&self) -> DVec3 {
        self.stabilized_center
    }

    /// Tick of the last center move, 0 before the first update.
    pub fn stabilized_time(&self) -> u64 {
        self.stabilized_time.mtime()
    }

    /// Moves the center to the camera when it has never been set or when the
    /// camera is further than `recenter_threshold` times the clipping range
    /// away. Returns whether the center moved.
    pub fn update_stabilized_center(&mut self) -> bool {
        let [near, far] = self.camera.clipping_range();
        let tolerance = self.recenter_threshold * (far - near);
        let drift = self.camera.position.distance(self.stabilized_center);
        if self.stabilized_time.is_set() && drift <= tolerance {
            return false;
        }
        self.stabilized_center = self.camera.position;
        self.stabilized_time.modified();
        log::debug!("stabilized center moved to {:?}", self.stabilized_center);
        true
    }

    /// Stabilized coordinates to view coordinates.
    pub fn scvc_matrix(&self) -> DMat4 {
        self.camera.view_matrix() * DMat4::from_translation(self.stabilized_center)
    }

    /// Clip coordinates back to stabilized coordinates.
    pub fn pcsc_matrix(&self) -> DMat4 {
        (self.camera.projection_matrix() * self.scvc_matrix()).inverse()
    }

    /// Recenters if needed and refreshes the CPU image of the uniform.
    pub fn prepare(&mut self) -> RenderResult<()> {
        self.update_stabilized_center();
        self.ubo
            .set_array("PCSCMatrix", &self.pcsc_matrix().to_cols_array())?;
        self.ubo
            .set_array("SCVCMatrix", &self.scvc_matrix().to_cols_array())?;
        Ok(())
    }

    /// [`prepare`](Self::prepare) and upload.
    pub fn update(&mut self, device: &RenderDevice) -> RenderResult<()> {
        self.prepare()?;
        self.ubo.send_if_needed(device);
        Ok(())
    }

    /// Returns the renderer uniform buffer.
    pub fn ubo(&self) -> &UniformBuffer {
        &self.ubo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RendererState {
        RendererState::new(Camera::new(1.0), &VolumePassOptions::default())
    }

    #[test]
    fn test_first_update_sets_center() {
        let mut renderer = state();
        assert_eq!(renderer.stabilized_time(), 0);
        assert!(renderer.update_stabilized_center());
        assert_eq!(renderer.stabilized_center(), renderer.camera().position);
        assert!(renderer.stabilized_time() > 0);
    }

    #[test]
    fn test_small_drift_keeps_center() {
        let mut renderer = state();
        renderer.update_stabilized_center();
        let time = renderer.stabilized_time();
        renderer.camera_mut().position += DVec3::new(1.0, 0.0, 0.0);
        assert!(!renderer.update_stabilized_center());
        assert_eq!(renderer.stabilized_time(), time);
    }

    #[test]
    fn test_large_drift_recenters() {
        let mut renderer = state();
        renderer.update_stabilized_center();
        let time = renderer.stabilized_time();
        // Default clipping range ~1000, threshold 0.2
        renderer.camera_mut().position = DVec3::new(500.0, 0.0, 3.0);
        assert!(renderer.update_stabilized_center());
        assert!(renderer.stabilized_time() > time);
        assert_eq!(renderer.stabilized_center(), DVec3::new(500.0, 0.0, 3.0));
    }

    #[test]
    fn test_pcsc_inverts_projection_of_stabilized_points() {
        let mut renderer = state();
        renderer.prepare().unwrap();
        let center = renderer.stabilized_center();
        let world = DVec3::new(0.1, -0.2, 0.0);
        let clip = renderer
            .camera()
            .view_projection_matrix()
            .project_point3(world);
        let sc = renderer.pcsc_matrix().project_point3(clip);
        assert!((sc + center - world).length() < 1e-9);
        assert!(renderer.ubo().is_dirty());
    }
}
