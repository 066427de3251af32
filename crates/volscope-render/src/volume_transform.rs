//! Per-volume transform records.
//!
//! Each record maps stabilized coordinates (SC) to normalized texture
//! coordinates (TC) and carries the affine remaps from encoded texture
//! samples to color and opacity lookup coordinates:
//!
//! ```text
//! SC -> world -> model -> index -> TC
//! ```

use glam::{DMat4, DVec3};
use volscope_core::{TimeStamp, Volume, VolumeHandle};

use crate::buffer::{EntryType, StorageBuffer};
use crate::device::RenderDevice;
use crate::error::{RenderError, RenderResult};
use crate::lookup_table::{row_offsets, volumes_mtime};
use crate::volume_texture::VolumeInfo;

/// Stabilized-to-texture matrix: `S(1/dims) * W2I * inverse(M2W) * T(center)`.
///
/// `world_to_index` is the image's own transform, which maps the volume's
/// model coordinates (not scene world coordinates) to indices.
pub fn sctc_matrix(
    center: DVec3,
    model_to_world: DMat4,
    world_to_index: DMat4,
    dimensions: [u32; 3],
) -> DMat4 {
    let inv_dims = DVec3::new(
        1.0 / f64::from(dimensions[0]),
        1.0 / f64::from(dimensions[1]),
        1.0 / f64::from(dimensions[2]),
    );
    DMat4::from_scale(inv_dims)
        * world_to_index
        * model_to_world.inverse()
        * DMat4::from_translation(center)
}

/// Remaps an encoded sample into a function's declared `[lo, hi]`:
/// returns `(scale / (hi - lo), (offset - lo) / (hi - lo))`.
pub fn scale_shift(
    info_scale: f64,
    info_offset: f64,
    range: [f64; 2],
    volume: usize,
    function: &'static str,
) -> RenderResult<(f64, f64)> {
    let [lo, hi] = range;
    let width = hi - lo;
    if !width.is_finite() || width == 0.0 {
        return Err(RenderError::DegenerateRange {
            volume,
            function,
            lo,
            hi,
        });
    }
    Ok((info_scale / width, (info_offset - lo) / width))
}

/// CPU form of one structured-buffer record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeRecord {
    pub sctc_matrix: DMat4,
    pub c_scale: f64,
    pub c_shift: f64,
    pub o_scale: f64,
    pub o_shift: f64,
    pub tfun_row: u32,
}

impl VolumeRecord {
    /// Computes the record of volume `index` for component 0.
    pub fn compute(
        volume: &Volume,
        index: usize,
        center: DVec3,
        tfun_row: u32,
    ) -> RenderResult<Self> {
        let image = volume.mapper().input();
        let property = volume.property();
        let info = VolumeInfo::from_image(image);

        let (c_scale, c_shift) = scale_shift(
            info.scale[0],
            info.offset[0],
            property.color_range(0)?,
            index,
            "color",
        )?;
        let (o_scale, o_shift) = scale_shift(
            info.scale[0],
            info.offset[0],
            property.scalar_opacity(0)?.range(),
            index,
            "opacity",
        )?;

        Ok(Self {
            sctc_matrix: sctc_matrix(
                center,
                volume.matrix(),
                image.world_to_index(),
                image.dimensions(),
            ),
            c_scale,
            c_shift,
            o_scale,
            o_shift,
            tfun_row,
        })
    }
}

/// The `volume_ssbo` structured buffer and its staleness tracking.
pub struct VolumeTransformBuffer {
    ssbo: StorageBuffer,
    build_time: TimeStamp,
    records: Vec<VolumeRecord>,
}

impl Default for VolumeTransformBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeTransformBuffer {
    /// Creates an empty buffer; the layout is filled on the first update.
    pub fn new() -> Self {
        let mut buffer = Self {
            ssbo: StorageBuffer::new("volume_ssbo"),
            build_time: TimeStamp::new(),
            records: Vec::new(),
        };
        buffer.reset_layout(0);
        buffer
    }

    fn reset_layout(&mut self, count: usize) {
        self.ssbo.clear_data();
        self.ssbo.set_number_of_instances(count);
        self.ssbo.add_entry("SCTCMatrix", EntryType::Mat4x4F32);
        self.ssbo.add_entry("cScale", EntryType::F32);
        self.ssbo.add_entry("cShift", EntryType::F32);
        self.ssbo.add_entry("oScale", EntryType::F32);
        self.ssbo.add_entry("oShift", EntryType::F32);
        self.ssbo.add_entry("tfunRow", EntryType::F32);
    }

    /// Tick of the last rebuild, 0 if never built.
    pub fn build_time(&self) -> u64 {
        self.build_time.mtime()
    }

    /// Records from the last rebuild.
    pub fn records(&self) -> &[VolumeRecord] {
        &self.records
    }

    /// Returns the storage buffer.
    pub fn storage_buffer(&self) -> &StorageBuffer {
        &self.ssbo
    }

    /// Whether any volume, image, the pass or the stabilized center changed
    /// since the last rebuild.
    pub fn is_stale(&self, volumes: &[VolumeHandle], pass_mtime: u64, stabilized_time: u64) -> bool {
        let m = volumes_mtime(volumes, pass_mtime.max(stabilized_time));
        self.build_time.is_older_than(m)
    }

    /// Recomputes every record if stale. Every record is computed before the
    /// CPU image is touched, so a degenerate range leaves the previous
    /// contents in place. Returns whether a rebuild happened.
    pub fn update(
        &mut self,
        volumes: &[VolumeHandle],
        center: DVec3,
        pass_mtime: u64,
        stabilized_time: u64,
    ) -> RenderResult<bool> {
        if !self.is_stale(volumes, pass_mtime, stabilized_time) {
            return Ok(false);
        }

        let rows = row_offsets(volumes);
        let records = volumes
            .iter()
            .zip(&rows)
            .enumerate()
            .map(|(i, (handle, &row))| VolumeRecord::compute(&handle.borrow(), i, center, row))
            .collect::<RenderResult<Vec<_>>>()?;

        self.reset_layout(records.len());
        let matrices: Vec<f64> = records
            .iter()
            .flat_map(|r| r.sctc_matrix.to_cols_array())
            .collect();
        self.ssbo.set_all_instances_from_array("SCTCMatrix", &matrices)?;
        let field = |f: fn(&VolumeRecord) -> f64| records.iter().map(f).collect::<Vec<_>>();
        self.ssbo.set_all_instances_from_array("cScale", &field(|r| r.c_scale))?;
        self.ssbo.set_all_instances_from_array("cShift", &field(|r| r.c_shift))?;
        self.ssbo.set_all_instances_from_array("oScale", &field(|r| r.o_scale))?;
        self.ssbo.set_all_instances_from_array("oShift", &field(|r| r.o_shift))?;
        self.ssbo
            .set_all_instances_from_array("tfunRow", &field(|r| f64::from(r.tfun_row)))?;

        log::debug!("rebuilt transform records for {} volumes", records.len());
        self.records = records;
        self.build_time.modified();
        Ok(true)
    }

    /// Uploads the current CPU image.
    pub fn send(&mut self, device: &RenderDevice) {
        self.ssbo.send(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volscope_core::{ImageData, PiecewiseFunction, VolumeMapper};

    fn volume(dims: [u32; 3], scalars: Vec<f32>) -> VolumeHandle {
        let image = ImageData::new(dims, 1, scalars).unwrap();
        Volume::new(VolumeMapper::new(image)).into_handle()
    }

    fn unit_volume() -> VolumeHandle {
        volume([1, 1, 1], vec![0.0])
    }

    #[test]
    fn test_identity_transform_is_translation_by_center() {
        let center = DVec3::new(10.0, -3.0, 2.5);
        let m = sctc_matrix(center, DMat4::IDENTITY, DMat4::IDENTITY, [1, 1, 1]);
        assert!(m.abs_diff_eq(DMat4::from_translation(center), 1e-12));
        let zero = sctc_matrix(DVec3::ZERO, DMat4::IDENTITY, DMat4::IDENTITY, [1, 1, 1]);
        assert!(zero.abs_diff_eq(DMat4::IDENTITY, 1e-12));
    }

    #[test]
    fn test_sc_point_maps_into_texture_space() {
        // 4x4x4 grid with spacing 2 placed at world (100, 0, 0)
        let handle = volume([4, 4, 4], vec![0.0; 64]);
        {
            let mut v = handle.borrow_mut();
            v.mapper_mut().input_mut().set_spacing(DVec3::splat(2.0));
            v.set_position(DVec3::new(100.0, 0.0, 0.0));
        }
        let center = DVec3::new(101.0, 1.0, 1.0);
        let v = handle.borrow();
        let m = sctc_matrix(
            center,
            v.matrix(),
            v.mapper().input().world_to_index(),
            [4, 4, 4],
        );
        // World (104, 4, 4) is model (4, 4, 4), index (2, 2, 2), tcoord 0.5
        let sc = DVec3::new(104.0, 4.0, 4.0) - center;
        let tc = m.transform_point3(sc);
        assert!((tc - DVec3::splat(0.5)).length() < 1e-12);
    }

    #[test]
    fn test_scale_shift_maps_range_ends() {
        // Encoded [0, 1] represents raw [100, 300]; function declared on [100, 500]
        let (scale, shift) = scale_shift(200.0, 100.0, [100.0, 500.0], 0, "color").unwrap();
        assert!((0.0 * scale + shift).abs() < 1e-12);
        assert!((1.0 * scale + shift - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_range_rejected() {
        let err = scale_shift(1.0, 0.0, [5.0, 5.0], 3, "opacity").unwrap_err();
        assert!(matches!(
            err,
            RenderError::DegenerateRange { volume: 3, function: "opacity", .. }
        ));
        assert!(scale_shift(1.0, 0.0, [0.0, f64::INFINITY], 0, "color").is_err());
    }

    #[test]
    fn test_update_fails_fast_on_degenerate_function() {
        let good = unit_volume();
        let bad = unit_volume();
        bad.borrow_mut()
            .property_mut()
            .set_scalar_opacity(0, PiecewiseFunction::from_points(&[(7.0, 1.0)]))
            .unwrap();

        let mut buffer = VolumeTransformBuffer::new();
        let err = buffer
            .update(&[good, bad], DVec3::ZERO, 0, 0)
            .unwrap_err();
        assert!(matches!(err, RenderError::DegenerateRange { volume: 1, .. }));
        assert_eq!(buffer.build_time(), 0);
        assert!(buffer.records().is_empty());
    }

    #[test]
    fn test_records_and_rows() {
        let volumes = vec![unit_volume(), volume([2, 1, 1], vec![0.0, 1024.0])];
        let mut buffer = VolumeTransformBuffer::new();
        assert!(buffer.update(&volumes, DVec3::ZERO, 0, 0).unwrap());

        let records = buffer.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tfun_row, 0);
        assert_eq!(records[1].tfun_row, 1);
        // Raw range [0, 1024] over default color range [0, 1024]
        assert!((records[1].c_scale - 1.0).abs() < 1e-12);
        assert!(records[1].c_shift.abs() < 1e-12);

        let ssbo = buffer.storage_buffer();
        assert_eq!(ssbo.number_of_instances(), 2);
        assert_eq!(ssbo.layout().stride(), 96);
        assert_eq!(ssbo.data().len(), 192);
    }

    #[test]
    fn test_staleness() {
        let volumes = vec![unit_volume()];
        let mut buffer = VolumeTransformBuffer::new();
        buffer.update(&volumes, DVec3::ZERO, 0, 0).unwrap();
        assert!(!buffer.update(&volumes, DVec3::ZERO, 0, 0).unwrap());

        // A stabilized center move after the build forces a rebuild
        let moved = TimeStamp::now().mtime();
        assert!(buffer.is_stale(&volumes, 0, moved));

        volumes[0].borrow_mut().set_position(DVec3::X);
        assert!(buffer.update(&volumes, DVec3::ZERO, 0, 0).unwrap());
    }
}
