//! Transfer-function lookup tables.
//!
//! Every transfer-function row of every volume is sampled into one color
//! atlas (RGBA8) and one opacity atlas (float). With `num_rows` logical rows
//! the atlases are `2 * num_rows` tall: logical row `r` sits at texture row
//! `r` and is duplicated verbatim at `r + num_rows`. Volumes take rows in
//! list order, one row per component in independent mode and one row in
//! joint mode.

use volscope_core::{TimeStamp, Volume, VolumeHandle};

use crate::error::RenderResult;

/// Corrects a per-unit-distance opacity for a ray step of `sample_distance`.
///
/// `1 - (1 - opacity)^(sample_distance / unit_distance)`; a ratio of 1 is the
/// identity.
pub fn opacity_correction(opacity: f32, sample_distance: f64, unit_distance: f64) -> f32 {
    let ratio = sample_distance / unit_distance;
    (1.0 - (1.0 - f64::from(opacity)).powf(ratio)) as f32
}

/// Number of lookup-table rows a volume occupies.
pub fn rows_for(volume: &Volume) -> u32 {
    if volume.property().independent_components() {
        volume.mapper().input().number_of_components() as u32
    } else {
        1
    }
}

/// First lookup-table row of each volume.
pub fn row_offsets(volumes: &[VolumeHandle]) -> Vec<u32> {
    let mut next = 0;
    volumes
        .iter()
        .map(|v| {
            let first = next;
            next += rows_for(&v.borrow());
            first
        })
        .collect()
}

/// Largest modification time among the pass, the volumes and their images.
pub fn volumes_mtime(volumes: &[VolumeHandle], pass_mtime: u64) -> u64 {
    volumes.iter().fold(pass_mtime, |m, v| {
        let v = v.borrow();
        m.max(v.mtime()).max(v.mapper().input().mtime())
    })
}

fn to_byte(v: f32) -> u8 {
    (255.0 * v).clamp(0.0, 255.0) as u8
}

/// CPU image of both lookup-table atlases.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTableImage {
    row_length: u32,
    num_rows: u32,
    color: Vec<u8>,
    opacity: Vec<f32>,
}

impl LookupTableImage {
    fn new(row_length: u32, num_rows: u32) -> Self {
        let texels = row_length as usize * 2 * num_rows as usize;
        Self {
            row_length,
            num_rows,
            color: vec![0; texels * 4],
            opacity: vec![0.0; texels],
        }
    }

    /// Samples per row (texture width).
    pub fn row_length(&self) -> u32 {
        self.row_length
    }

    /// Number of logical rows.
    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    /// Texture height, `2 * num_rows`.
    pub fn height(&self) -> u32 {
        2 * self.num_rows
    }

    /// RGBA8 texels, row-major.
    pub fn color(&self) -> &[u8] {
        &self.color
    }

    /// Opacity texels, row-major.
    pub fn opacity(&self) -> &[f32] {
        &self.opacity
    }

    /// One texture row of the color atlas.
    pub fn color_row(&self, row: u32) -> &[u8] {
        let width = self.row_length as usize * 4;
        let start = row as usize * width;
        &self.color[start..start + width]
    }

    /// One texture row of the opacity atlas.
    pub fn opacity_row(&self, row: u32) -> &[f32] {
        let width = self.row_length as usize;
        let start = row as usize * width;
        &self.opacity[start..start + width]
    }

    fn write_row(&mut self, row: u32, colors: &[[f32; 3]], opacities: &[f32]) {
        let n = self.row_length as usize;
        for texture_row in [row, row + self.num_rows] {
            let base = texture_row as usize * n;
            for (i, rgb) in colors.iter().enumerate() {
                let at = (base + i) * 4;
                self.color[at] = to_byte(rgb[0]);
                self.color[at + 1] = to_byte(rgb[1]);
                self.color[at + 2] = to_byte(rgb[2]);
                self.color[at + 3] = 255;
            }
            self.opacity[base..base + n].copy_from_slice(opacities);
        }
    }
}

/// Builds [`LookupTableImage`]s and tracks when they were last built.
#[derive(Debug)]
pub struct LookupTableBuilder {
    row_length: u32,
    build_time: TimeStamp,
    image: Option<LookupTableImage>,
}

impl LookupTableBuilder {
    /// Creates a builder sampling `row_length` values per row.
    pub fn new(row_length: u32) -> Self {
        Self {
            row_length: row_length.max(1),
            build_time: TimeStamp::new(),
            image: None,
        }
    }

    /// Returns the row length.
    pub fn row_length(&self) -> u32 {
        self.row_length
    }

    /// Changes the row length; the next update rebuilds.
    pub fn set_row_length(&mut self, row_length: u32) {
        let row_length = row_length.max(1);
        if self.row_length != row_length {
            self.row_length = row_length;
            self.build_time = TimeStamp::new();
        }
    }

    /// Tick of the last build, 0 if never built.
    pub fn build_time(&self) -> u64 {
        self.build_time.mtime()
    }

    /// Returns the last built image.
    pub fn image(&self) -> Option<&LookupTableImage> {
        self.image.as_ref()
    }

    /// Whether the volumes or the pass changed since the last build.
    pub fn is_stale(&self, volumes: &[VolumeHandle], pass_mtime: u64) -> bool {
        self.build_time
            .is_older_than(volumes_mtime(volumes, pass_mtime))
    }

    /// [`build`](Self::build) followed by [`mark_built`](Self::mark_built).
    pub fn update(
        &mut self,
        volumes: &[VolumeHandle],
        pass_mtime: u64,
        sample_distance: f64,
    ) -> RenderResult<Option<&LookupTableImage>> {
        if self.build(volumes, pass_mtime, sample_distance)?.is_none() {
            return Ok(None);
        }
        self.mark_built();
        Ok(self.image.as_ref())
    }

    /// Records that the last built image is in use. Until then the builder
    /// stays stale and the next call rebuilds.
    pub fn mark_built(&mut self) {
        self.build_time.modified();
    }

    /// Rebuilds every row if stale, without marking the build time. Returns
    /// the new image, or `None` when the previous one is still current.
    pub fn build(
        &mut self,
        volumes: &[VolumeHandle],
        pass_mtime: u64,
        sample_distance: f64,
    ) -> RenderResult<Option<&LookupTableImage>> {
        if !self.is_stale(volumes, pass_mtime) {
            return Ok(None);
        }

        let num_rows: u32 = volumes.iter().map(|v| rows_for(&v.borrow())).sum();
        let mut image = LookupTableImage::new(self.row_length, num_rows);
        let n = self.row_length as usize;

        let mut row = 0;
        for handle in volumes {
            let volume = handle.borrow();
            let property = volume.property();
            for component in 0..rows_for(&volume) {
                let c = component as usize;
                let colors = property.color_table(c, n)?;
                let unit_distance = property.scalar_opacity_unit_distance(c)?;
                let opacities: Vec<f32> = property
                    .opacity_table(c, n)?
                    .into_iter()
                    .map(|o| opacity_correction(o, sample_distance, unit_distance))
                    .collect();
                image.write_row(row, &colors, &opacities);
                row += 1;
            }
        }

        log::debug!(
            "rebuilt lookup tables: {} volumes, {num_rows} rows of {n}",
            volumes.len()
        );
        self.image = Some(image);
        Ok(self.image.as_ref())
    }
}
