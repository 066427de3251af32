//! Transfer functions mapping scalar values to color or opacity.
//!
//! Both function kinds are defined by control points sorted by abscissa and are
//! evaluated with linear interpolation, clamping to the end values outside the
//! control point range.

use crate::time_stamp::TimeStamp;

/// Linearly interpolates a control point list at `x`.
///
/// `points` must be sorted by abscissa.
fn interpolate<const N: usize>(points: &[(f64, [f64; N])], x: f64) -> [f64; N] {
    let Some(first) = points.first() else {
        return [0.0; N];
    };
    if x <= first.0 {
        return first.1;
    }
    let last = points[points.len() - 1];
    if x >= last.0 {
        return last.1;
    }

    // First point strictly to the right of x; guaranteed to exist and be > 0.
    let upper = points.partition_point(|(px, _)| *px <= x);
    let (x0, v0) = points[upper - 1];
    let (x1, v1) = points[upper];
    let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };

    let mut out = [0.0; N];
    for (i, o) in out.iter_mut().enumerate() {
        *o = v0[i] + (v1[i] - v0[i]) * t;
    }
    out
}

/// Returns `n` equally spaced abscissas across `[lo, hi]`.
///
/// A single sample sits at `lo`.
fn sample_positions(lo: f64, hi: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 { (hi - lo) / (n - 1) as f64 } else { 0.0 };
    (0..n).map(move |i| lo + step * i as f64)
}

fn insert_sorted<const N: usize>(points: &mut Vec<(f64, [f64; N])>, x: f64, value: [f64; N]) {
    match points.binary_search_by(|(px, _)| px.total_cmp(&x)) {
        Ok(idx) => points[idx].1 = value,
        Err(idx) => points.insert(idx, (x, value)),
    }
}

fn range_of<const N: usize>(points: &[(f64, [f64; N])]) -> [f64; 2] {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => [first.0, last.0],
        _ => [0.0, 0.0],
    }
}

/// A mapping from scalar value to RGB color.
#[derive(Debug, Clone, Default)]
pub struct ColorTransferFunction {
    points: Vec<(f64, [f64; 3])>,
    time: TimeStamp,
}

impl ColorTransferFunction {
    /// Creates an empty color transfer function.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default ramp used when a property slot has no function yet:
    /// black at 0, white at 1024.
    pub fn default_ramp() -> Self {
        let mut func = Self::new();
        func.add_rgb_point(0.0, [0.0, 0.0, 0.0]);
        func.add_rgb_point(1024.0, [1.0, 1.0, 1.0]);
        func
    }

    /// Adds a control point, replacing any point at the same abscissa.
    pub fn add_rgb_point(&mut self, x: f64, rgb: [f64; 3]) {
        insert_sorted(&mut self.points, x, rgb);
        self.time.modified();
    }

    /// Removes all control points.
    pub fn remove_all_points(&mut self) {
        if !self.points.is_empty() {
            self.points.clear();
            self.time.modified();
        }
    }

    /// Returns the number of control points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns whether there are no control points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the `[min, max]` abscissa of the control points.
    pub fn range(&self) -> [f64; 2] {
        range_of(&self.points)
    }

    /// Evaluates the function at `x`.
    pub fn color(&self, x: f64) -> [f64; 3] {
        interpolate(&self.points, x)
    }

    /// Samples `n` colors at equally spaced abscissas across `[lo, hi]`.
    pub fn table(&self, lo: f64, hi: f64, n: usize) -> Vec<[f32; 3]> {
        sample_positions(lo, hi, n)
            .map(|x| {
                let c = self.color(x);
                [c[0] as f32, c[1] as f32, c[2] as f32]
            })
            .collect()
    }

    /// Returns the modification time.
    pub fn mtime(&self) -> u64 {
        self.time.mtime()
    }
}

/// A mapping from scalar value to a single scalar (opacity or gray level).
#[derive(Debug, Clone, Default)]
pub struct PiecewiseFunction {
    points: Vec<(f64, [f64; 1])>,
    time: TimeStamp,
}

impl PiecewiseFunction {
    /// Creates an empty piecewise function.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a function from `(x, value)` pairs.
    pub fn from_points(points: &[(f64, f64)]) -> Self {
        let mut func = Self::new();
        for &(x, y) in points {
            func.add_point(x, y);
        }
        func
    }

    /// Adds a control point, replacing any point at the same abscissa.
    pub fn add_point(&mut self, x: f64, y: f64) {
        insert_sorted(&mut self.points, x, [y]);
        self.time.modified();
    }

    /// Removes all control points.
    pub fn remove_all_points(&mut self) {
        if !self.points.is_empty() {
            self.points.clear();
            self.time.modified();
        }
    }

    /// Returns the number of control points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns whether there are no control points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the `[min, max]` abscissa of the control points.
    pub fn range(&self) -> [f64; 2] {
        range_of(&self.points)
    }

    /// Evaluates the function at `x`.
    pub fn value(&self, x: f64) -> f64 {
        interpolate(&self.points, x)[0]
    }

    /// Samples `n` values at equally spaced abscissas across `[lo, hi]`.
    pub fn table(&self, lo: f64, hi: f64, n: usize) -> Vec<f32> {
        sample_positions(lo, hi, n)
            .map(|x| self.value(x) as f32)
            .collect()
    }

    /// Returns the modification time.
    pub fn mtime(&self) -> u64 {
        self.time.mtime()
    }
}
