// THEORY:
// The `orientation` module owns the ridge orientation field: one angle per
// block, in degrees within [0, 180), plus the doubled-angle unit vectors
// (cos 2θ, sin 2θ) that make orientations averageable. Orientations are
// axial (0° and 180° are the same ridge direction), so angles are never
// averaged directly; every smoothing step averages the vectors and converts
// back.
//
// It provides the estimator the field bank needs to look at the same image at
// a different block size:
// 1.  **Gradients** are computed once per image with a 3x3 Scharr operator and
//     reused for every block size.
// 2.  **Block orientation** is the classic least-squares estimate from the
//     gradient structure tensor: Vx = Σ 2·gx·gy, Vy = Σ (gx² − gy²),
//     θ = 90° + ½·atan2(Vx, Vy).
// 3.  **Smoothing** expands the vectors to pixel resolution, convolves them
//     with a separable Gaussian whose side scales with the block size, then
//     averages the result back per block.

use crate::core_modules::block_grid::{BlockGrid, Point};
use crate::error::{AnalysisError, Result};
use image::GrayImage;

/// One block's orientation: the angle and its doubled-angle vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// Degrees in [0, 180).
    pub angle: f64,
    pub theta_x: f64,
    pub theta_y: f64,
}

impl OrientationSample {
    pub fn from_angle(angle: f64) -> Self {
        let doubled = (2.0 * angle).to_radians();
        Self {
            angle,
            theta_x: doubled.cos(),
            theta_y: doubled.sin(),
        }
    }
}

/// A block-resolution orientation field and its smoothing vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationField {
    block_size: u32,
    angles: BlockGrid<f64>,
    theta_x: BlockGrid<f64>,
    theta_y: BlockGrid<f64>,
}

impl OrientationField {
    /// Builds a field from angles alone, deriving the vectors.
    pub fn from_angles(angles: BlockGrid<f64>, block_size: u32) -> Result<Self> {
        let theta_x = angles.map(|_, a| OrientationSample::from_angle(*a).theta_x);
        let theta_y = angles.map(|_, a| OrientationSample::from_angle(*a).theta_y);
        Self::from_parts(angles, theta_x, theta_y, block_size)
    }

    pub fn from_parts(
        angles: BlockGrid<f64>,
        theta_x: BlockGrid<f64>,
        theta_y: BlockGrid<f64>,
        block_size: u32,
    ) -> Result<Self> {
        if block_size == 0 {
            return Err(AnalysisError::InvalidBlockSize(block_size));
        }
        theta_x.ensure_shape("orientation theta_x", angles.shape())?;
        theta_y.ensure_shape("orientation theta_y", angles.shape())?;
        let field = Self {
            block_size,
            angles,
            theta_x,
            theta_y,
        };
        field.validate()?;
        Ok(field)
    }

    fn from_samples(samples: BlockGrid<OrientationSample>, block_size: u32) -> Self {
        Self {
            block_size,
            angles: samples.map(|_, s| s.angle),
            theta_x: samples.map(|_, s| s.theta_x),
            theta_y: samples.map(|_, s| s.theta_y),
        }
    }

    /// Fails on the first angle that is not finite or outside [0, 180).
    pub fn validate(&self) -> Result<()> {
        for p in self.angles.points() {
            let angle = self.angles[p];
            if !(0.0..180.0).contains(&angle) {
                return Err(AnalysisError::ValueOutOfRange {
                    what: "orientation",
                    x: p.x,
                    y: p.y,
                    value: angle,
                });
            }
        }
        Ok(())
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn shape(&self) -> (u32, u32) {
        self.angles.shape()
    }

    pub fn angles(&self) -> &BlockGrid<f64> {
        &self.angles
    }

    pub fn theta_x(&self) -> &BlockGrid<f64> {
        &self.theta_x
    }

    pub fn theta_y(&self) -> &BlockGrid<f64> {
        &self.theta_y
    }

    pub fn angle(&self, p: Point) -> f64 {
        self.angles[p]
    }

    pub fn sample(&self, p: Point) -> OrientationSample {
        OrientationSample {
            angle: self.angles[p],
            theta_x: self.theta_x[p],
            theta_y: self.theta_y[p],
        }
    }

    pub fn set_sample(&mut self, p: Point, sample: OrientationSample) {
        self.angles[p] = sample.angle;
        self.theta_x[p] = sample.theta_x;
        self.theta_y[p] = sample.theta_y;
    }
}

/// Folds any angle in degrees into [0, 180).
pub fn normalize_angle(angle: f64) -> f64 {
    let folded = angle.rem_euclid(180.0);
    // rem_euclid can round up to the modulus for tiny negative inputs.
    if folded >= 180.0 { 0.0 } else { folded }
}

/// `atan2` in degrees within [0, 360).
fn atan2_degrees(y: f64, x: f64) -> f64 {
    let degrees = y.atan2(x).to_degrees();
    if degrees < 0.0 { degrees + 360.0 } else { degrees }
}

/// Per-pixel Scharr gradients of a grayscale image.
#[derive(Debug, Clone)]
pub struct GradientField {
    width: u32,
    height: u32,
    gx: Vec<f64>,
    gy: Vec<f64>,
}

impl GradientField {
    pub fn from_image(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let (w, h) = (width as usize, height as usize);
        let pixel = |x: isize, y: isize| -> f64 {
            image.get_pixel(reflect_101(x, w) as u32, reflect_101(y, h) as u32).0[0] as f64
        };

        let mut gx = vec![0.0; w * h];
        let mut gy = vec![0.0; w * h];
        for y in 0..h as isize {
            for x in 0..w as isize {
                let (tl, tc, tr) = (pixel(x - 1, y - 1), pixel(x, y - 1), pixel(x + 1, y - 1));
                let (ml, mr) = (pixel(x - 1, y), pixel(x + 1, y));
                let (bl, bc, br) = (pixel(x - 1, y + 1), pixel(x, y + 1), pixel(x + 1, y + 1));
                let index = y as usize * w + x as usize;
                gx[index] = 3.0 * (tr - tl) + 10.0 * (mr - ml) + 3.0 * (br - bl);
                gy[index] = 3.0 * (bl - tl) + 10.0 * (bc - tc) + 3.0 * (br - tr);
            }
        }

        Self { width, height, gx, gy }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Least-squares orientation of the pixels of block `(bx, by)`, clipped to the image.
    fn block_angle(&self, bx: u32, by: u32, block_size: u32) -> f64 {
        let x_end = ((bx + 1) * block_size).min(self.width);
        let y_end = ((by + 1) * block_size).min(self.height);

        let mut vx = 0.0;
        let mut vy = 0.0;
        for y in (by * block_size)..y_end {
            for x in (bx * block_size)..x_end {
                let index = (y * self.width + x) as usize;
                let (gx, gy) = (self.gx[index], self.gy[index]);
                vx += 2.0 * gx * gy;
                vy += gx * gx - gy * gy;
            }
        }

        // Flat block, no gradient energy to orient.
        if vx == 0.0 && vy == 0.0 {
            return 0.0;
        }
        normalize_angle(90.0 + 0.5 * atan2_degrees(vx, vy))
    }
}

/// Gaussian smoothing of the doubled-angle vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    /// Standard deviation in pixels.
    pub sigma: f64,
    /// Kernel side as a multiple of the field's block size.
    pub kernel_factor: u32,
}

impl SmoothingParams {
    pub fn kernel_size(&self, block_size: u32) -> usize {
        (self.kernel_factor * block_size).max(1) as usize
    }
}

/// Estimates smoothed orientation fields of one image at any block size.
pub struct OrientationEstimator {
    gradients: GradientField,
    smoothing: SmoothingParams,
}

impl OrientationEstimator {
    pub fn new(image: &GrayImage, smoothing: SmoothingParams) -> Self {
        Self {
            gradients: GradientField::from_image(image),
            smoothing,
        }
    }

    pub fn image_dimensions(&self) -> (u32, u32) {
        self.gradients.dimensions()
    }

    /// Unsmoothed field on a `cols x rows` grid.
    pub fn raw_field(&self, block_size: u32, cols: u32, rows: u32) -> Result<OrientationField> {
        if block_size == 0 {
            return Err(AnalysisError::InvalidBlockSize(block_size));
        }
        let samples = BlockGrid::from_fn(cols, rows, |p| {
            OrientationSample::from_angle(self.gradients.block_angle(p.x, p.y, block_size))
        });
        Ok(OrientationField::from_samples(samples, block_size))
    }

    /// Smoothed field on a `cols x rows` grid.
    pub fn estimate(&self, block_size: u32, cols: u32, rows: u32) -> Result<OrientationField> {
        let raw = self.raw_field(block_size, cols, rows)?;
        let (width, height) = self.image_dimensions();
        Ok(smooth_field(&raw, width, height, self.smoothing))
    }

    /// Smoothed field over whole blocks only, the shape of the base block grid.
    pub fn estimate_base(&self, block_size: u32) -> Result<OrientationField> {
        if block_size == 0 {
            return Err(AnalysisError::InvalidBlockSize(block_size));
        }
        let (width, height) = self.image_dimensions();
        self.estimate(block_size, width / block_size, height / block_size)
    }

    /// Smoothed field whose blocks cover every pixel, partial edge blocks included.
    pub fn estimate_covering(&self, block_size: u32) -> Result<OrientationField> {
        if block_size == 0 {
            return Err(AnalysisError::InvalidBlockSize(block_size));
        }
        let (width, height) = self.image_dimensions();
        self.estimate(block_size, width.div_ceil(block_size), height.div_ceil(block_size))
    }
}

/// Re-estimates every block of `field` from Gaussian-smoothed vectors over a
/// `width x height` pixel canvas.
pub fn smooth_field(field: &OrientationField, width: u32, height: u32, params: SmoothingParams) -> OrientationField {
    let (cols, rows) = field.shape();
    if cols == 0 || rows == 0 || width == 0 || height == 0 {
        return field.clone();
    }

    let block_size = field.block_size();
    let (w, h) = (width as usize, height as usize);
    let block_of = |x: usize, y: usize| {
        Point::new(
            (x as u32 / block_size).min(cols - 1),
            (y as u32 / block_size).min(rows - 1),
        )
    };

    let mut expanded_x = vec![0.0; w * h];
    let mut expanded_y = vec![0.0; w * h];
    for y in 0..h {
        for x in 0..w {
            let p = block_of(x, y);
            expanded_x[y * w + x] = field.theta_x()[p];
            expanded_y[y * w + x] = field.theta_y()[p];
        }
    }

    let kernel = gaussian_kernel(params.kernel_size(block_size), params.sigma);
    let smoothed_x = convolve_separable(&expanded_x, w, h, &kernel);
    let smoothed_y = convolve_separable(&expanded_y, w, h, &kernel);

    let samples = BlockGrid::from_fn(cols, rows, |p| {
        let x_range = (p.x * block_size) as usize..(((p.x + 1) * block_size) as usize).min(w);
        let y_range = (p.y * block_size) as usize..(((p.y + 1) * block_size) as usize).min(h);
        if x_range.is_empty() || y_range.is_empty() {
            return field.sample(p);
        }

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        for y in y_range.clone() {
            for x in x_range.clone() {
                sum_x += smoothed_x[y * w + x];
                sum_y += smoothed_y[y * w + x];
            }
        }
        let count = (x_range.len() * y_range.len()) as f64;
        let (theta_x, theta_y) = (sum_x / count, sum_y / count);

        OrientationSample {
            angle: normalize_angle(0.5 * atan2_degrees(theta_y, theta_x)),
            theta_x,
            theta_y,
        }
    });

    OrientationField::from_samples(samples, block_size)
}

/// Normalized 1D Gaussian of `size` taps centered at `(size - 1) / 2`.
fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f64> {
    let center = (size as f64 - 1.0) / 2.0;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Index into `[0, n)` mirrored at the edges without repeating the edge sample.
fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i as usize
}

/// Row pass then column pass of the same kernel, anchored at `len / 2`.
fn convolve_separable(data: &[f64], width: usize, height: usize, kernel: &[f64]) -> Vec<f64> {
    let anchor = (kernel.len() / 2) as isize;

    let mut rows_done = vec![0.0; data.len()];
    for y in 0..height {
        let row = &data[y * width..(y + 1) * width];
        for x in 0..width {
            rows_done[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(i, k)| k * row[reflect_101(x as isize + i as isize - anchor, width)])
                .sum();
        }
    }

    let mut result = vec![0.0; data.len()];
    for y in 0..height {
        for x in 0..width {
            result[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(i, k)| k * rows_done[reflect_101(y as isize + i as isize - anchor, height) * width + x])
                .sum();
        }
    }
    result
}
