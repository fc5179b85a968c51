use image::{GrayImage, Luma};
use ridge_vision::core_modules::block_grid::{BackgroundMask, BlockGrid, Point, Segment};
use ridge_vision::core_modules::field_bank::FieldSource;
use ridge_vision::core_modules::neighborhood_classifier::{Classification, ClassificationMap};
use ridge_vision::core_modules::orientation::{OrientationField, normalize_angle};
use ridge_vision::core_modules::quality_categorizer::QualityMap;
use ridge_vision::Result;
use std::cell::Cell;
use std::ops::RangeInclusive;

/// Square block patch `[lo, hi] x [lo, hi]`.
pub fn in_patch(p: Point, patch: &RangeInclusive<u32>) -> bool {
    patch.contains(&p.x) && patch.contains(&p.y)
}

/// Classification map from text rows: `#` inner, `+` border, anything else ordinary.
pub fn parse_classification(rows: &[&str]) -> ClassificationMap {
    let cols = rows[0].len() as u32;
    BlockGrid::from_fn(cols, rows.len() as u32, |p| match rows[p.y as usize].as_bytes()[p.x as usize] {
        b'#' => Classification::InnerBlock,
        b'+' => Classification::BorderBlock,
        _ => Classification::Ordinary,
    })
}

pub fn all_foreground(cols: u32, rows: u32) -> BackgroundMask {
    BlockGrid::filled(cols, rows, Segment::Foreground)
}

/// Uniform `outside` quality with `inside` on a square patch.
pub fn quality_with_patch(cols: u32, rows: u32, patch: RangeInclusive<u32>, inside: f64, outside: f64) -> QualityMap {
    BlockGrid::from_fn(cols, rows, |p| Some(if in_patch(p, &patch) { inside } else { outside }))
}

/// Uniform `outside` orientation with `inside` on a square patch.
pub fn field_with_patch(
    cols: u32,
    rows: u32,
    block_size: u32,
    patch: RangeInclusive<u32>,
    inside: f64,
    outside: f64,
) -> OrientationField {
    let angles = BlockGrid::from_fn(cols, rows, |p| if in_patch(p, &patch) { inside } else { outside });
    OrientationField::from_angles(angles, block_size).expect("valid angles")
}

/// Orientation whirl around `(center, center)`; a core-like singular point.
pub fn vortex_field(size: u32, center: f64, block_size: u32) -> OrientationField {
    let angles = BlockGrid::from_fn(size, size, |p| {
        let (dx, dy) = (p.x as f64 - center, p.y as f64 - center);
        normalize_angle(0.5 * dy.atan2(dx).to_degrees())
    });
    OrientationField::from_angles(angles, block_size).expect("valid angles")
}

/// Intensity varies along x only, so every ridge is vertical (90 degrees).
pub fn vertical_stripes(width: u32, height: u32, period: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| {
        if (x / (period / 2)) % 2 == 0 { Luma([40]) } else { Luma([220]) }
    })
}

/// Field source returning a uniform field and counting its calls.
pub struct UniformSource {
    pub angle: f64,
    pub cols: u32,
    pub rows: u32,
    pub calls: Cell<usize>,
}

impl UniformSource {
    pub fn new(angle: f64, cols: u32, rows: u32) -> Self {
        Self {
            angle,
            cols,
            rows,
            calls: Cell::new(0),
        }
    }
}

impl FieldSource for UniformSource {
    fn estimate_field(&self, block_size: u32) -> Result<OrientationField> {
        self.calls.set(self.calls.get() + 1);
        OrientationField::from_angles(BlockGrid::filled(self.cols, self.rows, self.angle), block_size)
    }
}
