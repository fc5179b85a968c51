// THEORY:
// The `FieldCorrector` is the last step of the damage layer. It overwrites the
// base orientation of every block in a correctable damage area with the value
// the area's custom field holds at that place.
//
// The custom field lives on a different grid than the base field, so each base
// block is resampled by majority vote: every pixel of the block is mapped to
// the custom block that covers it and contributes that block's orientation.
// The block takes the most frequent orientation (exact match, ties go to the
// value seen first in column-major pixel order) and the smoothing vectors of
// the first custom block carrying that orientation. A vote, not an average,
// because orientations are axial and averaging 5° with 175° gives 90°, the one
// answer both samples disagree with.
//
// When the custom block size equals the base size the grids coincide and the
// value is copied as is. Areas one block thin have no size bucket and are left
// as they are, like singularity areas.

use crate::core_modules::block_grid::Point;
use crate::core_modules::damage_area::DamageArea;
use crate::core_modules::field_bank::{FieldBank, FieldBankEntry};
use crate::core_modules::orientation::{OrientationField, OrientationSample};
use crate::error::{AnalysisError, Result};
use tracing::{debug, warn};

/// What a correction run touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CorrectionSummary {
    pub corrected_areas: usize,
    pub corrected_blocks: usize,
    pub skipped_singularities: usize,
    /// Areas of minor dimension 0, which have no bank entry.
    pub skipped_thin_areas: usize,
}

pub mod field_corrector {
    use super::*;

    /// Rewrites the blocks of every non-singularity area of `areas` from the
    /// bank entry mapped to it. `areas` must be the list the bank was built from.
    pub fn correct_areas(field: &mut OrientationField, areas: &[DamageArea], bank: &FieldBank) -> Result<CorrectionSummary> {
        let mut summary = CorrectionSummary::default();
        let base_block_size = field.block_size();

        for (index, area) in areas.iter().enumerate() {
            if area.is_singularity() {
                summary.skipped_singularities += 1;
                continue;
            }
            if area.minor_dimension() == 0 {
                summary.skipped_thin_areas += 1;
                continue;
            }
            let Some(entry) = bank.entry_for_area(index) else {
                warn!(area = area.id, "no field bank entry, area left uncorrected");
                continue;
            };

            for &p in area.points() {
                if !field.angles().contains(p.x as i64, p.y as i64) {
                    return Err(AnalysisError::ShapeMismatch {
                        what: "damage area point",
                        expected: field.shape(),
                        actual: (p.x + 1, p.y + 1),
                    });
                }
                let sample = resample_block(p, base_block_size, entry)?;
                field.set_sample(p, sample);
            }
            summary.corrected_areas += 1;
            summary.corrected_blocks += area.point_count();
        }

        debug!(
            corrected_areas = summary.corrected_areas,
            corrected_blocks = summary.corrected_blocks,
            skipped_singularities = summary.skipped_singularities,
            skipped_thin_areas = summary.skipped_thin_areas,
            "field correction finished"
        );
        Ok(summary)
    }

    /// Orientation of base block `p` according to `entry`'s custom field.
    pub fn resample_block(p: Point, base_block_size: u32, entry: &FieldBankEntry) -> Result<OrientationSample> {
        let custom = &entry.field;
        let (cols, rows) = custom.shape();
        if cols == 0 || rows == 0 {
            return Err(AnalysisError::ShapeMismatch {
                what: "custom orientation field",
                expected: (1, 1),
                actual: (cols, rows),
            });
        }

        if entry.block_size == base_block_size {
            let direct = Point::new(p.x.min(cols - 1), p.y.min(rows - 1));
            return Ok(custom.sample(direct));
        }

        let mut samples = Vec::with_capacity((base_block_size * base_block_size) as usize);
        for dx in 0..base_block_size {
            for dy in 0..base_block_size {
                let pixel_x = p.x * base_block_size + dx;
                let pixel_y = p.y * base_block_size + dy;
                let covering = Point::new(
                    (pixel_x / entry.block_size).min(cols - 1),
                    (pixel_y / entry.block_size).min(rows - 1),
                );
                samples.push(custom.sample(covering));
            }
        }

        let angles: Vec<f64> = samples.iter().map(|s| s.angle).collect();
        // Non-empty: base_block_size >= 1.
        let winner = most_frequent(&angles).unwrap_or(0);
        Ok(samples[winner])
    }

    /// Index of the first occurrence of the most frequent value, `None` for
    /// an empty slice.
    pub fn most_frequent(values: &[f64]) -> Option<usize> {
        // (value, count, first index) in order of first appearance.
        let mut tally: Vec<(f64, usize, usize)> = Vec::new();
        for (index, &value) in values.iter().enumerate() {
            match tally.iter_mut().find(|(v, _, _)| *v == value) {
                Some((_, count, _)) => *count += 1,
                None => tally.push((value, 1, index)),
            }
        }

        let mut best: Option<(usize, usize)> = None;
        for &(_, count, first) in &tally {
            if best.is_none_or(|(best_count, _)| count > best_count) {
                best = Some((count, first));
            }
        }
        best.map(|(_, first)| first)
    }
}

#[cfg(test)]
mod tests {
    use super::field_corrector::*;
    use super::*;
    use crate::core_modules::block_grid::BlockGrid;
    use crate::core_modules::damage_area::AreaTag;
    use crate::core_modules::field_bank::{FieldSource, SizeBucket};

    struct FixedSource(OrientationField);

    impl FieldSource for FixedSource {
        fn estimate_field(&self, _block_size: u32) -> Result<OrientationField> {
            Ok(self.0.clone())
        }
    }

    fn entry(angles: BlockGrid<f64>, block_size: u32) -> FieldBankEntry {
        FieldBankEntry {
            bucket: SizeBucket {
                range_begin: 1,
                range_end: 2,
            },
            block_size,
            field: OrientationField::from_angles(angles, block_size).unwrap(),
        }
    }

    #[test]
    fn mode_prefers_the_first_value_on_ties() {
        assert_eq!(most_frequent(&[]), None);
        assert_eq!(most_frequent(&[3.0, 1.0, 1.0, 3.0]), Some(0));
        assert_eq!(most_frequent(&[3.0, 1.0, 1.0]), Some(1));
        assert_eq!(most_frequent(&[5.0]), Some(0));
    }

    #[test]
    fn matching_block_size_copies_directly() {
        let base = OrientationField::from_angles(BlockGrid::from_fn(4, 4, |p| (p.x * 10 + p.y) as f64), 7).unwrap();
        let mut corrected = base.clone();
        let areas = vec![DamageArea::new(1, vec![Point::new(2, 1), Point::new(3, 2)])];

        // Bucket 1 at base 7 keeps block size 7.
        let bank = FieldBank::build(&FixedSource(base.clone()), &areas, 7, 2).unwrap();
        assert_eq!(bank.entries()[0].block_size, 7);

        let summary = correct_areas(&mut corrected, &areas, &bank).unwrap();
        assert_eq!(summary.corrected_blocks, 2);
        assert_eq!(corrected, base);
    }

    #[test]
    fn coarser_field_is_resampled_by_majority() {
        // Base blocks of 4 px, custom blocks of 5 px: base block (1, 0) spans
        // pixels 4..8, so 1 column comes from custom column 0 and 3 from column 1.
        let custom = entry(BlockGrid::from_fn(2, 2, |p| if p.x == 0 { 20.0 } else { 110.0 }), 5);
        let sample = resample_block(Point::new(1, 0), 4, &custom).unwrap();
        assert_eq!(sample.angle, 110.0);
        assert!((sample.theta_x - 220f64.to_radians().cos()).abs() < 1e-12);
        assert!((sample.theta_y - 220f64.to_radians().sin()).abs() < 1e-12);

        // Pixels past the custom grid fall back to its last block.
        let sample = resample_block(Point::new(3, 3), 4, &custom).unwrap();
        assert_eq!(sample.angle, 110.0);
    }

    #[test]
    fn vectors_come_from_the_first_block_with_the_winning_angle() {
        // Base block (1, 1) at 4 px over custom 5 px blocks: 4 pixels vote 20,
        // 12 vote 110, and the first 110 pixel lies in custom block (1, 0).
        let angles = BlockGrid::from_fn(2, 2, |p| if p.x == 0 { 20.0 } else { 110.0 });
        let theta_x = BlockGrid::from_fn(2, 2, |p| [[0.1, 0.2], [0.5, -0.9]][p.x as usize][p.y as usize]);
        let theta_y = BlockGrid::from_fn(2, 2, |p| [[0.3, 0.4], [-0.5, -0.1]][p.x as usize][p.y as usize]);
        let custom = FieldBankEntry {
            bucket: SizeBucket {
                range_begin: 1,
                range_end: 2,
            },
            block_size: 5,
            field: OrientationField::from_parts(angles, theta_x, theta_y, 5).unwrap(),
        };

        let sample = resample_block(Point::new(1, 1), 4, &custom).unwrap();
        assert_eq!(sample.angle, 110.0);
        assert_eq!((sample.theta_x, sample.theta_y), (0.5, -0.5));
    }

    #[test]
    fn thin_areas_are_left_alone() {
        let base = OrientationField::from_angles(BlockGrid::filled(4, 4, 10.0), 8).unwrap();
        let replacement = OrientationField::from_angles(BlockGrid::filled(4, 4, 80.0), 9).unwrap();
        let areas = vec![
            DamageArea::new(1, vec![Point::new(0, 0), Point::new(0, 1), Point::new(0, 2)]),
            DamageArea::new(2, vec![Point::new(2, 2), Point::new(3, 3)]),
        ];

        let bank = FieldBank::build(&FixedSource(replacement), &areas, 8, 2).unwrap();
        let mut field = base.clone();
        let summary = correct_areas(&mut field, &areas, &bank).unwrap();

        assert_eq!(summary.skipped_thin_areas, 1);
        assert_eq!(summary.corrected_areas, 1);
        assert_eq!(field.angle(Point::new(0, 1)), 10.0);
        assert_eq!(field.angle(Point::new(3, 3)), 80.0);
    }

    #[test]
    fn even_split_goes_to_the_first_pixel() {
        // Base 4, custom 6: base block (1, 0) spans pixels 4..8, split 2/2.
        let custom = entry(BlockGrid::from_fn(2, 1, |p| if p.x == 0 { 20.0 } else { 110.0 }), 6);
        assert_eq!(resample_block(Point::new(1, 0), 4, &custom).unwrap().angle, 20.0);
    }

    #[test]
    fn singularity_areas_are_left_alone() {
        let base = OrientationField::from_angles(BlockGrid::filled(3, 3, 10.0), 8).unwrap();
        let replacement = OrientationField::from_angles(BlockGrid::filled(3, 3, 80.0), 9).unwrap();
        let mut singular = DamageArea::new(1, vec![Point::new(0, 0)]);
        singular.tag = AreaTag::Singularity;
        let areas = vec![singular, DamageArea::new(2, vec![Point::new(1, 1), Point::new(2, 2)])];

        let bank = FieldBank::build(&FixedSource(replacement), &areas, 8, 2).unwrap();
        let mut field = base.clone();
        let summary = correct_areas(&mut field, &areas, &bank).unwrap();

        assert_eq!(summary.skipped_singularities, 1);
        assert_eq!(summary.corrected_areas, 1);
        assert_eq!(field.angle(Point::new(0, 0)), 10.0);
        assert_eq!(field.angle(Point::new(2, 2)), 80.0);
    }
}
