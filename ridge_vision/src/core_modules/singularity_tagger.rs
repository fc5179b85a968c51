// THEORY:
// The `SingularityTagger` keeps field correction away from places where high
// curvature is a property of the finger rather than a defect. Cores and deltas
// score as "damaged" to every quality estimator because ridge orientation
// changes quickly around them; re-estimating them at a coarser scale would
// erase exactly the structure later matching relies on.
//
// Steps:
// 1.  **Poincaré index**: for every interior foreground block whose 3x3
//     neighborhood is entirely foreground, walk the 8 surrounding orientations
//     clockwise, wrap each absolute pairwise difference into (−π/2, π/2], sum
//     and divide by π.
// 2.  **Marking**: an index strictly inside (−1, −0.5) or (0.5, 1) marks the
//     block as a core-or-delta candidate.
// 3.  **Density filter**: a lone candidate is noise. Every interior foreground
//     block is re-decided from a snapshot of the candidate map: it is singular
//     only if enough of its 3x3 neighborhood (itself included) are candidates.
// 4.  **Area tagging**: a damage area containing any singular block is tagged
//     `Singularity` and skipped by the field corrector.
//
// Every step is a pure function of its inputs, so tagging the same field twice
// yields the same tags.

use crate::core_modules::block_grid::{BackgroundMask, BlockGrid};
use crate::core_modules::damage_area::{AreaTag, DamageArea};
use crate::core_modules::orientation::OrientationField;
use crate::error::Result;
use std::f64::consts::{FRAC_PI_2, PI};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SingularityKind {
    #[default]
    None,
    CoreOrDelta,
}

pub type SingularityMap = BlockGrid<SingularityKind>;

/// Default number of candidates a 3x3 neighborhood needs to keep its center.
pub const DEFAULT_NEIGHBOR_THRESHOLD: usize = 4;

/// Detects cores and deltas and tags the damage areas containing them.
#[derive(Debug, Clone, Copy)]
pub struct SingularityTagger {
    neighbor_threshold: usize,
}

impl Default for SingularityTagger {
    fn default() -> Self {
        Self::new(DEFAULT_NEIGHBOR_THRESHOLD)
    }
}

impl SingularityTagger {
    pub fn new(neighbor_threshold: usize) -> Self {
        Self { neighbor_threshold }
    }

    /// Poincaré index per block; 0 where the index is not defined.
    pub fn poincare_map(&self, field: &OrientationField, background: &BackgroundMask) -> Result<BlockGrid<f64>> {
        let angles = field.angles();
        angles.ensure_shape("orientation field", background.shape())?;

        Ok(angles.map(|p, _| {
            if background.is_background(p) || angles.is_border(p) || background.has_background_neighbor(p) {
                return 0.0;
            }
            match angles.ring(p) {
                Some(ring) => poincare_index(ring.map(|n| angles[n])),
                None => 0.0,
            }
        }))
    }

    /// Filtered singularity map of `field`.
    pub fn detect(&self, field: &OrientationField, background: &BackgroundMask) -> Result<SingularityMap> {
        let index_map = self.poincare_map(field, background)?;
        let candidates = mark_cores_and_deltas(&index_map);
        let filtered = filter_by_density(&candidates, background, self.neighbor_threshold);

        debug!(
            candidates = count_singular(&candidates),
            kept = count_singular(&filtered),
            "singularity detection finished"
        );
        Ok(filtered)
    }

    /// Tags every area that contains a singular block. Returns how many were tagged.
    pub fn tag_areas(&self, areas: &mut [DamageArea], singularities: &SingularityMap) -> usize {
        let mut tagged = 0;
        for area in areas.iter_mut() {
            let contains_singularity = area
                .points()
                .iter()
                .any(|p| singularities[*p] == SingularityKind::CoreOrDelta);
            if contains_singularity {
                area.tag = AreaTag::Singularity;
                tagged += 1;
            }
        }
        tagged
    }
}

/// Poincaré index of a clockwise ring of orientations given in degrees.
pub fn poincare_index(ring_degrees: [f64; 8]) -> f64 {
    let sum: f64 = (0..ring_degrees.len())
        .map(|i| {
            let current = ring_degrees[i].to_radians();
            let next = ring_degrees[(i + 1) % ring_degrees.len()].to_radians();
            wrap_beta((current - next).abs())
        })
        .sum();
    sum / PI
}

/// Wraps an orientation difference into (−π/2, π/2].
fn wrap_beta(change: f64) -> f64 {
    if change <= -FRAC_PI_2 {
        change + PI
    } else if change <= FRAC_PI_2 {
        change
    } else {
        change - PI
    }
}

pub fn mark_cores_and_deltas(index_map: &BlockGrid<f64>) -> SingularityMap {
    index_map.map(|_, index| {
        let index = *index;
        if (index > -1.0 && index < -0.5) || (index > 0.5 && index < 1.0) {
            SingularityKind::CoreOrDelta
        } else {
            SingularityKind::None
        }
    })
}

/// Keeps an interior foreground block singular only when at least `threshold`
/// blocks of its 3x3 neighborhood are candidates. Border and background blocks
/// keep their candidate value.
pub fn filter_by_density(candidates: &SingularityMap, background: &BackgroundMask, threshold: usize) -> SingularityMap {
    candidates.map(|p, kind| {
        if candidates.is_border(p) || background.is_background(p) {
            return *kind;
        }
        let singular_neighbors = candidates
            .neighborhood(p)
            .filter(|n| candidates[*n] == SingularityKind::CoreOrDelta)
            .count();
        if singular_neighbors >= threshold {
            SingularityKind::CoreOrDelta
        } else {
            SingularityKind::None
        }
    })
}

fn count_singular(map: &SingularityMap) -> usize {
    map.cells().iter().filter(|k| **k == SingularityKind::CoreOrDelta).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::block_grid::{Point, Segment};

    fn vortex_field(size: u32, center: f64) -> OrientationField {
        let angles = BlockGrid::from_fn(size, size, |p| {
            let (dx, dy) = (p.x as f64 - center, p.y as f64 - center);
            crate::core_modules::orientation::normalize_angle(0.5 * dy.atan2(dx).to_degrees())
        });
        OrientationField::from_angles(angles, 8).unwrap()
    }

    #[test]
    fn uniform_ring_has_zero_index() {
        assert_eq!(poincare_index([42.0; 8]), 0.0);
    }

    #[test]
    fn half_turn_with_one_fold_lands_in_core_band() {
        let index = poincare_index([0.0, 30.0, 60.0, 90.0, 120.0, 150.0, 0.0, 0.0]);
        assert!((index - 2.0 / 3.0).abs() < 1e-9);
        let map = mark_cores_and_deltas(&BlockGrid::filled(1, 1, index));
        assert_eq!(map[Point::new(0, 0)], SingularityKind::CoreOrDelta);
    }

    #[test]
    fn band_edges_are_excluded() {
        let map = mark_cores_and_deltas(&BlockGrid::from_vec(4, 1, vec![0.5, 1.0, -0.5, -0.75]).unwrap());
        assert_eq!(
            map.cells(),
            &[
                SingularityKind::None,
                SingularityKind::None,
                SingularityKind::None,
                SingularityKind::CoreOrDelta
            ]
        );
    }

    #[test]
    fn density_filter_clears_lone_candidates_and_keeps_clusters() {
        let mask = BackgroundMask::filled(8, 8, Segment::Foreground);
        let mut candidates = SingularityMap::filled(8, 8, SingularityKind::None);
        candidates[Point::new(1, 1)] = SingularityKind::CoreOrDelta;
        for p in [Point::new(4, 4), Point::new(5, 4), Point::new(4, 5), Point::new(5, 5)] {
            candidates[p] = SingularityKind::CoreOrDelta;
        }

        let filtered = filter_by_density(&candidates, &mask, DEFAULT_NEIGHBOR_THRESHOLD);
        assert_eq!(filtered[Point::new(1, 1)], SingularityKind::None);
        for p in [Point::new(4, 4), Point::new(5, 4), Point::new(4, 5), Point::new(5, 5)] {
            assert_eq!(filtered[p], SingularityKind::CoreOrDelta);
        }
        // Sees only two of the four.
        assert_eq!(filtered[Point::new(3, 4)], SingularityKind::None);
        assert_eq!(count_singular(&filtered), 4);
    }

    #[test]
    fn blocks_touching_background_get_no_index() {
        let field = vortex_field(6, 2.5);
        let mut mask = BackgroundMask::filled(6, 6, Segment::Foreground);
        mask[Point::new(1, 1)] = Segment::Background;

        let index_map = SingularityTagger::default().poincare_map(&field, &mask).unwrap();
        assert_eq!(index_map[Point::new(2, 2)], 0.0);
        assert_eq!(index_map[Point::new(0, 3)], 0.0);
    }

    #[test]
    fn detection_is_repeatable() {
        let field = vortex_field(9, 4.5);
        let mask = BackgroundMask::filled(9, 9, Segment::Foreground);
        let tagger = SingularityTagger::default();
        assert_eq!(tagger.detect(&field, &mask).unwrap(), tagger.detect(&field, &mask).unwrap());
    }

    #[test]
    fn only_areas_with_singular_blocks_are_tagged() {
        let mut map = SingularityMap::filled(5, 5, SingularityKind::None);
        map[Point::new(3, 3)] = SingularityKind::CoreOrDelta;
        let mut areas = vec![
            DamageArea::new(1, vec![Point::new(0, 0), Point::new(1, 0)]),
            DamageArea::new(2, vec![Point::new(3, 2), Point::new(3, 3)]),
        ];

        let tagged = SingularityTagger::default().tag_areas(&mut areas, &map);
        assert_eq!(tagged, 1);
        assert_eq!(areas[0].tag, AreaTag::Damaged);
        assert_eq!(areas[1].tag, AreaTag::Singularity);
    }
}
