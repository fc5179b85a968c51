// THEORY:
// The `RegionExtractor` is the engine of damage segmentation. It turns the
// denoised classification map into a list of named `DamageArea`s. It is the
// grid-level counterpart of a blob detector, but with two severities instead of
// one, which makes it a three-phase algorithm over a single labeled grid:
//
// 1.  **Orphan pruning**: every 4-connected component of low-damage (border)
//     blocks is traversed once. If no heavily damaged block touches the
//     component anywhere, the whole component is erased. A fringe with no core
//     is noise, not damage.
// 2.  **Seeding**: every 8-connected component of heavily damaged (inner)
//     blocks becomes one area. Ids are handed out sequentially, in grid scan
//     order, starting at 1.
// 3.  **Growth**: areas absorb the surviving low-damage blocks ring by ring.
//     Each pass reads a frozen copy of the labels from the end of the previous
//     pass, so an area advances exactly one block per pass. Within a pass the
//     areas take turns: the first time the column-major scan meets a block of
//     area N, every block of area N from that column onwards annexes its
//     low-damage neighbors before the scan moves on. A low-damage block next to
//     two areas therefore goes to the area the scan reaches first, even when
//     the contested block sits closer to a block of the other area. Nothing
//     tries to pick the "closer" area. Output is deterministic for a fixed
//     input, but depends on scan order.
//
// All traversals use explicit stacks, never recursion, so very large grids
// cannot overflow the call stack. A growth pass that annexes nothing while
// blocks are still pending means pruning let an unreachable block through; that
// is an invariant violation and aborts the run.

use crate::core_modules::block_grid::{BackgroundMask, BlockGrid, Point};
use crate::core_modules::damage_area::DamageArea;
use crate::core_modules::neighborhood_classifier::{Classification, ClassificationMap};
use crate::error::{AnalysisError, Result};
use tracing::debug;

/// State of one block during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Label {
    #[default]
    Unassigned,
    /// Border block not yet owned by an area.
    LowDamage,
    /// Inner block not yet owned by an area.
    Damaged,
    /// Owned by the area with this id.
    Area(u32),
}

pub type LabeledGrid = BlockGrid<Label>;

/// Everything the extractor produced for one image.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub areas: Vec<DamageArea>,
    /// Final labels; every `Area(id)` block is listed in `areas[id - 1]`.
    pub labels: LabeledGrid,
    pub pruned_blocks: usize,
    pub growth_passes: usize,
}

pub mod region_extractor {
    use super::*;

    /// 3x3 neighborhood offsets, column-major, center included.
    const NEIGHBORHOOD: [(i32, i32); 9] = [
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, -1),
        (0, 0),
        (0, 1),
        (1, -1),
        (1, 0),
        (1, 1),
    ];

    /// Runs pruning, seeding and growth over a classification map.
    pub fn extract_areas(classification: &ClassificationMap, background: &BackgroundMask) -> Result<Extraction> {
        classification.ensure_shape("classification map", background.shape())?;

        let mut labels = label_classification(classification, background);
        let pruned_blocks = prune_orphans(&mut labels, background);
        let mut areas = seed_areas(&mut labels, background);
        let growth_passes = grow_areas(&mut labels, background, &mut areas)?;

        debug!(
            areas = areas.len(),
            pruned_blocks,
            growth_passes,
            "region extraction finished"
        );

        Ok(Extraction {
            areas,
            labels,
            pruned_blocks,
            growth_passes,
        })
    }

    /// Border blocks become `LowDamage`, inner blocks `Damaged`, the rest `Unassigned`.
    pub fn label_classification(classification: &ClassificationMap, background: &BackgroundMask) -> LabeledGrid {
        classification.map(|p, class| {
            if background.is_background(p) {
                return Label::Unassigned;
            }
            match class {
                Classification::BorderBlock => Label::LowDamage,
                Classification::InnerBlock => Label::Damaged,
                Classification::Ordinary => Label::Unassigned,
            }
        })
    }

    /// Erases every 4-connected low-damage component that no `Damaged` block
    /// touches. Returns the number of erased blocks.
    pub fn prune_orphans(labels: &mut LabeledGrid, background: &BackgroundMask) -> usize {
        let mut visited = BlockGrid::filled(labels.cols(), labels.rows(), false);
        let mut removed = 0;

        for seed in labels.points() {
            if background.is_background(seed) || visited[seed] || labels[seed] != Label::LowDamage {
                continue;
            }

            let mut component = Vec::new();
            let mut stack = vec![seed];
            let mut touches_damage = false;
            visited[seed] = true;

            while let Some(current) = stack.pop() {
                component.push(current);
                for n in labels.direct_neighbors(current) {
                    match labels[n] {
                        Label::LowDamage if !visited[n] => {
                            visited[n] = true;
                            stack.push(n);
                        }
                        Label::Damaged => touches_damage = true,
                        _ => {}
                    }
                }
            }

            if !touches_damage {
                removed += component.len();
                for p in component {
                    labels[p] = Label::Unassigned;
                }
            }
        }

        removed
    }

    /// Claims every 8-connected `Damaged` component as a new area.
    pub fn seed_areas(labels: &mut LabeledGrid, background: &BackgroundMask) -> Vec<DamageArea> {
        let mut areas = Vec::new();
        let mut next_id = 1u32;

        for seed in labels.points() {
            if background.is_background(seed) || labels[seed] != Label::Damaged {
                continue;
            }

            let mut points = Vec::new();
            let mut stack = vec![seed];
            labels[seed] = Label::Area(next_id);

            while let Some(current) = stack.pop() {
                points.push(current);
                for (dx, dy) in NEIGHBORHOOD {
                    let Some(n) = labels.offset(current, dx, dy) else {
                        continue;
                    };
                    if labels[n] == Label::Damaged {
                        labels[n] = Label::Area(next_id);
                        stack.push(n);
                    }
                }
            }

            areas.push(DamageArea::new(next_id, points));
            next_id += 1;
        }

        areas
    }

    /// Grows the seeded areas into the remaining `LowDamage` blocks until none
    /// are left. Returns the number of passes.
    pub fn grow_areas(
        labels: &mut LabeledGrid,
        background: &BackgroundMask,
        areas: &mut [DamageArea],
    ) -> Result<usize> {
        let mut remaining = count_low_damage(labels, background);
        let mut processed = BlockGrid::filled(labels.cols(), labels.rows(), false);
        let mut passes = 0;

        while remaining > 0 {
            passes += 1;
            let before = labels.clone();
            let mut annexed = 0;

            for p in before.points() {
                if background.is_background(p) || processed[p] {
                    continue;
                }
                let Label::Area(id) = before[p] else {
                    continue;
                };
                annexed += grow_one_area(id, p.x, &before, labels, background, &mut processed, areas);
            }

            if annexed == 0 {
                return Err(AnalysisError::GrowthStalled { remaining, pass: passes });
            }
            remaining -= annexed;
            debug!(pass = passes, annexed, remaining, "growth pass");
        }

        Ok(passes)
    }

    /// Lets every block of area `id` in columns `from_col..` annex its
    /// low-damage neighbors from the `before` snapshot. Blocks already taken in
    /// this pass are left to their owner. Returns the number of annexed blocks.
    fn grow_one_area(
        id: u32,
        from_col: u32,
        before: &LabeledGrid,
        labels: &mut LabeledGrid,
        background: &BackgroundMask,
        processed: &mut BlockGrid<bool>,
        areas: &mut [DamageArea],
    ) -> usize {
        let mut annexed = 0;

        for q in before.points().filter(|q| q.x >= from_col) {
            if background.is_background(q) || before[q] != Label::Area(id) {
                continue;
            }
            for (dx, dy) in NEIGHBORHOOD {
                let Some(n) = before.offset(q, dx, dy) else {
                    continue;
                };
                if background.is_background(n) {
                    continue;
                }
                if before[n] == Label::LowDamage && labels[n] == Label::LowDamage {
                    labels[n] = Label::Area(id);
                    areas[(id - 1) as usize].add_point(n);
                    annexed += 1;
                }
            }
            processed[q] = true;
        }

        annexed
    }

    pub fn count_low_damage(labels: &LabeledGrid, background: &BackgroundMask) -> usize {
        labels
            .points()
            .filter(|p| background.is_foreground(*p) && labels[*p] == Label::LowDamage)
            .count()
    }
}
