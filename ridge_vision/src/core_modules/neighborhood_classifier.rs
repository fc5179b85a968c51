// THEORY:
// The `NeighborhoodClassifier` turns the per-block damage categories into a
// spatially denoised classification. A single damaged block in the middle of
// clean ridges is far more likely to be a scoring artifact than real damage,
// so every foreground block is judged by the density of damage in its 3x3
// neighborhood (itself included) instead of by its own category:
//
//     index = damaged_count + 0.6 * low_damage_count
//
// Dense clusters become `InnerBlock`s (the core of a damaged region), their
// fringe becomes `BorderBlock`s, and everything else is `Ordinary`. Like the
// blob detector it replaces, it is a stateless utility over a single grid.

use crate::core_modules::block_grid::{BackgroundMask, BlockGrid};
use crate::core_modules::quality_categorizer::{CategoryGrid, DamageCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Classification {
    #[default]
    Ordinary,
    /// On the fringe of a damaged region.
    BorderBlock,
    /// Inside a densely damaged region.
    InnerBlock,
}

pub type ClassificationMap = BlockGrid<Classification>;

pub mod neighborhood_classifier {
    use super::*;

    const LOW_DAMAGE_WEIGHT: f64 = 0.6;
    const BORDER_INDEX: f64 = 4.0;
    const INNER_INDEX: f64 = 7.0;

    /// Classifies every foreground block by the damage density around it.
    pub fn classify(categories: &CategoryGrid, background: &BackgroundMask) -> ClassificationMap {
        let mut classification = ClassificationMap::filled(categories.cols(), categories.rows(), Classification::Ordinary);

        for p in categories.points() {
            if background.is_background(p) {
                continue;
            }

            let mut damaged = 0usize;
            let mut low_damaged = 0usize;
            for n in categories.neighborhood(p) {
                match categories[n] {
                    Some(DamageCategory::Damaged) => damaged += 1,
                    Some(DamageCategory::LowDamage) => low_damaged += 1,
                    _ => {}
                }
            }

            classification[p] = classify_index(damage_index(damaged, low_damaged));
        }

        classification
    }

    pub fn damage_index(damaged: usize, low_damaged: usize) -> f64 {
        damaged as f64 + LOW_DAMAGE_WEIGHT * low_damaged as f64
    }

    pub fn classify_index(index: f64) -> Classification {
        if index > INNER_INDEX {
            Classification::InnerBlock
        } else if index > BORDER_INDEX {
            Classification::BorderBlock
        } else {
            Classification::Ordinary
        }
    }
}
