// THEORY:
// The quality categorizer is the first, and simplest, step of damage
// segmentation. Upstream estimators fuse several ridge features into one
// continuous quality score per block; this module quantizes that score into
// three damage levels. The cut points are fixed constants of the method, not
// learned from the image: moving them changes how many regions survive every
// later stage, so they are reproduced exactly and never configured.
//
// Background blocks are left uncategorized (`None`) so later stages can tell
// "clean ridge area" apart from "not part of the print at all".

use crate::core_modules::block_grid::{BackgroundMask, BlockGrid};
use crate::error::{AnalysisError, Result};

/// Scores below this are `Damaged`.
pub const DAMAGED_THRESHOLD: f64 = 0.44;
/// Scores below this (and not below `DAMAGED_THRESHOLD`) are `LowDamage`.
pub const LOW_DAMAGE_THRESHOLD: f64 = 0.62;

/// Per-block fused quality score in `[0, 1]`; `None` marks background.
pub type QualityMap = BlockGrid<Option<f64>>;

/// Per-block damage level; `None` for background blocks.
pub type CategoryGrid = BlockGrid<Option<DamageCategory>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageCategory {
    Ok,
    LowDamage,
    Damaged,
}

impl DamageCategory {
    /// Maps a quality score onto its damage level.
    pub fn from_score(score: f64) -> Self {
        if score < DAMAGED_THRESHOLD {
            DamageCategory::Damaged
        } else if score < LOW_DAMAGE_THRESHOLD {
            DamageCategory::LowDamage
        } else {
            DamageCategory::Ok
        }
    }
}

/// Categorizes every foreground block of `quality`.
///
/// Fails on shape mismatch, on a foreground block without a score and on
/// scores outside `[0, 1]`. Scores of background blocks are ignored.
pub fn categorize(quality: &QualityMap, background: &BackgroundMask) -> Result<CategoryGrid> {
    quality.ensure_shape("quality map", background.shape())?;

    let mut categories = CategoryGrid::filled(quality.cols(), quality.rows(), None);
    for p in quality.points() {
        if background.is_background(p) {
            continue;
        }
        let score = quality[p].ok_or(AnalysisError::MissingQuality { x: p.x, y: p.y })?;
        if !(0.0..=1.0).contains(&score) {
            return Err(AnalysisError::ValueOutOfRange {
                what: "quality",
                x: p.x,
                y: p.y,
                value: score,
            });
        }
        categories[p] = Some(DamageCategory::from_score(score));
    }
    Ok(categories)
}
