// THEORY:
// The `pipeline` module is the top-level API of the damage engine. It chains
// the stages into one call per image:
//
//   quality -> categories -> classification -> damage areas
//           -> singularity tags -> field bank -> corrected orientation field
//
// The `DamageAnalyzer` holds only configuration. Every intermediate grid, the
// area list and the field bank are created inside `analyze` and either dropped
// or moved into the returned `DamageReport`, so two runs never share state and
// the same analyzer can serve many images from many threads.
//
// Inputs are validated before any stage runs: every block grid must share the
// background mask's shape, the orientation field must be in range and use the
// run's block size, and the pixel buffer must cover the whole block grid
// (the field bank re-estimates orientations from it).

use crate::core_modules::block_grid::BackgroundMask;
use crate::core_modules::damage_area::DamageArea;
use crate::core_modules::field_bank::{BankEntrySummary, DEFAULT_BUCKET_WIDTH, FieldBank, FieldSource};
use crate::core_modules::field_corrector::{CorrectionSummary, field_corrector};
use crate::core_modules::neighborhood_classifier::neighborhood_classifier;
use crate::core_modules::orientation::{OrientationEstimator, OrientationField, SmoothingParams, smooth_field};
use crate::core_modules::quality_categorizer::{self, QualityMap};
use crate::core_modules::region_extractor::{LabeledGrid, region_extractor};
use crate::core_modules::singularity_tagger::{DEFAULT_NEIGHBOR_THRESHOLD, SingularityMap, SingularityTagger};
use crate::error::{AnalysisError, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

// Re-export key data structures for the public API.
pub use crate::core_modules::block_grid::{BlockGrid, Point, Segment};
pub use crate::core_modules::damage_area::AreaTag;
pub use crate::core_modules::region_extractor::Label;
pub use crate::core_modules::singularity_tagger::SingularityKind;

/// Tunable parameters of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Width of a field bank size bucket, in blocks.
    pub bucket_width: u32,
    /// Candidates a 3x3 neighborhood needs to keep a singular block.
    pub singularity_neighbor_threshold: usize,
    /// Gaussian sigma of vector smoothing, in pixels.
    pub smoothing_sigma: f64,
    /// Kernel side of base field smoothing, as a multiple of the block size.
    pub base_kernel_factor: u32,
    /// Kernel side of bank field smoothing, as a multiple of the custom block size.
    pub bank_kernel_factor: u32,
    /// Re-smooth the whole field after damaged areas were rewritten.
    pub resmooth_corrected_field: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bucket_width: DEFAULT_BUCKET_WIDTH,
            singularity_neighbor_threshold: DEFAULT_NEIGHBOR_THRESHOLD,
            smoothing_sigma: 20.0,
            base_kernel_factor: 5,
            bank_kernel_factor: 2,
            resmooth_corrected_field: true,
        }
    }
}

impl AnalysisConfig {
    /// Reads a JSON config; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| AnalysisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_width == 0 {
            return Err(AnalysisError::Config("bucket_width must be at least 1".to_string()));
        }
        if !(1..=9).contains(&self.singularity_neighbor_threshold) {
            return Err(AnalysisError::Config(format!(
                "singularity_neighbor_threshold must be within 1..=9, got {}",
                self.singularity_neighbor_threshold
            )));
        }
        if !(self.smoothing_sigma.is_finite() && self.smoothing_sigma > 0.0) {
            return Err(AnalysisError::Config(format!(
                "smoothing_sigma must be positive, got {}",
                self.smoothing_sigma
            )));
        }
        if self.base_kernel_factor == 0 || self.bank_kernel_factor == 0 {
            return Err(AnalysisError::Config("kernel factors must be at least 1".to_string()));
        }
        Ok(())
    }

    fn base_smoothing(&self) -> SmoothingParams {
        SmoothingParams {
            sigma: self.smoothing_sigma,
            kernel_factor: self.base_kernel_factor,
        }
    }

    fn bank_smoothing(&self) -> SmoothingParams {
        SmoothingParams {
            sigma: self.smoothing_sigma,
            kernel_factor: self.bank_kernel_factor,
        }
    }
}

/// Everything the collaborators supply for one image.
#[derive(Debug, Clone)]
pub struct DamageAnalysisInput {
    pub image: GrayImage,
    pub block_size: u32,
    pub background: BackgroundMask,
    pub quality: QualityMap,
    /// Base orientation field at `block_size`, same shape as `background`.
    pub orientation: OrientationField,
}

/// The result of analyzing one image.
#[derive(Debug, Clone)]
pub struct DamageReport {
    pub corrected_field: OrientationField,
    /// In id order; `areas[i].id == i + 1`.
    pub areas: Vec<DamageArea>,
    pub singularities: SingularityMap,
    pub labels: LabeledGrid,
    pub bank: Vec<BankEntrySummary>,
    pub correction: CorrectionSummary,
    pub pruned_blocks: usize,
    pub growth_passes: usize,
}

impl DamageReport {
    pub fn singularity_area_count(&self) -> usize {
        self.areas.iter().filter(|a| a.is_singularity()).count()
    }
}

/// Runs the damage segmentation and field correction stages.
#[derive(Debug, Clone, Default)]
pub struct DamageAnalyzer {
    config: AnalysisConfig,
}

impl DamageAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyzes one image, re-estimating custom fields from its pixels.
    pub fn analyze(&self, input: &DamageAnalysisInput) -> Result<DamageReport> {
        validate_input(input)?;
        let estimator = OrientationEstimator::new(&input.image, self.config.bank_smoothing());
        self.run(input, &estimator)
    }

    /// Like `analyze`, with custom fields taken from `source`.
    pub fn analyze_with_source<S: FieldSource + ?Sized>(
        &self,
        input: &DamageAnalysisInput,
        source: &S,
    ) -> Result<DamageReport> {
        validate_input(input)?;
        self.run(input, source)
    }

    /// The analysis proper, on input that already passed `validate_input`.
    fn run<S: FieldSource + ?Sized>(&self, input: &DamageAnalysisInput, source: &S) -> Result<DamageReport> {
        let background = &input.background;

        let categories = quality_categorizer::categorize(&input.quality, background)?;
        let classification = neighborhood_classifier::classify(&categories, background);
        let extraction = region_extractor::extract_areas(&classification, background)?;
        let mut areas = extraction.areas;

        let tagger = SingularityTagger::new(self.config.singularity_neighbor_threshold);
        let singularities = tagger.detect(&input.orientation, background)?;
        let tagged = tagger.tag_areas(&mut areas, &singularities);
        debug!(areas = areas.len(), singularity_areas = tagged, "areas tagged");

        let bank = FieldBank::build(source, &areas, input.block_size, self.config.bucket_width)?;
        let mut corrected_field = input.orientation.clone();
        let correction = field_corrector::correct_areas(&mut corrected_field, &areas, &bank)?;

        if self.config.resmooth_corrected_field && correction.corrected_blocks > 0 {
            let (cols, rows) = corrected_field.shape();
            corrected_field = smooth_field(
                &corrected_field,
                cols * input.block_size,
                rows * input.block_size,
                self.config.base_smoothing(),
            );
        }

        info!(
            areas = areas.len(),
            singularity_areas = tagged,
            bank_entries = bank.entries().len(),
            corrected_blocks = correction.corrected_blocks,
            "damage analysis complete"
        );

        Ok(DamageReport {
            corrected_field,
            areas,
            singularities,
            labels: extraction.labels,
            bank: bank.summaries(),
            correction,
            pruned_blocks: extraction.pruned_blocks,
            growth_passes: extraction.growth_passes,
        })
    }
}

/// Smoothed base orientation field over the whole blocks of `image`, for
/// callers without an upstream orientation estimator.
pub fn estimate_base_field(image: &GrayImage, block_size: u32, config: &AnalysisConfig) -> Result<OrientationField> {
    OrientationEstimator::new(image, config.base_smoothing()).estimate_base(block_size)
}

/// `(cols, rows)` of the whole-block grid of a `width x height` image.
pub fn block_grid_shape(width: u32, height: u32, block_size: u32) -> Result<(u32, u32)> {
    if block_size == 0 {
        return Err(AnalysisError::InvalidBlockSize(block_size));
    }
    Ok((width / block_size, height / block_size))
}

fn validate_input(input: &DamageAnalysisInput) -> Result<()> {
    if input.block_size == 0 {
        return Err(AnalysisError::InvalidBlockSize(input.block_size));
    }
    let shape = input.background.shape();
    input.quality.ensure_shape("quality map", shape)?;
    input.orientation.angles().ensure_shape("orientation field", shape)?;
    if input.orientation.block_size() != input.block_size {
        return Err(AnalysisError::BlockSizeMismatch {
            field: input.orientation.block_size(),
            input: input.block_size,
        });
    }
    input.orientation.validate()?;

    let (cols, rows) = shape;
    let (width, height) = input.image.dimensions();
    if width < cols * input.block_size || height < rows * input.block_size {
        return Err(AnalysisError::ImageTooSmall {
            width,
            height,
            cols,
            rows,
            block_size: input.block_size,
        });
    }
    Ok(())
}
