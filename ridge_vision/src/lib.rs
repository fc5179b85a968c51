// THEORY:
// This file is the main entry point for the `ridge_vision` library crate.
// The engine takes one ridge-pattern image, already cut into a block grid by
// its collaborators (background mask, fused quality scores, base orientation
// field), finds the damaged regions of the print and re-estimates their ridge
// orientations at a resolution matched to each region's size.
//
// The public surface is the `pipeline` module (`DamageAnalyzer`,
// `AnalysisConfig`, `DamageReport`) for one image and `batch_pipeline` for many
// images at once. The individual stages live in `core_modules` and stay public
// so they can be tested and reused in isolation.

pub mod batch_pipeline;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use error::{AnalysisError, Result};
