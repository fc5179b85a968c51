// THEORY:
// Every failure inside the engine is a failed analysis of exactly one image.
// The engine is purely computational, so there is nothing to retry: an error
// either describes malformed collaborator input (shapes, ranges, block size),
// a broken internal invariant (growth that cannot make progress), or an
// ambient failure at the edges (image I/O, config parsing, a batch worker
// that died). Callers get the whole taxonomy as one enum and decide for
// themselves whether to skip the image or abort the batch.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Everything that can abort the analysis of a single image.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Two grids that must share the block grid shape do not.
    #[error("{what} has shape {actual:?} (cols, rows), expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A per-block value is outside its documented range.
    #[error("{what} value {value} at block ({x}, {y}) is out of range")]
    ValueOutOfRange {
        what: &'static str,
        x: u32,
        y: u32,
        value: f64,
    },

    /// A foreground block has no quality score.
    #[error("foreground block ({x}, {y}) has no quality score")]
    MissingQuality { x: u32, y: u32 },

    #[error("invalid block size {0}")]
    InvalidBlockSize(u32),

    /// The orientation field was estimated at a different block size than the input uses.
    #[error("orientation field has block size {field}, input uses {input}")]
    BlockSizeMismatch { field: u32, input: u32 },

    /// The pixel buffer does not cover the block grid.
    #[error("image {width}x{height} is smaller than the {cols}x{rows} block grid at block size {block_size}")]
    ImageTooSmall {
        width: u32,
        height: u32,
        cols: u32,
        rows: u32,
        block_size: u32,
    },

    /// A growth pass annexed nothing while low-damage blocks were still pending.
    #[error("region growth stalled in pass {pass} with {remaining} low-damage blocks unreachable")]
    GrowthStalled { remaining: usize, pass: usize },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// A batch worker failed before producing a result.
    #[error("worker error: {0}")]
    Worker(String),
}
