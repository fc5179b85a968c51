// THEORY:
// The `FieldBank` answers one question for the field corrector: "at which
// resolution should the orientations of this damaged area be re-estimated?"
// A small scratch is best bridged by a field only slightly coarser than the
// base one; a large smudge needs blocks big enough to see intact ridges on the
// far side of it.
//
// Key principles:
// 1.  **Size buckets**: an area's minor dimension (min of bounding box width and
//     height, in blocks) selects a bucket `[begin, begin + width - 1]`. Buckets
//     start at 1 and tile the positive integers. A minor dimension of 0 (a line
//     or a single block) has no bucket.
// 2.  **Custom block size**: `base * (begin + 1) / 2`, forced odd, so every
//     bucket has exactly one custom resolution.
// 3.  **Lazy, per-run cache**: a bucket's field is estimated the first time an
//     area needs it and reused by every later area in that bucket. The bank is
//     built for one image and dropped with the report; nothing is shared across
//     images.
// 4.  **Pluggable source**: the bank asks a `FieldSource` for whole-image fields
//     at a given block size. The real source is the `OrientationEstimator`;
//     tests substitute a counting fake.
//
// Singularity areas and areas without a bucket are never corrected, so they
// get no bank entry.

use crate::core_modules::damage_area::DamageArea;
use crate::core_modules::orientation::{OrientationEstimator, OrientationField};
use crate::error::{AnalysisError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Default width of a size bucket, in blocks.
pub const DEFAULT_BUCKET_WIDTH: u32 = 2;

/// A closed range of minor dimensions sharing one custom field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct SizeBucket {
    pub range_begin: u32,
    pub range_end: u32,
}

impl SizeBucket {
    /// Bucket holding `minor_dimension`, `None` for 0. `width` must be at least 1.
    pub fn for_dimension(minor_dimension: u32, width: u32) -> Option<Self> {
        if minor_dimension == 0 {
            return None;
        }
        let range_begin = ((minor_dimension - 1) / width) * width + 1;
        Some(Self {
            range_begin,
            range_end: range_begin + width - 1,
        })
    }

    pub fn contains(&self, minor_dimension: u32) -> bool {
        (self.range_begin..=self.range_end).contains(&minor_dimension)
    }

    /// Block side used to re-estimate areas of this bucket.
    pub fn custom_block_size(&self, base_block_size: u32) -> u32 {
        let size = base_block_size * (self.range_begin + 1) / 2;
        if size % 2 == 0 { size + 1 } else { size }
    }
}

/// Anything that can produce a whole-image orientation field at a block size.
pub trait FieldSource {
    fn estimate_field(&self, block_size: u32) -> Result<OrientationField>;
}

impl FieldSource for OrientationEstimator {
    fn estimate_field(&self, block_size: u32) -> Result<OrientationField> {
        self.estimate_covering(block_size)
    }
}

/// One cached custom-resolution field.
#[derive(Debug, Clone)]
pub struct FieldBankEntry {
    pub bucket: SizeBucket,
    pub block_size: u32,
    pub field: OrientationField,
}

/// Compact description of a bank entry for reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BankEntrySummary {
    pub bucket: SizeBucket,
    pub block_size: u32,
    pub area_count: usize,
}

/// `mapping[area_index]` is the entry index serving that area, `None` for
/// singularity areas and areas of minor dimension 0.
pub type AreaFieldMapping = Vec<Option<usize>>;

#[derive(Debug, Clone)]
pub struct FieldBank {
    base_block_size: u32,
    bucket_width: u32,
    entries: Vec<FieldBankEntry>,
    by_bucket: HashMap<SizeBucket, usize>,
    mapping: AreaFieldMapping,
}

impl FieldBank {
    pub fn new(base_block_size: u32, bucket_width: u32) -> Result<Self> {
        if base_block_size == 0 {
            return Err(AnalysisError::InvalidBlockSize(base_block_size));
        }
        if bucket_width == 0 {
            return Err(AnalysisError::Config("bucket_width must be at least 1".to_string()));
        }
        Ok(Self {
            base_block_size,
            bucket_width,
            entries: Vec::new(),
            by_bucket: HashMap::new(),
            mapping: Vec::new(),
        })
    }

    /// Builds the bank for `areas`, estimating each needed bucket once.
    pub fn build<S: FieldSource + ?Sized>(
        source: &S,
        areas: &[DamageArea],
        base_block_size: u32,
        bucket_width: u32,
    ) -> Result<Self> {
        let mut bank = Self::new(base_block_size, bucket_width)?;
        for area in areas {
            let bucket = SizeBucket::for_dimension(area.minor_dimension(), bank.bucket_width);
            let entry = match bucket {
                Some(bucket) if !area.is_singularity() => Some(bank.entry_index_for(source, bucket)?),
                _ => None,
            };
            bank.mapping.push(entry);
        }

        debug!(
            entries = bank.entries.len(),
            areas = areas.len(),
            "field bank built"
        );
        Ok(bank)
    }

    /// Index of the entry for `bucket`, estimating it on first use.
    fn entry_index_for<S: FieldSource + ?Sized>(&mut self, source: &S, bucket: SizeBucket) -> Result<usize> {
        if let Some(&index) = self.by_bucket.get(&bucket) {
            return Ok(index);
        }

        let block_size = bucket.custom_block_size(self.base_block_size);
        let field = source.estimate_field(block_size)?;
        debug!(
            range_begin = bucket.range_begin,
            range_end = bucket.range_end,
            block_size,
            "estimated custom field"
        );

        self.entries.push(FieldBankEntry {
            bucket,
            block_size,
            field,
        });
        let index = self.entries.len() - 1;
        self.by_bucket.insert(bucket, index);
        Ok(index)
    }

    pub fn base_block_size(&self) -> u32 {
        self.base_block_size
    }

    pub fn entries(&self) -> &[FieldBankEntry] {
        &self.entries
    }

    pub fn mapping(&self) -> &AreaFieldMapping {
        &self.mapping
    }

    /// Entry serving the area at `area_index` of the list the bank was built from.
    pub fn entry_for_area(&self, area_index: usize) -> Option<&FieldBankEntry> {
        let entry_index = (*self.mapping.get(area_index)?)?;
        self.entries.get(entry_index)
    }

    pub fn summaries(&self) -> Vec<BankEntrySummary> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| BankEntrySummary {
                bucket: entry.bucket,
                block_size: entry.block_size,
                area_count: self.mapping.iter().filter(|m| **m == Some(index)).count(),
            })
            .collect()
    }
}
