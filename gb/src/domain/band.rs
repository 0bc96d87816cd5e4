//! Row bands and the partitioner
//!
//! A band is a half-open row range `[start, end)` handed to one compute
//! endpoint for one turn. Bands are recomputed only when the worker set changes.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from partitioning a grid
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Cannot partition {height} rows across zero workers")]
    NoWorkers { height: usize },
}

/// Half-open row range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Band {
    pub start: usize,
    pub end: usize,
}

impl Band {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of rows in the band
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn rows(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Split `height` rows into `worker_count` ordered bands
///
/// Each band gets `height / worker_count` rows and the last band also absorbs
/// the remainder. When there are more workers than rows the leading bands are
/// empty.
pub fn partition(height: usize, worker_count: usize) -> Result<Vec<Band>, PartitionError> {
    debug!(height, worker_count, "partition: called");
    if worker_count == 0 {
        return Err(PartitionError::NoWorkers { height });
    }
    let base = height / worker_count;
    let remainder = height % worker_count;
    let bands = (0..worker_count)
        .map(|i| {
            let start = i * base;
            let mut end = (i + 1) * base;
            if i == worker_count - 1 {
                end += remainder;
            }
            Band::new(start, end)
        })
        .collect();
    Ok(bands)
}

/// The rows a band computation reads: one wrapped row above, the band's own
/// rows, one wrapped row below
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BandSliceRepr")]
pub struct BandSlice {
    pub band: Band,
    pub width: usize,
    /// Height of the whole world, not of the slice
    pub height: usize,
    pub rows: Vec<u8>,
}

#[derive(Deserialize)]
struct BandSliceRepr {
    band: Band,
    width: usize,
    height: usize,
    rows: Vec<u8>,
}

impl TryFrom<BandSliceRepr> for BandSlice {
    type Error = String;

    fn try_from(repr: BandSliceRepr) -> Result<Self, Self::Error> {
        if repr.band.start > repr.band.end || repr.band.end > repr.height {
            return Err(format!(
                "band [{}, {}) does not fit a world of height {}",
                repr.band.start, repr.band.end, repr.height
            ));
        }
        let expected = (repr.band.len() + 2) * repr.width;
        if repr.rows.len() != expected {
            return Err(format!("slice holds {} cells, expected {}", repr.rows.len(), expected));
        }
        Ok(BandSlice {
            band: repr.band,
            width: repr.width,
            height: repr.height,
            rows: repr.rows,
        })
    }
}

impl BandSlice {
    /// Byte at `x` of slice row `row`, where row 0 is the halo row above the band
    pub fn byte_at(&self, row: usize, x: usize) -> u8 {
        self.rows[row * self.width + x]
    }
}

/// Next-generation rows for one band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandOutput {
    pub band: Band,
    pub cells: Vec<u8>,
}

impl BandOutput {
    /// True when the output holds exactly the band's rows at `width`
    pub fn fits(&self, band: Band, width: usize) -> bool {
        self.band == band && self.cells.len() == band.len() * width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partition_even_split() {
        let bands = partition(16, 4).unwrap();
        assert_eq!(
            bands,
            vec![Band::new(0, 4), Band::new(4, 8), Band::new(8, 12), Band::new(12, 16)]
        );
    }

    #[test]
    fn test_partition_remainder_goes_to_last_band() {
        let bands = partition(10, 3).unwrap();
        assert_eq!(bands, vec![Band::new(0, 3), Band::new(3, 6), Band::new(6, 10)]);
    }

    #[test]
    fn test_partition_single_worker_covers_everything() {
        assert_eq!(partition(7, 1).unwrap(), vec![Band::new(0, 7)]);
    }

    #[test]
    fn test_partition_more_workers_than_rows() {
        let bands = partition(2, 4).unwrap();
        assert_eq!(bands.len(), 4);
        assert!(bands[..3].iter().all(Band::is_empty));
        assert_eq!(bands[3], Band::new(0, 2));
    }

    #[test]
    fn test_partition_zero_workers_fails_fast() {
        assert_eq!(partition(16, 0), Err(PartitionError::NoWorkers { height: 16 }));
    }

    #[test]
    fn test_band_output_fits() {
        let band = Band::new(2, 4);
        let output = BandOutput {
            band,
            cells: vec![0; 6],
        };
        assert!(output.fits(band, 3));
        assert!(!output.fits(band, 4));
        assert!(!output.fits(Band::new(2, 5), 3));
    }

    #[test]
    fn test_band_slice_rejects_wrong_row_count() {
        let json = r#"{"band":{"start":0,"end":2},"width":2,"height":4,"rows":[0,0,0]}"#;
        assert!(serde_json::from_str::<BandSlice>(json).is_err());
    }

    #[test]
    fn test_band_slice_rejects_band_past_height() {
        let json = r#"{"band":{"start":3,"end":5},"width":1,"height":4,"rows":[0,0,0,0]}"#;
        assert!(serde_json::from_str::<BandSlice>(json).is_err());
    }

    proptest! {
        #[test]
        fn prop_partition_is_ordered_disjoint_and_complete(height in 0usize..2048, workers in 1usize..64) {
            let bands = partition(height, workers).unwrap();
            prop_assert_eq!(bands.len(), workers);

            let mut next = 0;
            for band in &bands {
                prop_assert_eq!(band.start, next);
                prop_assert!(band.start <= band.end);
                next = band.end;
            }
            prop_assert_eq!(next, height);
            prop_assert_eq!(bands.iter().map(Band::len).sum::<usize>(), height);
        }
    }
}
