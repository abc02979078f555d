//! Morton (Z-order) curve.
//!
//! Bits are interleaved from the most significant level down; within a level
//! dimensions contribute in order, and a dimension drops out once its bits
//! are exhausted. Decomposition does not subdivide: a query box maps to the
//! single range between the ids of its corners.

use super::{IndexRange, SfcDimension};

#[derive(Debug, Clone, PartialEq)]
pub struct ZOrderSfc {
    dimensions: Vec<SfcDimension>,
    max_bits: u32,
}

impl ZOrderSfc {
    pub(super) fn from_validated(dimensions: Vec<SfcDimension>) -> Self {
        let max_bits = dimensions
            .iter()
            .map(SfcDimension::bits)
            .max()
            .unwrap_or(0);
        Self {
            dimensions,
            max_bits,
        }
    }

    pub fn dimensions(&self) -> &[SfcDimension] {
        &self.dimensions
    }

    pub(super) fn index_of_cells(&self, cells: &[u64]) -> u128 {
        let mut index = 0u128;
        for level in (0..self.max_bits).rev() {
            for (dim, &cell) in self.dimensions.iter().zip(cells) {
                if dim.bits() > level {
                    index = (index << 1) | ((cell >> level) & 1) as u128;
                }
            }
        }
        index
    }

    pub(super) fn cells_of_index(&self, index: u128) -> Vec<u64> {
        let total: u32 = self.dimensions.iter().map(SfcDimension::bits).sum();
        let mut cells = vec![0u64; self.dimensions.len()];
        let mut position = total;
        for level in (0..self.max_bits).rev() {
            for (dim, cell) in self.dimensions.iter().zip(cells.iter_mut()) {
                if dim.bits() > level {
                    position -= 1;
                    *cell |= (((index >> position) & 1) as u64) << level;
                }
            }
        }
        cells
    }

    pub(super) fn decompose(&self, query: &[(u64, u64)]) -> Vec<IndexRange> {
        let mins: Vec<u64> = query.iter().map(|(min, _)| *min).collect();
        let maxes: Vec<u64> = query.iter().map(|(_, max)| *max).collect();
        vec![IndexRange::new(
            self.index_of_cells(&mins),
            self.index_of_cells(&maxes),
        )]
    }
}
