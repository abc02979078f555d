use super::{BinRange, BinRanges, DimensionDefinition, MAX_BINS};
use crate::error::{IndexError, Result};
use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;
use strata_types::numeric::{MultiDimensionalNumericData, NumericRange};

/// Input data restricted to one combination of per-dimension bins.
///
/// Ranges are bin-local. The bin id is the concatenation of each dimension's
/// bin id in dimension order (unbinned dimensions contribute nothing).
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedNumericDataset {
    bin_id: Bytes,
    data: MultiDimensionalNumericData,
    full_extent: SmallVec<[bool; 4]>,
}

impl BinnedNumericDataset {
    /// Split `data` into the Cartesian product of each dimension's bin ranges.
    ///
    /// A longitude range crossing the antimeridian produces two datasets with
    /// the same (empty) bin id.
    pub fn apply_bins(
        data: &MultiDimensionalNumericData,
        dimensions: &[DimensionDefinition],
    ) -> Result<Vec<Self>> {
        let per_dimension = Self::bin_ranges_per_dimension(data, dimensions)?;
        if per_dimension.is_empty() || per_dimension.iter().any(|r| r.is_empty()) {
            return Ok(Vec::new());
        }

        let total = per_dimension
            .iter()
            .map(|r| r.len() as u128)
            .fold(1u128, u128::saturating_mul);
        if total > MAX_BINS as u128 {
            return Err(IndexError::TooManyBins {
                count: total,
                limit: MAX_BINS as u128,
            });
        }
        let total = total as usize;
        let mut datasets = Vec::with_capacity(total);
        let mut cursor = vec![0usize; per_dimension.len()];
        loop {
            let mut bin_id = BytesMut::new();
            let mut ranges = Vec::with_capacity(cursor.len());
            let mut full_extent = SmallVec::with_capacity(cursor.len());
            for (ranges_of_dim, &i) in per_dimension.iter().zip(&cursor) {
                let range: &BinRange = &ranges_of_dim[i];
                bin_id.extend_from_slice(&range.bin_id);
                ranges.push(range.as_range());
                full_extent.push(range.full_extent);
            }
            datasets.push(Self {
                bin_id: bin_id.freeze(),
                data: MultiDimensionalNumericData::new(ranges),
                full_extent,
            });

            // odometer over the per-dimension choices, last dimension fastest
            let mut dim = cursor.len();
            loop {
                if dim == 0 {
                    return Ok(datasets);
                }
                dim -= 1;
                cursor[dim] += 1;
                if cursor[dim] < per_dimension[dim].len() {
                    break;
                }
                cursor[dim] = 0;
            }
        }
    }

    /// Normalized ranges of each dimension, before combination.
    pub fn bin_ranges_per_dimension(
        data: &MultiDimensionalNumericData,
        dimensions: &[DimensionDefinition],
    ) -> Result<Vec<BinRanges>> {
        if data.dimension_count() != dimensions.len() {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions.len(),
                actual: data.dimension_count(),
            });
        }
        dimensions
            .iter()
            .zip(data.ranges())
            .map(|(dimension, range)| dimension.normalized_ranges(range))
            .collect()
    }

    pub fn bin_id(&self) -> &Bytes {
        &self.bin_id
    }

    pub fn data(&self) -> &MultiDimensionalNumericData {
        &self.data
    }

    pub fn range(&self, dimension: usize) -> Option<&NumericRange> {
        self.data.get(dimension)
    }

    pub fn is_full_extent(&self, dimension: usize) -> bool {
        self.full_extent.get(dimension).copied().unwrap_or(false)
    }

    /// Whether every dimension covers its whole bin or domain.
    pub fn is_full_extent_all(&self) -> bool {
        !self.full_extent.is_empty() && self.full_extent.iter().all(|&f| f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{TemporalBinning, TemporalUnit};

    const HOUR: f64 = 3_600_000.0;

    fn spatial_temporal() -> Vec<DimensionDefinition> {
        vec![
            DimensionDefinition::longitude(),
            DimensionDefinition::latitude(),
            DimensionDefinition::time(TemporalBinning::from_unit(TemporalUnit::Hour)),
        ]
    }

    #[test]
    fn test_unbinned_data_yields_one_dataset() {
        let dims = &spatial_temporal()[..2];
        let data = MultiDimensionalNumericData::from_values(&[10.0, 20.0]);
        let binned = BinnedNumericDataset::apply_bins(&data, dims).unwrap();
        assert_eq!(binned.len(), 1);
        assert!(binned[0].bin_id().is_empty());
        assert_eq!(binned[0].data(), &data);
    }

    #[test]
    fn test_cartesian_product_of_bins() {
        let data = MultiDimensionalNumericData::new(vec![
            NumericRange::new(170.0, -170.0),
            NumericRange::new(0.0, 10.0),
            NumericRange::new(0.5 * HOUR, 1.5 * HOUR),
        ]);
        let binned = BinnedNumericDataset::apply_bins(&data, &spatial_temporal()).unwrap();
        assert_eq!(binned.len(), 4);
        assert!(binned.iter().all(|d| d.bin_id().len() == 4));
        assert_eq!(&binned[0].bin_id()[..], &0i32.to_be_bytes());
        assert_eq!(&binned[1].bin_id()[..], &1i32.to_be_bytes());
        assert_eq!(binned[0].range(0), Some(&NumericRange::new(-180.0, -170.0)));
        assert_eq!(binned[2].range(0), Some(&NumericRange::new(170.0, 180.0)));
    }

    #[test]
    fn test_full_extent_flags() {
        let data = MultiDimensionalNumericData::new(vec![
            NumericRange::new(-180.0, 180.0),
            NumericRange::new(-90.0, 90.0),
            NumericRange::new(0.0, 2.0 * HOUR),
        ]);
        let binned = BinnedNumericDataset::apply_bins(&data, &spatial_temporal()).unwrap();
        // [0, 2h] touches the closing boundary of bin -1 and the opening of bin 2
        assert_eq!(binned.len(), 4);
        assert!(binned[1].is_full_extent_all());
        assert!(binned[2].is_full_extent_all());
        assert!(!binned[0].is_full_extent(2));
        assert!(binned[0].is_full_extent(0));
    }

    #[test]
    fn test_dimension_mismatch() {
        let data = MultiDimensionalNumericData::from_values(&[1.0]);
        assert!(matches!(
            BinnedNumericDataset::apply_bins(&data, &spatial_temporal()),
            Err(IndexError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }
}
