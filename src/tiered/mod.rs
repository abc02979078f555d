//! Multi-precision index strategy.
//!
//! A [`TieredIndexStrategy`] owns one space-filling curve per tier, coarsest
//! first. Small entries are written once into a fine tier; large entries go
//! to the finest tier where they still fit within the duplication budget, so
//! no entry explodes into thousands of rows. Queries scan every tier.

mod factory;
mod metadata;
mod partition;

pub use factory::Tiering;
pub use metadata::TierMetadata;
pub use partition::KeyPartitioning;

use crate::dimension::{BinRange, BinnedNumericDataset, DimensionDefinition};
use crate::error::{DecodeError, IndexError, Result};
use crate::keys::{
    InsertionIds, PartitionGrouper, QueryRanges, SinglePartitionInsertionIds,
    SinglePartitionQueryRanges, split_composite_key,
};
use crate::persist::{self, Persistable};
use crate::sfc::{SfcDimension, SfcType, SpaceFillingCurve, index_to_id, low_mask};
use bytes::{BufMut, Bytes, BytesMut};
use strata_types::coordinate::{Coordinate, MultiDimensionalCoordinates};
use strata_types::numeric::{MultiDimensionalNumericData, NumericRange};
use strata_types::range::ByteRange;

/// Default per-dimension duplication allowed before an entry moves to a
/// coarser tier.
pub const DEFAULT_MAX_DUPLICATES_PER_DIMENSION: u64 = 2;

/// Hard cap on the rows one entry may be written under.
pub const MAX_INSERTION_IDS: u128 = 1 << 16;

/// One precision level.
#[derive(Debug, Clone, PartialEq)]
pub struct Tier {
    id: u8,
    curve: SpaceFillingCurve,
}

impl Tier {
    pub fn new(id: u8, curve: SpaceFillingCurve) -> Self {
        Self { id, curve }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn curve(&self) -> &SpaceFillingCurve {
        &self.curve
    }

    /// Sort key range covering the whole tier.
    fn full_range(&self) -> ByteRange {
        let width = self.curve.id_len();
        ByteRange::new(
            index_to_id(0, width),
            index_to_id(low_mask(self.curve.total_bits()), width),
        )
    }
}

impl Persistable for Tier {
    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.id);
        persist::put_nested(buf, &self.curve);
    }

    fn read_from(buf: &mut &[u8]) -> std::result::Result<Self, DecodeError> {
        Ok(Self {
            id: persist::get_u8(buf, "tier id")?,
            curve: persist::get_nested(buf, "tier curve")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TieredIndexStrategy {
    dimensions: Vec<DimensionDefinition>,
    tiers: Vec<Tier>,
    max_duplicates_per_dimension: u64,
    partitioning: KeyPartitioning,
    // derived at construction
    duplicate_budget: u128,
    bin_id_len: usize,
}

impl TieredIndexStrategy {
    /// Assemble a strategy from prepared tiers, coarsest first.
    pub fn new(
        dimensions: Vec<DimensionDefinition>,
        tiers: Vec<Tier>,
        max_duplicates_per_dimension: u64,
        partitioning: KeyPartitioning,
    ) -> Result<Self> {
        if tiers.is_empty() {
            return Err(IndexError::InvalidConfig("no tiers configured".into()));
        }
        for (i, tier) in tiers.iter().enumerate() {
            let curve_dims: Vec<&DimensionDefinition> = tier
                .curve
                .dimensions()
                .iter()
                .map(SfcDimension::definition)
                .collect();
            if curve_dims.len() != dimensions.len()
                || curve_dims.iter().zip(&dimensions).any(|(a, b)| *a != b)
            {
                return Err(IndexError::InvalidConfig(format!(
                    "tier {} does not index the strategy's dimensions",
                    tier.id
                )));
            }
            if tiers[..i].iter().any(|other| other.id == tier.id) {
                return Err(IndexError::InvalidConfig(format!(
                    "duplicate tier id {}",
                    tier.id
                )));
            }
        }
        partitioning.validate().map_err(IndexError::InvalidConfig)?;

        let duplicate_budget = (max_duplicates_per_dimension.max(1) as u128)
            .checked_pow(dimensions.len() as u32)
            .unwrap_or(u128::MAX);
        let bin_id_len = dimensions
            .iter()
            .map(DimensionDefinition::fixed_bin_id_size)
            .sum();
        Ok(Self {
            dimensions,
            tiers,
            max_duplicates_per_dimension,
            partitioning,
            duplicate_budget,
            bin_id_len,
        })
    }

    /// Build every tier of `tiering` over `dimensions`.
    pub fn from_tiering(
        sfc_type: SfcType,
        dimensions: Vec<DimensionDefinition>,
        tiering: &Tiering,
        max_duplicates_per_dimension: u64,
        partitioning: KeyPartitioning,
    ) -> Result<Self> {
        let tiers = tiering
            .tier_bits(dimensions.len())?
            .into_iter()
            .map(|bits| {
                let id = factory::tier_id_of(&bits);
                let sfc_dims = dimensions
                    .iter()
                    .cloned()
                    .zip(bits)
                    .map(|(definition, bits)| SfcDimension::new(definition, bits))
                    .collect();
                Ok(Tier::new(id, SpaceFillingCurve::new(sfc_type, sfc_dims)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(dimensions, tiers, max_duplicates_per_dimension, partitioning)
    }

    pub fn dimensions(&self) -> &[DimensionDefinition] {
        &self.dimensions
    }

    /// Tiers, coarsest first.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn tier(&self, id: u8) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.id == id)
    }

    pub fn partitioning(&self) -> KeyPartitioning {
        self.partitioning
    }

    pub fn max_duplicates_per_dimension(&self) -> u64 {
        self.max_duplicates_per_dimension
    }

    /// Fixed length of every partition key.
    pub fn partition_key_len(&self) -> usize {
        1 + self.bin_id_len + self.partitioning.key_len()
    }

    /// A dataset without dimensions is accepted as empty by every operation.
    fn check_arity(&self, data: &MultiDimensionalNumericData) -> Result<()> {
        let actual = data.dimension_count();
        if actual != 0 && actual != self.dimensions.len() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions.len(),
                actual: data.dimension_count(),
            });
        }
        Ok(())
    }

    fn partition_key(&self, tier: u8, bin_id: &[u8], suffix: Option<u8>) -> Bytes {
        let mut key = BytesMut::with_capacity(self.partition_key_len());
        key.put_u8(tier);
        key.put_slice(bin_id);
        if let Some(suffix) = suffix {
            key.put_u8(suffix);
        }
        key.freeze()
    }

    /// Row keys an entry covering `data` is written under.
    ///
    /// Each bin of the entry goes to the finest tier where it fits a single
    /// cell or stays within the duplication budget, so small entries keep
    /// precise keys. The coarsest tier takes entries no other tier can hold.
    /// An entry without dimensions, or with a NaN bound, has no ids.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata::{IndexConfig, MultiDimensionalNumericData};
    ///
    /// let strategy = IndexConfig::spatial().build()?;
    /// let point = MultiDimensionalNumericData::from_values(&[-74.0060, 40.7128]);
    /// let ids = strategy.insertion_ids(&point)?;
    /// assert_eq!(ids.len(), 1);
    /// # Ok::<(), strata::IndexError>(())
    /// ```
    pub fn insertion_ids(&self, data: &MultiDimensionalNumericData) -> Result<InsertionIds> {
        self.check_arity(data)?;
        if data.is_empty() {
            log::warn!("no insertion ids for an entry without values in every indexed dimension");
            return Ok(InsertionIds::default());
        }

        let mut grouper = PartitionGrouper::new();
        for binned in BinnedNumericDataset::apply_bins(data, &self.dimensions)? {
            let (tier, sort_keys) = self.tier_sort_keys(binned.data())?;
            for sort_key in sort_keys {
                let suffix = self.partitioning.insertion_suffix(&sort_key);
                grouper.extend(self.partition_key(tier, binned.bin_id(), suffix), [sort_key]);
            }
        }
        Ok(InsertionIds::new(
            grouper
                .into_groups()
                .into_iter()
                .map(|(partition_key, mut sort_keys)| {
                    sort_keys.sort();
                    sort_keys.dedup();
                    SinglePartitionInsertionIds::new(partition_key, sort_keys)
                })
                .collect(),
        ))
    }

    /// Pick the tier for one bin of an entry and its sort keys there.
    ///
    /// Tiers are tried finest first. A tier is taken when the entry fits a
    /// single cell, or when it spans no more cells than the duplication
    /// budget. The coarsest tier takes whatever is left.
    fn tier_sort_keys(&self, data: &MultiDimensionalNumericData) -> Result<(u8, Vec<Bytes>)> {
        for (position, tier) in self.tiers.iter().enumerate().rev() {
            let curve = &tier.curve;
            let estimate = curve.estimated_id_count(data)?;
            if estimate == 1 {
                let min_id = curve.encode(&data.mins())?;
                if min_id == curve.encode(&data.maxes())? {
                    log::trace!("entry fits one cell of tier {}", tier.id);
                    return Ok((tier.id, vec![min_id]));
                }
            }
            let coarsest = position == 0;
            if estimate <= self.duplicate_budget || coarsest {
                log::trace!("entry spans {estimate} cells of tier {}", tier.id);
                let limit = if coarsest {
                    MAX_INSERTION_IDS
                } else {
                    self.duplicate_budget
                };
                return Ok((tier.id, curve.cell_ids(data, false, limit)?));
            }
        }
        Err(IndexError::InvalidConfig("no tiers configured".into()))
    }

    /// Scan ranges for `data` over every tier, at most about `max_ranges`
    /// sort key ranges per tier.
    pub fn query_ranges(
        &self,
        data: &MultiDimensionalNumericData,
        max_ranges: usize,
    ) -> Result<QueryRanges> {
        self.query_ranges_with_hints(data, max_ranges, None)
    }

    /// Like [`query_ranges`](Self::query_ranges), skipping tiers `hints`
    /// records as empty.
    pub fn query_ranges_with_hints(
        &self,
        data: &MultiDimensionalNumericData,
        max_ranges: usize,
        hints: Option<&TierMetadata>,
    ) -> Result<QueryRanges> {
        self.check_arity(data)?;
        if data.is_empty() {
            return Ok(QueryRanges::default());
        }
        let binned = BinnedNumericDataset::apply_bins(data, &self.dimensions)?;
        if binned.is_empty() {
            return Ok(QueryRanges::default());
        }
        let ranges_per_bin = if max_ranges > 1 && binned.len() > 1 {
            max_ranges.div_ceil(binned.len())
        } else {
            max_ranges
        };

        let mut grouper = PartitionGrouper::new();
        for tier in self.tiers.iter().rev() {
            if hints.is_some_and(|metadata| !metadata.has_entries(tier.id)) {
                continue;
            }
            for dataset in &binned {
                let ranges = if dataset.is_full_extent_all() {
                    vec![tier.full_range()]
                } else {
                    tier.curve
                        .decompose(dataset.data(), true, ranges_per_bin)?
                        .into_ranges()
                };
                if ranges.is_empty() {
                    continue;
                }
                for suffix in self.partitioning.query_suffixes() {
                    grouper.extend(
                        self.partition_key(tier.id, dataset.bin_id(), suffix),
                        ranges.iter().cloned(),
                    );
                }
            }
        }
        Ok(QueryRanges::new(
            grouper
                .into_groups()
                .into_iter()
                .map(|(partition_key, ranges)| {
                    SinglePartitionQueryRanges::new(
                        partition_key,
                        ByteRange::merge_overlapping(ranges),
                    )
                })
                .collect(),
        ))
    }

    /// Partition keys an entry covering `data` is written under.
    pub fn insertion_partition_keys(&self, data: &MultiDimensionalNumericData) -> Result<Vec<Bytes>> {
        Ok(self.insertion_ids(data)?.partition_keys().cloned().collect())
    }

    /// Every partition key a query for `data` may need to visit.
    pub fn query_partition_keys(&self, data: &MultiDimensionalNumericData) -> Result<Vec<Bytes>> {
        self.check_arity(data)?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let binned = BinnedNumericDataset::apply_bins(data, &self.dimensions)?;
        let mut grouper = PartitionGrouper::<()>::new();
        for tier in self.tiers.iter().rev() {
            for dataset in &binned {
                for suffix in self.partitioning.query_suffixes() {
                    grouper.extend(self.partition_key(tier.id, dataset.bin_id(), suffix), []);
                }
            }
        }
        Ok(grouper
            .into_groups()
            .into_iter()
            .map(|(partition_key, _)| partition_key)
            .collect())
    }

    /// Cell width of every dimension in the finest tier.
    pub fn highest_precision_id_range_per_dimension(&self) -> Vec<f64> {
        self.tiers
            .last()
            .map(|tier| tier.curve.insertion_id_range_per_dimension())
            .unwrap_or_default()
    }

    /// Resolve a partition key into its tier and bin id.
    fn parse_partition_key<'a>(
        &self,
        partition_key: &'a [u8],
    ) -> std::result::Result<(&Tier, &'a [u8]), DecodeError> {
        let expected = self.partition_key_len();
        if partition_key.len() < expected {
            return Err(DecodeError::Truncated {
                what: "partition key",
                expected,
                available: partition_key.len(),
            });
        }
        if partition_key.len() > expected {
            return Err(DecodeError::TrailingBytes {
                remaining: partition_key.len() - expected,
            });
        }
        let tier_id = partition_key[0];
        let tier = self.tier(tier_id).ok_or(DecodeError::UnknownTag {
            kind: "tier",
            tag: tier_id as u64,
        })?;
        Ok((tier, &partition_key[1..1 + self.bin_id_len]))
    }

    /// Per-dimension bin ids inside a composite bin id.
    fn split_bin_id<'a>(&self, bin_id: &'a [u8]) -> Vec<&'a [u8]> {
        let mut offset = 0;
        self.dimensions
            .iter()
            .map(|dim| {
                let size = dim.fixed_bin_id_size();
                let part = &bin_id[offset..offset + size];
                offset += size;
                part
            })
            .collect()
    }

    /// Numeric range a stored row covers.
    pub fn range_for_id(
        &self,
        partition_key: &[u8],
        sort_key: &[u8],
    ) -> std::result::Result<MultiDimensionalNumericData, DecodeError> {
        let (tier, bin_id) = self.parse_partition_key(partition_key)?;
        let local = tier.curve.decode(sort_key)?;
        self.dimensions
            .iter()
            .zip(self.split_bin_id(bin_id))
            .zip(local.ranges())
            .map(|((dim, bin), range): ((&DimensionDefinition, &[u8]), &NumericRange)| {
                dim.denormalized_range(&BinRange::binned(
                    Bytes::copy_from_slice(bin),
                    range.min,
                    range.max,
                    false,
                ))
            })
            .collect()
    }

    /// Numeric range covered by a full row key.
    pub fn range_for_key(
        &self,
        key: &[u8],
    ) -> std::result::Result<MultiDimensionalNumericData, DecodeError> {
        let (partition_key, sort_key) = split_composite_key(key, self.partition_key_len())?;
        self.range_for_id(partition_key, sort_key)
    }

    /// Integer cell and bin of every dimension of a stored row.
    pub fn coordinates_per_dimension(
        &self,
        partition_key: &[u8],
        sort_key: &[u8],
    ) -> std::result::Result<MultiDimensionalCoordinates, DecodeError> {
        let (tier, bin_id) = self.parse_partition_key(partition_key)?;
        let cells = tier.curve.coordinates(sort_key)?;
        let coordinates = cells
            .into_iter()
            .zip(self.split_bin_id(bin_id))
            .map(|(cell, bin)| Coordinate::new(cell, Bytes::copy_from_slice(bin)))
            .collect();
        Ok(MultiDimensionalCoordinates::new(
            Bytes::copy_from_slice(&[tier.id]),
            coordinates,
        ))
    }
}

impl Persistable for TieredIndexStrategy {
    fn write_to(&self, buf: &mut BytesMut) {
        persist::put_nested_seq(buf, &self.dimensions);
        persist::put_nested_seq(buf, &self.tiers);
        persist::put_varint(buf, self.max_duplicates_per_dimension);
        persist::put_nested(buf, &self.partitioning);
    }

    fn read_from(buf: &mut &[u8]) -> std::result::Result<Self, DecodeError> {
        let dimensions = persist::get_nested_seq(buf, "strategy dimension")?;
        let tiers = persist::get_nested_seq(buf, "tier")?;
        let max_duplicates_per_dimension = persist::get_varint(buf)?;
        let partitioning = persist::get_nested(buf, "key partitioning")?;
        Self::new(dimensions, tiers, max_duplicates_per_dimension, partitioning)
            .map_err(|e| DecodeError::Invalid(e.to_string()))
    }
}
