//! Post-scan row filtering.
//!
//! Range scans over-approximate a query: curve cells along the query border
//! also hold rows outside it. [`BasicQueryFilter`] re-checks each returned
//! row against the original query box with a chosen [`CompareOperation`].

use crate::dimension::{BinnedNumericDataset, DimensionDefinition, doubles_equal};
use crate::error::{DecodeError, IndexError, Result};
use crate::persist::{self, Persistable};
use bytes::{BufMut, Bytes, BytesMut};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use strata_types::numeric::{MultiDimensionalNumericData, NumericRange};

/// Relation a row's range must have to the query range, per dimension.
///
/// The binary form uses the variant's position as its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOperation {
    /// The row lies inside the query.
    Contains,
    /// The ranges share interior without either containing the other.
    Overlaps,
    /// The ranges share at least one value.
    #[default]
    Intersects,
    /// The ranges meet only at a bound.
    Touches,
    /// The query lies inside the row.
    Within,
    Disjoint,
    /// Interior crossing needs two dimensions; never true for a 1-D range.
    Crosses,
    /// Bounds match within floating-point tolerance.
    Equals,
}

impl CompareOperation {
    pub const ALL: [CompareOperation; 8] = [
        Self::Contains,
        Self::Overlaps,
        Self::Intersects,
        Self::Touches,
        Self::Within,
        Self::Disjoint,
        Self::Crosses,
        Self::Equals,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u64) -> std::result::Result<Self, DecodeError> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(DecodeError::UnknownTag {
                kind: "compare operation",
                tag: ordinal,
            })
    }

    /// Whether `data` relates to `query` by this operation.
    pub fn compare(self, data: &NumericRange, query: &NumericRange) -> bool {
        match self {
            Self::Contains => contains(data, query),
            Self::Overlaps => {
                !(data.max <= query.min || data.min >= query.max)
                    && !equals(data, query)
                    && !contains(data, query)
                    && !contains(query, data)
            }
            Self::Intersects => !disjoint(data, query),
            Self::Touches => {
                doubles_equal(data.min, query.max) || doubles_equal(data.max, query.min)
            }
            Self::Within => contains(query, data),
            Self::Disjoint => disjoint(data, query),
            Self::Crosses => false,
            Self::Equals => equals(data, query),
        }
    }
}

fn contains(data: &NumericRange, query: &NumericRange) -> bool {
    !(data.min < query.min || data.max > query.max)
}

fn disjoint(data: &NumericRange, query: &NumericRange) -> bool {
    data.max < query.min || data.min > query.max
}

fn equals(data: &NumericRange, query: &NumericRange) -> bool {
    doubles_equal(data.min, query.min) && doubles_equal(data.max, query.max)
}

/// Query boxes indexed by composite bin id, tested against candidate rows.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicQueryFilter {
    dimensions: Vec<DimensionDefinition>,
    constraints: FxHashMap<Bytes, Vec<MultiDimensionalNumericData>>,
    operation: CompareOperation,
}

impl BasicQueryFilter {
    pub fn new(
        constraints: &MultiDimensionalNumericData,
        dimensions: Vec<DimensionDefinition>,
        operation: CompareOperation,
    ) -> Result<Self> {
        Self::any_of(std::slice::from_ref(constraints), dimensions, operation)
    }

    /// A filter accepting rows that satisfy the operation against any of
    /// `constraint_sets`.
    pub fn any_of(
        constraint_sets: &[MultiDimensionalNumericData],
        dimensions: Vec<DimensionDefinition>,
        operation: CompareOperation,
    ) -> Result<Self> {
        let mut constraints: FxHashMap<Bytes, Vec<MultiDimensionalNumericData>> =
            FxHashMap::default();
        for set in constraint_sets {
            for binned in BinnedNumericDataset::apply_bins(set, &dimensions)? {
                constraints
                    .entry(binned.bin_id().clone())
                    .or_default()
                    .push(binned.data().clone());
            }
        }
        Ok(Self {
            dimensions,
            constraints,
            operation,
        })
    }

    pub fn operation(&self) -> CompareOperation {
        self.operation
    }

    pub fn dimensions(&self) -> &[DimensionDefinition] {
        &self.dimensions
    }

    /// Whether a row covering `data` satisfies the query.
    ///
    /// The row is binned like the query was. It is accepted when one of its
    /// bins has stored query boxes and the operation holds against one of
    /// them in every dimension.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata::dimension::DimensionDefinition;
    /// use strata::filter::{BasicQueryFilter, CompareOperation};
    /// use strata::{MultiDimensionalNumericData, NumericRange};
    ///
    /// let query = MultiDimensionalNumericData::new(vec![
    ///     NumericRange::new(-10.0, 10.0),
    ///     NumericRange::new(-5.0, 5.0),
    /// ]);
    /// let filter = BasicQueryFilter::new(
    ///     &query,
    ///     vec![DimensionDefinition::longitude(), DimensionDefinition::latitude()],
    ///     CompareOperation::Intersects,
    /// )?;
    /// assert!(filter.accept(&MultiDimensionalNumericData::from_values(&[3.0, 4.0]))?);
    /// assert!(!filter.accept(&MultiDimensionalNumericData::from_values(&[30.0, 4.0]))?);
    /// # Ok::<(), strata::IndexError>(())
    /// ```
    pub fn accept(&self, data: &MultiDimensionalNumericData) -> Result<bool> {
        if data.dimension_count() != self.dimensions.len() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions.len(),
                actual: data.dimension_count(),
            });
        }
        let binned = BinnedNumericDataset::apply_bins(data, &self.dimensions)?;
        Ok(binned.iter().any(|row| {
            self.constraints.get(row.bin_id()).is_some_and(|queries| {
                queries
                    .iter()
                    .any(|query| self.satisfies(row.data(), query))
            })
        }))
    }

    fn satisfies(&self, data: &MultiDimensionalNumericData, query: &MultiDimensionalNumericData) -> bool {
        data.ranges()
            .iter()
            .zip(query.ranges())
            .all(|(d, q)| self.operation.compare(d, q))
    }
}

fn put_numeric_data(buf: &mut BytesMut, data: &MultiDimensionalNumericData) {
    persist::put_varint(buf, data.dimension_count() as u64);
    for range in data.ranges() {
        buf.put_f64(range.min);
        buf.put_f64(range.max);
    }
}

fn get_numeric_data(buf: &mut &[u8]) -> std::result::Result<MultiDimensionalNumericData, DecodeError> {
    let count = persist::get_len(buf)?;
    persist::ensure(buf, count.saturating_mul(16), "constraint ranges")?;
    (0..count)
        .map(|_| {
            Ok(NumericRange::new(
                persist::get_f64(buf, "constraint min")?,
                persist::get_f64(buf, "constraint max")?,
            ))
        })
        .collect()
}

impl Persistable for BasicQueryFilter {
    fn write_to(&self, buf: &mut BytesMut) {
        persist::put_varint(buf, self.operation.ordinal() as u64);
        persist::put_nested_seq(buf, &self.dimensions);

        let mut bins: Vec<(&Bytes, &Vec<MultiDimensionalNumericData>)> =
            self.constraints.iter().collect();
        bins.sort_by(|a, b| a.0.cmp(b.0));
        persist::put_varint(buf, bins.len() as u64);
        for (bin_id, queries) in bins {
            persist::put_varint(buf, bin_id.len() as u64);
            buf.put_slice(bin_id);
            persist::put_varint(buf, queries.len() as u64);
            for query in queries {
                put_numeric_data(buf, query);
            }
        }
    }

    fn read_from(buf: &mut &[u8]) -> std::result::Result<Self, DecodeError> {
        let operation = CompareOperation::from_ordinal(persist::get_varint(buf)?)?;
        let dimensions = persist::get_nested_seq(buf, "filter dimension")?;

        let bins = persist::get_len(buf)?;
        let mut constraints = FxHashMap::default();
        for _ in 0..bins {
            let len = persist::get_len(buf)?;
            let bin_id = Bytes::copy_from_slice(persist::take(buf, len, "bin id")?);
            let count = persist::get_len(buf)?;
            persist::ensure(buf, count, "constraint sets")?;
            let queries = (0..count)
                .map(|_| get_numeric_data(buf))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            constraints.insert(bin_id, queries);
        }
        Ok(Self {
            dimensions,
            constraints,
            operation,
        })
    }
}
