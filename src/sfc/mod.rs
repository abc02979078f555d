//! Space-filling curves over normalized dimensions.
//!
//! A curve maps a point (one value per dimension, in each dimension's
//! bin-local domain) to a fixed-width big-endian id whose byte order follows
//! the curve. Query boxes decompose into ranges of ids.
//!
//! ```text
//! value ──normalize──▶ [0,1] ──× 2^bits──▶ cell ──curve──▶ index (u128) ──▶ id bytes
//! ```

mod hilbert;
mod zorder;

pub use hilbert::HilbertSfc;
pub use zorder::ZOrderSfc;

use crate::dimension::DimensionDefinition;
use crate::error::{DecodeError, IndexError, Result};
use crate::persist::{self, Persistable};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use strata_types::numeric::{MultiDimensionalNumericData, NumericRange};
use strata_types::range::ByteRange;

/// Largest supported precision of one dimension.
pub const MAX_BITS_PER_DIMENSION: u32 = 63;
/// Largest supported id width in bits.
pub const MAX_TOTAL_BITS: u32 = 128;
/// Largest supported number of dimensions.
pub const MAX_DIMENSIONS: usize = 32;

/// Curve family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SfcType {
    #[default]
    Hilbert,
    ZOrder,
}

/// A dimension definition paired with the bits of precision the curve gives it.
#[derive(Debug, Clone, PartialEq)]
pub struct SfcDimension {
    definition: DimensionDefinition,
    bits: u32,
}

impl SfcDimension {
    pub fn new(definition: DimensionDefinition, bits: u32) -> Self {
        Self { definition, bits }
    }

    pub fn definition(&self) -> &DimensionDefinition {
        &self.definition
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of cells along this dimension.
    pub fn cardinality(&self) -> f64 {
        (self.bits as f64).exp2()
    }

    fn max_cell(&self) -> u64 {
        low_mask(self.bits) as u64
    }

    /// Width of one cell in domain units.
    pub fn cell_width(&self) -> f64 {
        self.definition.range() / self.cardinality()
    }

    /// Cell holding `value` when encoding a point.
    pub(crate) fn point_cell(&self, value: f64) -> u64 {
        let scaled = self.definition.normalize(value) * self.cardinality();
        ((scaled.ceil() - 1.0).max(0.0) as u64).min(self.max_cell())
    }

    /// Cell holding `value` under plain floor semantics.
    pub(crate) fn floor_cell(&self, value: f64) -> u64 {
        let scaled = self.definition.normalize(value) * self.cardinality();
        (scaled.floor().max(0.0) as u64).min(self.max_cell())
    }

    /// Cell of a range bound. A bound sitting on a cell edge lands in the
    /// neighbouring cell or not depending on `over_inclusive`.
    pub(crate) fn range_bound_cell(&self, value: f64, is_min: bool, over_inclusive: bool) -> u64 {
        if is_min != over_inclusive {
            self.floor_cell(value)
        } else {
            self.point_cell(value)
        }
    }

    /// Inclusive cell span of a range. A zero-width span on a cell edge can
    /// yield `max < min`; it is collapsed onto the minimum cell.
    pub(crate) fn cell_span(&self, range: &NumericRange, over_inclusive: bool) -> (u64, u64) {
        let min = self.range_bound_cell(range.min, true, over_inclusive);
        let max = self.range_bound_cell(range.max, false, over_inclusive);
        if max < min && range.min <= range.max {
            (min, min)
        } else {
            (min, max)
        }
    }

    /// Domain range covered by a cell.
    pub(crate) fn cell_range(&self, cell: u64) -> NumericRange {
        let cardinality = self.cardinality();
        NumericRange::new(
            self.definition.denormalize(cell as f64 / cardinality),
            self.definition.denormalize((cell as f64 + 1.0) / cardinality),
        )
    }
}

impl Persistable for SfcDimension {
    fn write_to(&self, buf: &mut BytesMut) {
        persist::put_varint(buf, self.bits as u64);
        persist::put_nested(buf, &self.definition);
    }

    fn read_from(buf: &mut &[u8]) -> std::result::Result<Self, DecodeError> {
        let bits = persist::get_varint(buf)?;
        let bits = u32::try_from(bits)
            .ok()
            .filter(|b| *b <= MAX_BITS_PER_DIMENSION)
            .ok_or_else(|| DecodeError::Invalid(format!("bits of precision {bits}")))?;
        Ok(Self {
            bits,
            definition: persist::get_nested(buf, "dimension definition")?,
        })
    }
}

/// Inclusive range of curve indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexRange {
    pub start: u128,
    pub end: u128,
}

impl IndexRange {
    pub fn new(start: u128, end: u128) -> Self {
        Self { start, end }
    }

    /// Number of indices in the range, saturating.
    pub fn id_count(&self) -> u128 {
        (self.end - self.start).saturating_add(1)
    }
}

/// Ordered, disjoint id ranges approximating a query box.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeDecomposition {
    ranges: Vec<ByteRange>,
}

impl RangeDecomposition {
    pub fn new(ranges: Vec<ByteRange>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn into_ranges(self) -> Vec<ByteRange> {
        self.ranges
    }
}

impl IntoIterator for RangeDecomposition {
    type Item = ByteRange;
    type IntoIter = std::vec::IntoIter<ByteRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.into_iter()
    }
}

/// A configured space-filling curve.
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceFillingCurve {
    Hilbert(HilbertSfc),
    ZOrder(ZOrderSfc),
}

impl SpaceFillingCurve {
    /// Build a curve, checking precision limits.
    pub fn new(sfc_type: SfcType, dimensions: Vec<SfcDimension>) -> Result<Self> {
        validate_dimensions(&dimensions)?;
        Ok(match sfc_type {
            SfcType::Hilbert => Self::Hilbert(HilbertSfc::from_validated(dimensions)),
            SfcType::ZOrder => Self::ZOrder(ZOrderSfc::from_validated(dimensions)),
        })
    }

    pub fn sfc_type(&self) -> SfcType {
        match self {
            Self::Hilbert(_) => SfcType::Hilbert,
            Self::ZOrder(_) => SfcType::ZOrder,
        }
    }

    pub fn dimensions(&self) -> &[SfcDimension] {
        match self {
            Self::Hilbert(h) => h.dimensions(),
            Self::ZOrder(z) => z.dimensions(),
        }
    }

    pub fn total_bits(&self) -> u32 {
        self.dimensions().iter().map(SfcDimension::bits).sum()
    }

    /// Largest per-dimension precision.
    pub fn max_bits(&self) -> u32 {
        self.dimensions()
            .iter()
            .map(SfcDimension::bits)
            .max()
            .unwrap_or(0)
    }

    /// Width of an id in bytes.
    pub fn id_len(&self) -> usize {
        self.total_bits().div_ceil(8) as usize
    }

    fn check_arity(&self, actual: usize) -> Result<()> {
        let expected = self.dimensions().len();
        if expected != actual {
            return Err(IndexError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }

    /// Curve index of the cells holding `values`.
    pub fn index_of(&self, values: &[f64]) -> Result<u128> {
        self.check_arity(values.len())?;
        Ok(match self {
            Self::Hilbert(h) => {
                h.index_of_cells(&point_cells(h.dimensions(), values, SfcDimension::point_cell))
            }
            Self::ZOrder(z) => {
                z.index_of_cells(&point_cells(z.dimensions(), values, SfcDimension::floor_cell))
            }
        })
    }

    pub(crate) fn index_of_cells(&self, cells: &[u64]) -> u128 {
        match self {
            Self::Hilbert(h) => h.index_of_cells(cells),
            Self::ZOrder(z) => z.index_of_cells(cells),
        }
    }

    /// Id of the point `values`.
    pub fn encode(&self, values: &[f64]) -> Result<Bytes> {
        Ok(index_to_id(self.index_of(values)?, self.id_len()))
    }

    /// Integer cell of every dimension encoded in `id`.
    pub fn coordinates(&self, id: &[u8]) -> std::result::Result<Vec<u64>, DecodeError> {
        let index = id_to_index(id, self.id_len())?;
        Ok(match self {
            Self::Hilbert(h) => h.cells_of_index(index),
            Self::ZOrder(z) => z.cells_of_index(index),
        })
    }

    /// Domain range of every dimension covered by `id`.
    pub fn decode(&self, id: &[u8]) -> std::result::Result<MultiDimensionalNumericData, DecodeError> {
        let cells = self.coordinates(id)?;
        Ok(self
            .dimensions()
            .iter()
            .zip(cells)
            .map(|(dim, cell)| dim.cell_range(cell))
            .collect())
    }

    /// Cell width of every dimension.
    pub fn insertion_id_range_per_dimension(&self) -> Vec<f64> {
        self.dimensions().iter().map(SfcDimension::cell_width).collect()
    }

    /// Number of cells a box spans, saturating.
    pub fn estimated_id_count(&self, data: &MultiDimensionalNumericData) -> Result<u128> {
        self.check_arity(data.dimension_count())?;
        Ok(self
            .dimensions()
            .iter()
            .zip(data.ranges())
            .map(|(dim, range)| {
                let (min, max) = dim.cell_span(range, false);
                (min.abs_diff(max) as u128) + 1
            })
            .fold(1u128, u128::saturating_mul))
    }

    /// Ids of every cell a box touches, in curve order.
    ///
    /// Fails when the box spans more than `limit` cells.
    pub fn cell_ids(
        &self,
        data: &MultiDimensionalNumericData,
        over_inclusive: bool,
        limit: u128,
    ) -> Result<Vec<Bytes>> {
        self.check_arity(data.dimension_count())?;
        let spans = self.query_cells(data, over_inclusive);
        if spans.iter().any(|(min, max)| min > max) {
            return Ok(Vec::new());
        }
        let count = spans
            .iter()
            .map(|(min, max)| (max - min) as u128 + 1)
            .fold(1u128, u128::saturating_mul);
        if count > limit {
            return Err(IndexError::TooManyIds { count, limit });
        }

        let mut indices = Vec::with_capacity(count as usize);
        let mut cells: Vec<u64> = spans.iter().map(|(min, _)| *min).collect();
        'cells: loop {
            indices.push(self.index_of_cells(&cells));
            for (cell, (min, max)) in cells.iter_mut().zip(&spans) {
                if *cell < *max {
                    *cell += 1;
                    continue 'cells;
                }
                *cell = *min;
            }
            break;
        }
        indices.sort_unstable();
        let width = self.id_len();
        Ok(indices.into_iter().map(|i| index_to_id(i, width)).collect())
    }

    /// Per-dimension inclusive cell spans of a query box.
    fn query_cells(&self, query: &MultiDimensionalNumericData, over_inclusive: bool) -> Vec<(u64, u64)> {
        self.dimensions()
            .iter()
            .zip(query.ranges())
            .map(|(dim, range)| dim.cell_span(range, over_inclusive))
            .collect()
    }

    /// Index ranges covering `query`, at most `max_ranges` of them.
    ///
    /// A zero budget cannot be honoured and yields a single range over the
    /// whole curve.
    pub fn decompose_indices(
        &self,
        query: &MultiDimensionalNumericData,
        over_inclusive: bool,
        max_ranges: usize,
    ) -> Result<Vec<IndexRange>> {
        self.check_arity(query.dimension_count())?;
        if max_ranges == 0 {
            log::debug!("range budget is zero, scanning the whole curve");
            return Ok(vec![IndexRange::new(0, low_mask(self.total_bits()))]);
        }
        let cells = self.query_cells(query, over_inclusive);
        if cells.iter().any(|(min, max)| min > max) {
            return Ok(Vec::new());
        }
        Ok(match self {
            Self::Hilbert(h) => h.decompose(&cells, max_ranges),
            Self::ZOrder(z) => z.decompose(&cells),
        })
    }

    /// Byte ranges covering `query`, at most `max_ranges` of them.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata::dimension::DimensionDefinition;
    /// use strata::sfc::{SfcDimension, SfcType, SpaceFillingCurve};
    /// use strata::MultiDimensionalNumericData;
    ///
    /// let curve = SpaceFillingCurve::new(
    ///     SfcType::Hilbert,
    ///     vec![
    ///         SfcDimension::new(DimensionDefinition::longitude(), 12),
    ///         SfcDimension::new(DimensionDefinition::latitude(), 12),
    ///     ],
    /// )?;
    /// let query = MultiDimensionalNumericData::from_rect(&geo::Rect::new(
    ///     geo::coord! { x: -10.0, y: -10.0 },
    ///     geo::coord! { x: 10.0, y: 10.0 },
    /// ));
    /// let ranges = curve.decompose(&query, true, 8)?;
    /// assert!(!ranges.is_empty() && ranges.len() <= 8);
    /// # Ok::<(), strata::IndexError>(())
    /// ```
    pub fn decompose(
        &self,
        query: &MultiDimensionalNumericData,
        over_inclusive: bool,
        max_ranges: usize,
    ) -> Result<RangeDecomposition> {
        let width = self.id_len();
        Ok(RangeDecomposition::new(
            self.decompose_indices(query, over_inclusive, max_ranges)?
                .into_iter()
                .map(|r| ByteRange::new(index_to_id(r.start, width), index_to_id(r.end, width)))
                .collect(),
        ))
    }

    /// Exact decomposition with no range budget.
    pub fn decompose_fully(
        &self,
        query: &MultiDimensionalNumericData,
        over_inclusive: bool,
    ) -> Result<RangeDecomposition> {
        self.decompose(query, over_inclusive, usize::MAX)
    }
}

fn point_cells(
    dimensions: &[SfcDimension],
    values: &[f64],
    cell: fn(&SfcDimension, f64) -> u64,
) -> Vec<u64> {
    dimensions
        .iter()
        .zip(values)
        .map(|(dim, &value)| cell(dim, value))
        .collect()
}

fn validate_dimensions(dimensions: &[SfcDimension]) -> Result<()> {
    if dimensions.is_empty() || dimensions.len() > MAX_DIMENSIONS {
        return Err(IndexError::InvalidConfig(format!(
            "a curve needs 1 to {MAX_DIMENSIONS} dimensions, got {}",
            dimensions.len()
        )));
    }
    if let Some(dim) = dimensions.iter().find(|d| d.bits > MAX_BITS_PER_DIMENSION) {
        return Err(IndexError::InvalidConfig(format!(
            "bits per dimension must not exceed {MAX_BITS_PER_DIMENSION}, got {}",
            dim.bits
        )));
    }
    let total: u32 = dimensions.iter().map(SfcDimension::bits).sum();
    if total > MAX_TOTAL_BITS {
        return Err(IndexError::InvalidConfig(format!(
            "total curve precision {total} exceeds {MAX_TOTAL_BITS} bits"
        )));
    }
    Ok(())
}

/// `bits` low bits set.
pub(crate) fn low_mask(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

/// Big-endian id of `width` bytes.
pub(crate) fn index_to_id(index: u128, width: usize) -> Bytes {
    let bytes = index.to_be_bytes();
    Bytes::copy_from_slice(&bytes[bytes.len() - width..])
}

pub(crate) fn id_to_index(id: &[u8], width: usize) -> std::result::Result<u128, DecodeError> {
    if id.len() < width {
        return Err(DecodeError::Truncated {
            what: "curve id",
            expected: width,
            available: id.len(),
        });
    }
    if id.len() > width {
        return Err(DecodeError::TrailingBytes {
            remaining: id.len() - width,
        });
    }
    Ok(id.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128))
}

/// Sort and merge ranges that overlap or abut.
pub(crate) fn merge_contiguous(mut ranges: Vec<IndexRange>) -> Vec<IndexRange> {
    ranges.sort_unstable();
    let mut merged: Vec<IndexRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end.saturating_add(1) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Merge sorted disjoint ranges down to `max_ranges`, always joining the
/// adjacent pair with the smallest combined span (lowest position on ties).
pub(crate) fn merge_to_budget(ranges: Vec<IndexRange>, max_ranges: usize) -> Vec<IndexRange> {
    let max_ranges = max_ranges.max(1);
    if ranges.len() <= max_ranges {
        return ranges;
    }
    log::debug!(
        "merging {} ranges down to a budget of {}",
        ranges.len(),
        max_ranges
    );

    let mut ranges = ranges;
    let n = ranges.len();
    let mut alive = vec![true; n];
    let mut next: Vec<Option<usize>> = (1..=n).map(|i| (i < n).then_some(i)).collect();
    let mut prev: Vec<Option<usize>> = (0..n).map(|i| i.checked_sub(1)).collect();
    let span = |ranges: &[IndexRange], left: usize, right: usize| ranges[right].end - ranges[left].start;

    let mut heap: BinaryHeap<Reverse<(u128, usize)>> = (0..n - 1)
        .map(|i| Reverse((span(&ranges, i, i + 1), i)))
        .collect();
    let mut count = n;
    while count > max_ranges {
        let Some(Reverse((stored, left))) = heap.pop() else {
            break;
        };
        let Some(right) = next[left] else {
            continue;
        };
        if !alive[left] || span(&ranges, left, right) != stored {
            continue;
        }
        ranges[left].end = ranges[right].end;
        alive[right] = false;
        next[left] = next[right];
        if let Some(after) = next[right] {
            prev[after] = Some(left);
            heap.push(Reverse((span(&ranges, left, after), left)));
        }
        if let Some(before) = prev[left] {
            heap.push(Reverse((span(&ranges, before, left), before)));
        }
        count -= 1;
    }

    ranges
        .into_iter()
        .zip(alive)
        .filter_map(|(range, alive)| alive.then_some(range))
        .collect()
}

const TAG_HILBERT: u64 = 0;
const TAG_ZORDER: u64 = 1;

impl Persistable for SpaceFillingCurve {
    fn write_to(&self, buf: &mut BytesMut) {
        let tag = match self {
            Self::Hilbert(_) => TAG_HILBERT,
            Self::ZOrder(_) => TAG_ZORDER,
        };
        persist::put_varint(buf, tag);
        persist::put_nested_seq(buf, self.dimensions());
    }

    fn read_from(buf: &mut &[u8]) -> std::result::Result<Self, DecodeError> {
        let sfc_type = match persist::get_varint(buf)? {
            TAG_HILBERT => SfcType::Hilbert,
            TAG_ZORDER => SfcType::ZOrder,
            tag => {
                return Err(DecodeError::UnknownTag {
                    kind: "space-filling curve",
                    tag,
                });
            }
        };
        let dimensions = persist::get_nested_seq(buf, "curve dimension")?;
        Self::new(sfc_type, dimensions).map_err(|e| DecodeError::Invalid(e.to_string()))
    }
}
