//! Periodic binning of unbounded dimensions.
//!
//! Epochs are treated as closed intervals `[start, start + size]`, so a value
//! exactly on an epoch boundary belongs to both neighbouring bins: at offset
//! `size` of the earlier bin and offset `0` of the later one. Range binning
//! follows the same rule, which keeps inserts and queries at a boundary
//! consistent.
//!
//! Values past the bins a bin id can name are clamped onto the outermost bin,
//! and a single range may cover at most [`MAX_BINS`] bins.

use super::BinRange;
use crate::error::{DecodeError, IndexError, Result};
use crate::persist::{self, Persistable};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use strata_types::numeric::NumericRange;

/// Most bins one range, or one multi-dimensional entry, may be split into.
pub const MAX_BINS: u64 = 1 << 20;

fn check_bin_count(count: u128) -> Result<()> {
    if count > MAX_BINS as u128 {
        return Err(IndexError::TooManyBins {
            count,
            limit: MAX_BINS as u128,
        });
    }
    Ok(())
}

/// Standard temporal bin widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl TemporalUnit {
    pub const fn millis(self) -> i64 {
        match self {
            TemporalUnit::Minute => 60_000,
            TemporalUnit::Hour => 3_600_000,
            TemporalUnit::Day => 86_400_000,
            TemporalUnit::Week => 604_800_000,
        }
    }
}

/// A dimension value split into its bin and its offset within the bin.
#[derive(Debug, Clone, PartialEq)]
pub struct BinValue {
    pub bin_id: Bytes,
    pub normalized_value: f64,
}

/// Fixed-size epochs of milliseconds counted from an origin instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemporalBinning {
    origin_millis: i64,
    bin_size_millis: i64,
}

impl TemporalBinning {
    /// Width of a binned temporal bin id.
    pub const BIN_ID_SIZE: usize = 4;

    /// Origin of the Landsat 8 acquisition calendar.
    pub const LANDSAT8_ORIGIN_MILLIS: i64 = 1_420_070_400;

    /// 256 sixteen-day revisit cycles.
    pub const LANDSAT8_BIN_SIZE_MILLIS: i64 = 16 * 256 * 86_400_000;

    pub fn new(origin_millis: i64, bin_size_millis: i64) -> Result<Self> {
        if bin_size_millis <= 0 {
            return Err(IndexError::InvalidConfig(format!(
                "temporal bin size must be positive, got {bin_size_millis}"
            )));
        }
        Ok(Self {
            origin_millis,
            bin_size_millis,
        })
    }

    /// Bins of one `unit` counted from the Unix epoch.
    pub const fn from_unit(unit: TemporalUnit) -> Self {
        Self {
            origin_millis: 0,
            bin_size_millis: unit.millis(),
        }
    }

    pub const fn landsat8() -> Self {
        Self {
            origin_millis: Self::LANDSAT8_ORIGIN_MILLIS,
            bin_size_millis: Self::LANDSAT8_BIN_SIZE_MILLIS,
        }
    }

    pub fn origin_millis(&self) -> i64 {
        self.origin_millis
    }

    pub fn bin_size_millis(&self) -> i64 {
        self.bin_size_millis
    }

    fn bin_index(&self, millis: i64) -> i64 {
        millis
            .saturating_sub(self.origin_millis)
            .div_euclid(self.bin_size_millis)
            .clamp(i32::MIN as i64, i32::MAX as i64)
    }

    /// Clamp an instant into the span covered by `i32` bin ids.
    fn clamp_millis(&self, millis: i64) -> i64 {
        let first = self.bin_start(i32::MIN as i64);
        let last = self
            .bin_start(i32::MAX as i64)
            .saturating_add(self.bin_size_millis);
        millis.clamp(first, last)
    }

    fn bin_start(&self, index: i64) -> i64 {
        self.origin_millis
            .saturating_add(index.saturating_mul(self.bin_size_millis))
    }

    fn encode_bin_id(index: i64) -> Bytes {
        Bytes::copy_from_slice(&(index as i32).to_be_bytes())
    }

    fn decode_bin_id(bin_id: &[u8]) -> std::result::Result<i64, DecodeError> {
        let bytes: [u8; 4] = bin_id.try_into().map_err(|_| DecodeError::Truncated {
            what: "temporal bin id",
            expected: Self::BIN_ID_SIZE,
            available: bin_id.len(),
        })?;
        Ok(i32::from_be_bytes(bytes) as i64)
    }

    pub fn binned_value(&self, millis: f64) -> BinValue {
        let millis = self.clamp_millis(millis as i64);
        let index = self.bin_index(millis);
        BinValue {
            bin_id: Self::encode_bin_id(index),
            normalized_value: millis.saturating_sub(self.bin_start(index)) as f64,
        }
    }

    /// One range per epoch the closed range `[min, max]` touches.
    pub fn normalized_ranges(&self, range: &NumericRange) -> Result<Vec<BinRange>> {
        let (mut start, mut end) = (
            self.clamp_millis(range.min as i64),
            self.clamp_millis(range.max as i64),
        );
        if end < start {
            std::mem::swap(&mut start, &mut end);
        }
        let size = self.bin_size_millis;
        // a start on a boundary also lies at the end of the previous epoch
        let first = self.bin_index(start.saturating_sub(1));
        let last = self.bin_index(end);
        check_bin_count((last as i128 - first as i128) as u128 + 1)?;
        Ok((first..=last)
            .map(|index| {
                let bin_start = self.bin_start(index);
                let lo = start.max(bin_start).saturating_sub(bin_start).min(size);
                let hi = end
                    .min(bin_start.saturating_add(size))
                    .saturating_sub(bin_start)
                    .clamp(lo, size);
                BinRange::binned(
                    Self::encode_bin_id(index),
                    lo as f64,
                    hi as f64,
                    lo == 0 && hi == size,
                )
            })
            .collect())
    }

    pub fn denormalized_range(
        &self,
        bin_range: &BinRange,
    ) -> std::result::Result<NumericRange, DecodeError> {
        let start = self.bin_start(Self::decode_bin_id(&bin_range.bin_id)?) as f64;
        Ok(NumericRange::new(
            start + bin_range.normalized_min,
            start + bin_range.normalized_max,
        ))
    }
}

/// Fixed-width bins of a plain numeric dimension, counted from zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalBinning {
    interval: f64,
}

impl IntervalBinning {
    pub const BIN_ID_SIZE: usize = 8;

    /// Largest bin index magnitude, exact in an `f64`.
    const INDEX_LIMIT: f64 = (1u64 << 62) as f64;

    pub fn new(interval: f64) -> Result<Self> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(IndexError::InvalidConfig(format!(
                "bin interval must be positive and finite, got {interval}"
            )));
        }
        Ok(Self { interval })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    fn encode_bin_id(index: i64) -> Bytes {
        Bytes::copy_from_slice(&index.to_be_bytes())
    }

    fn decode_bin_id(bin_id: &[u8]) -> std::result::Result<i64, DecodeError> {
        let bytes: [u8; 8] = bin_id.try_into().map_err(|_| DecodeError::Truncated {
            what: "interval bin id",
            expected: Self::BIN_ID_SIZE,
            available: bin_id.len(),
        })?;
        Ok(i64::from_be_bytes(bytes))
    }

    pub fn binned_value(&self, value: f64) -> BinValue {
        let index = (value / self.interval)
            .floor()
            .clamp(-Self::INDEX_LIMIT, Self::INDEX_LIMIT);
        BinValue {
            bin_id: Self::encode_bin_id(index as i64),
            normalized_value: (value - index * self.interval).clamp(0.0, self.interval),
        }
    }

    pub fn normalized_ranges(&self, range: &NumericRange) -> Result<Vec<BinRange>> {
        if range.is_nan() {
            return Ok(Vec::new());
        }
        let (start, end) = if range.max < range.min {
            (range.max, range.min)
        } else {
            (range.min, range.max)
        };
        let first = ((start / self.interval).ceil() - 1.0)
            .clamp(-Self::INDEX_LIMIT, Self::INDEX_LIMIT) as i64;
        let last = (end / self.interval)
            .floor()
            .clamp(-Self::INDEX_LIMIT, Self::INDEX_LIMIT) as i64;
        check_bin_count((last as i128 - first as i128) as u128 + 1)?;
        Ok((first..=last)
            .map(|index| {
                let bin_start = index as f64 * self.interval;
                let lo = (start - bin_start).max(0.0).min(self.interval);
                let hi = (end - bin_start).max(lo).min(self.interval);
                BinRange::binned(
                    Self::encode_bin_id(index),
                    lo,
                    hi,
                    lo <= 0.0 && hi >= self.interval,
                )
            })
            .collect())
    }

    pub fn denormalized_range(
        &self,
        bin_range: &BinRange,
    ) -> std::result::Result<NumericRange, DecodeError> {
        let start = Self::decode_bin_id(&bin_range.bin_id)? as f64 * self.interval;
        Ok(NumericRange::new(
            start + bin_range.normalized_min,
            start + bin_range.normalized_max,
        ))
    }
}

/// How an unbounded dimension is split into bins.
#[derive(Debug, Clone, PartialEq)]
pub enum BinningStrategy {
    Temporal(TemporalBinning),
    Interval(IntervalBinning),
}

impl BinningStrategy {
    /// Lower bound of a bin-local value.
    pub fn bin_min(&self) -> f64 {
        0.0
    }

    /// Upper bound of a bin-local value.
    pub fn bin_max(&self) -> f64 {
        match self {
            Self::Temporal(t) => t.bin_size_millis as f64,
            Self::Interval(i) => i.interval,
        }
    }

    pub fn binned_value(&self, value: f64) -> BinValue {
        match self {
            Self::Temporal(t) => t.binned_value(value),
            Self::Interval(i) => i.binned_value(value),
        }
    }

    pub fn normalized_ranges(&self, range: &NumericRange) -> Result<Vec<BinRange>> {
        match self {
            Self::Temporal(t) => t.normalized_ranges(range),
            Self::Interval(i) => i.normalized_ranges(range),
        }
    }

    pub fn denormalized_range(
        &self,
        bin_range: &BinRange,
    ) -> std::result::Result<NumericRange, DecodeError> {
        match self {
            Self::Temporal(t) => t.denormalized_range(bin_range),
            Self::Interval(i) => i.denormalized_range(bin_range),
        }
    }

    pub fn fixed_bin_id_size(&self) -> usize {
        match self {
            Self::Temporal(_) => TemporalBinning::BIN_ID_SIZE,
            Self::Interval(_) => IntervalBinning::BIN_ID_SIZE,
        }
    }
}

const TAG_TEMPORAL: u64 = 0;
const TAG_INTERVAL: u64 = 1;

impl Persistable for BinningStrategy {
    fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Self::Temporal(t) => {
                persist::put_varint(buf, TAG_TEMPORAL);
                persist::put_zigzag(buf, t.origin_millis);
                persist::put_zigzag(buf, t.bin_size_millis);
            }
            Self::Interval(i) => {
                persist::put_varint(buf, TAG_INTERVAL);
                buf.put_f64(i.interval);
            }
        }
    }

    fn read_from(buf: &mut &[u8]) -> std::result::Result<Self, DecodeError> {
        let invalid = |e: IndexError| DecodeError::Invalid(e.to_string());
        match persist::get_varint(buf)? {
            TAG_TEMPORAL => {
                let origin = persist::get_zigzag(buf)?;
                let size = persist::get_zigzag(buf)?;
                Ok(Self::Temporal(
                    TemporalBinning::new(origin, size).map_err(invalid)?,
                ))
            }
            TAG_INTERVAL => {
                let interval = persist::get_f64(buf, "bin interval")?;
                Ok(Self::Interval(IntervalBinning::new(interval).map_err(invalid)?))
            }
            tag => Err(DecodeError::UnknownTag {
                kind: "binning strategy",
                tag,
            }),
        }
    }
}
