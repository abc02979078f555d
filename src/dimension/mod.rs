//! Per-ordinate domains, normalization and periodic range splitting.
//!
//! A [`DimensionDefinition`] describes the domain of one indexed ordinate. It
//! maps raw values into `[0, 1]` for the space-filling curve and splits raw
//! ranges into bin-local [`BinRange`]s: a single range for bounded domains,
//! two ranges for a longitude range crossing the antimeridian, and one range
//! per covered epoch for binned (unbounded) dimensions.

mod binned;
mod binning;

pub use binned::BinnedNumericDataset;
pub use binning::{
    BinValue, BinningStrategy, IntervalBinning, MAX_BINS, TemporalBinning, TemporalUnit,
};

use crate::error::DecodeError;
use crate::persist::{self, Persistable};
use bytes::{BufMut, Bytes, BytesMut};
use smallvec::{SmallVec, smallvec};
use strata_types::numeric::NumericRange;

/// Tolerance used when comparing bounds for equality.
pub const COMP_EPSILON: f64 = 2.22e-16;

/// Sign-aware epsilon comparison of two doubles.
pub fn doubles_equal(x: f64, y: f64) -> bool {
    let diff = x.abs() - y.abs();
    diff <= COMP_EPSILON && diff >= -COMP_EPSILON && (x < 0.0) == (y < 0.0)
}

/// A bin-local portion of a raw range.
///
/// `bin_id` is empty for unbinned dimensions. `full_extent` marks a range
/// covering its whole bin (or whole domain), which lets query planning skip
/// fine-grained decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct BinRange {
    pub bin_id: Bytes,
    pub normalized_min: f64,
    pub normalized_max: f64,
    pub full_extent: bool,
}

impl BinRange {
    /// An unbinned range.
    pub fn new(normalized_min: f64, normalized_max: f64) -> Self {
        Self {
            bin_id: Bytes::new(),
            normalized_min,
            normalized_max,
            full_extent: false,
        }
    }

    pub fn binned(
        bin_id: Bytes,
        normalized_min: f64,
        normalized_max: f64,
        full_extent: bool,
    ) -> Self {
        Self {
            bin_id,
            normalized_min,
            normalized_max,
            full_extent,
        }
    }

    pub fn as_range(&self) -> NumericRange {
        NumericRange::new(self.normalized_min, self.normalized_max)
    }
}

pub type BinRanges = SmallVec<[BinRange; 2]>;

/// The domain of one indexed ordinate.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionDefinition {
    /// A bounded domain; values outside it are clamped.
    Basic { min: f64, max: f64 },
    /// `[-180, 180]`, wrapping at the antimeridian.
    Longitude,
    /// Values clamped to `[-90, 90]`. When `extended` the domain is
    /// `[-180, 180]` so latitude cells have the same size as longitude cells.
    Latitude { extended: bool },
    /// An unbounded dimension split into fixed-size periodic bins.
    Binned(BinningStrategy),
}

impl DimensionDefinition {
    pub fn basic(min: f64, max: f64) -> Self {
        Self::Basic { min, max }
    }

    pub fn longitude() -> Self {
        Self::Longitude
    }

    pub fn latitude() -> Self {
        Self::Latitude { extended: false }
    }

    pub fn time(binning: TemporalBinning) -> Self {
        Self::Binned(BinningStrategy::Temporal(binning))
    }

    /// Domain the space-filling curve sees. For binned dimensions this is
    /// the bin-local domain.
    pub fn bounds(&self) -> NumericRange {
        match self {
            Self::Basic { min, max } => NumericRange::new(*min, *max),
            Self::Longitude | Self::Latitude { extended: true } => {
                NumericRange::new(-180.0, 180.0)
            }
            Self::Latitude { extended: false } => NumericRange::new(-90.0, 90.0),
            Self::Binned(binning) => NumericRange::new(binning.bin_min(), binning.bin_max()),
        }
    }

    /// Width of the domain.
    pub fn range(&self) -> f64 {
        self.bounds().width()
    }

    /// Whether ranges may wrap or repeat across the domain boundary.
    pub fn is_periodic(&self) -> bool {
        matches!(self, Self::Longitude | Self::Binned(_))
    }

    fn clamp(&self, value: f64) -> f64 {
        match self {
            Self::Latitude { .. } => value.clamp(-90.0, 90.0),
            _ => {
                let bounds = self.bounds();
                value.clamp(bounds.min, bounds.max)
            }
        }
    }

    /// Map a domain value into `[0, 1]`.
    pub fn normalize(&self, value: f64) -> f64 {
        let bounds = self.bounds();
        ((self.clamp(value) - bounds.min) / bounds.width()).clamp(0.0, 1.0)
    }

    /// Map a value in `[0, 1]` back into the domain.
    pub fn denormalize(&self, value: f64) -> f64 {
        let bounds = self.bounds();
        bounds.min + value.clamp(0.0, 1.0) * bounds.width()
    }

    /// Split a raw range into bin-local ranges.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata::dimension::DimensionDefinition;
    /// use strata::NumericRange;
    ///
    /// // crossing the antimeridian yields one range on each side
    /// let ranges = DimensionDefinition::longitude()
    ///     .normalized_ranges(&NumericRange::new(170.0, -170.0))?;
    /// assert_eq!(ranges.len(), 2);
    /// assert_eq!((ranges[0].normalized_min, ranges[0].normalized_max), (-180.0, -170.0));
    /// assert_eq!((ranges[1].normalized_min, ranges[1].normalized_max), (170.0, 180.0));
    /// # Ok::<(), strata::IndexError>(())
    /// ```
    ///
    /// Fails with [`TooManyBins`](crate::IndexError::TooManyBins) when a binned
    /// range covers more than [`MAX_BINS`] bins.
    pub fn normalized_ranges(&self, range: &NumericRange) -> crate::error::Result<BinRanges> {
        let ranges: BinRanges = match self {
            Self::Longitude if !doubles_equal(range.min, range.max) => {
                let min = normalize_longitude(range.min);
                let max = normalize_longitude(range.max);
                // (0, -1) is the envelope of an empty geometry, not a crossing
                let empty_sentinel = doubles_equal(max, -1.0) && doubles_equal(min, 0.0);
                if max < min && !empty_sentinel {
                    smallvec![BinRange::new(-180.0, max), BinRange::new(min, 180.0)]
                } else {
                    smallvec![self.bounded_range(min, max)]
                }
            }
            Self::Binned(binning) => binning.normalized_ranges(range)?.into_iter().collect(),
            _ => smallvec![self.bounded_range(self.clamp(range.min), self.clamp(range.max))],
        };
        Ok(ranges)
    }

    fn bounded_range(&self, min: f64, max: f64) -> BinRange {
        let bounds = self.bounds();
        BinRange {
            full_extent: min <= bounds.min && max >= bounds.max,
            ..BinRange::new(min, max)
        }
    }

    /// Map a bin-local range back to raw values.
    pub fn denormalized_range(&self, bin_range: &BinRange) -> Result<NumericRange, DecodeError> {
        match self {
            Self::Binned(binning) => binning.denormalized_range(bin_range),
            _ => Ok(bin_range.as_range()),
        }
    }

    /// Width of the bin id this dimension contributes to a partition key.
    pub fn fixed_bin_id_size(&self) -> usize {
        match self {
            Self::Binned(binning) => binning.fixed_bin_id_size(),
            _ => 0,
        }
    }
}

/// Fold a longitude into `[-180, 180]`.
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let offset = lon + 180.0;
    (((offset.abs() / 360.0).ceil() * 360.0 + offset) % 360.0) - 180.0
}

const TAG_BASIC: u64 = 0;
const TAG_LONGITUDE: u64 = 1;
const TAG_LATITUDE: u64 = 2;
const TAG_BINNED: u64 = 3;

impl Persistable for DimensionDefinition {
    fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Self::Basic { min, max } => {
                persist::put_varint(buf, TAG_BASIC);
                buf.put_f64(*min);
                buf.put_f64(*max);
            }
            Self::Longitude => persist::put_varint(buf, TAG_LONGITUDE),
            Self::Latitude { extended } => {
                persist::put_varint(buf, TAG_LATITUDE);
                buf.put_u8(u8::from(*extended));
            }
            Self::Binned(binning) => {
                persist::put_varint(buf, TAG_BINNED);
                persist::put_nested(buf, binning);
            }
        }
    }

    fn read_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        match persist::get_varint(buf)? {
            TAG_BASIC => Ok(Self::Basic {
                min: persist::get_f64(buf, "dimension min")?,
                max: persist::get_f64(buf, "dimension max")?,
            }),
            TAG_LONGITUDE => Ok(Self::Longitude),
            TAG_LATITUDE => Ok(Self::Latitude {
                extended: persist::get_u8(buf, "latitude flags")? != 0,
            }),
            TAG_BINNED => Ok(Self::Binned(persist::get_nested(buf, "binning strategy")?)),
            tag => Err(DecodeError::UnknownTag {
                kind: "dimension definition",
                tag,
            }),
        }
    }
}
