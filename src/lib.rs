//! Multidimensional space-filling-curve indexing for range-scanning key-value stores.
//!
//! Geometry and time ranges go in as [`MultiDimensionalNumericData`]; row keys
//! ([`InsertionIds`]) and scan bounds ([`QueryRanges`]) come out. Scan results
//! are refined with a [`BasicQueryFilter`].
//!
//! ```rust
//! use strata::{BasicQueryFilter, CompareOperation, IndexConfig};
//! use strata::{MultiDimensionalNumericData, NumericRange};
//! use strata::dimension::TemporalUnit;
//!
//! let strategy = IndexConfig::spatial_temporal(TemporalUnit::Day).build()?;
//!
//! // New York, 2020-09-13T12:26:40Z
//! let row = MultiDimensionalNumericData::from_values(&[-74.0060, 40.7128, 1_600_000_000_000.0]);
//! let keys = strategy.insertion_ids(&row)?.composite_keys();
//!
//! let query = MultiDimensionalNumericData::new(vec![
//!     NumericRange::new(-75.0, -73.0),
//!     NumericRange::new(40.0, 41.0),
//!     NumericRange::new(1_599_955_200_000.0, 1_600_041_599_999.0),
//! ]);
//! let ranges = strategy.query_ranges(&query, 64)?;
//! assert!(keys.iter().all(|key| ranges.contains_key(key)));
//!
//! let filter = BasicQueryFilter::new(&query, strategy.dimensions().to_vec(), CompareOperation::Intersects)?;
//! assert!(filter.accept(&row)?);
//! # Ok::<(), strata::IndexError>(())
//! ```

pub mod builder;
pub mod config;
pub mod dimension;
pub mod error;
pub mod filter;
pub mod keys;
pub mod persist;
pub mod sfc;
pub mod tiered;

pub use builder::TieredStrategyBuilder;
pub use config::{DimensionConfig, IndexConfig};
pub use error::{DecodeError, IndexError, Result};

pub use geo::{Point, Rect};

pub use strata_types::coordinate::{Coordinate, MultiDimensionalCoordinates};
pub use strata_types::numeric::{MultiDimensionalNumericData, NumericRange};
pub use strata_types::range::ByteRange;

pub use dimension::{BinningStrategy, DimensionDefinition, TemporalBinning, TemporalUnit};
pub use filter::{BasicQueryFilter, CompareOperation};
pub use keys::{
    InsertionIds, QueryRanges, SinglePartitionInsertionIds, SinglePartitionQueryRanges,
    composite_key, split_composite_key,
};
pub use persist::Persistable;
pub use sfc::{SfcDimension, SfcType, SpaceFillingCurve};
pub use tiered::{KeyPartitioning, Tier, TierMetadata, TieredIndexStrategy, Tiering};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{IndexConfig, IndexError, Result, TieredIndexStrategy, TieredStrategyBuilder};

    pub use geo::{Point, Rect};

    pub use crate::{ByteRange, MultiDimensionalNumericData, NumericRange};

    pub use crate::{DimensionDefinition, TemporalBinning, TemporalUnit};

    pub use crate::{BasicQueryFilter, CompareOperation};

    pub use crate::{InsertionIds, KeyPartitioning, Persistable, QueryRanges, SfcType, Tiering};
}
