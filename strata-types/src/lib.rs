//! # strata-types
//!
//! Value types exchanged between the Strata index core and its collaborators.
//!
//! - **Numeric types**: `NumericRange`, `MultiDimensionalNumericData`
//! - **Key types**: `ByteRange`
//! - **Coordinate types**: `Coordinate`, `MultiDimensionalCoordinates`
//!
//! Upstream geometry code hands the index a `MultiDimensionalNumericData`
//! (one ordered min/max pair per indexed dimension); the storage engine gets
//! `ByteRange`s back as scan bounds. All types are serializable with Serde.
//!
//! ## Examples
//!
//! ```rust
//! use strata_types::numeric::{MultiDimensionalNumericData, NumericRange};
//! use geo::Rect;
//!
//! // A bounding box around Manhattan, longitude first
//! let rect = Rect::new(
//!     geo::coord! { x: -74.0479, y: 40.6829 },
//!     geo::coord! { x: -73.9067, y: 40.8820 },
//! );
//! let data = MultiDimensionalNumericData::from_rect(&rect)
//!     .with_range(NumericRange::new(1_600_000_000_000.0, 1_600_000_360_000.0));
//! assert_eq!(data.dimension_count(), 3);
//! ```

pub mod coordinate;
pub mod numeric;
pub mod range;
