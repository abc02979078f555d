use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An integer cell along one dimension of a space-filling curve.
///
/// `bin_id` is empty unless the dimension is periodic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub coordinate: u64,
    pub bin_id: Bytes,
}

impl Coordinate {
    pub fn new(coordinate: u64, bin_id: impl Into<Bytes>) -> Self {
        Self {
            coordinate,
            bin_id: bin_id.into(),
        }
    }
}

/// The integer cell of every dimension a row key resolves to, tagged with
/// the identifier (tier byte) of the curve that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultiDimensionalCoordinates {
    pub multi_dimensional_id: Bytes,
    pub coordinates: Vec<Coordinate>,
}

impl MultiDimensionalCoordinates {
    pub fn new(multi_dimensional_id: impl Into<Bytes>, coordinates: Vec<Coordinate>) -> Self {
        Self {
            multi_dimensional_id: multi_dimensional_id.into(),
            coordinates,
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.coordinates.len()
    }

    pub fn coordinate(&self, dimension: usize) -> Option<&Coordinate> {
        self.coordinates.get(dimension)
    }
}
