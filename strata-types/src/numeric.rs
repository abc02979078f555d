use geo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A closed numeric interval along one dimension.
///
/// A single value is represented as a range whose `min` equals its `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    /// Create a range from its bounds.
    ///
    /// The bounds are stored as given; `min > max` is a legal value (for
    /// example the `(0, -1)` envelope used for empty geometries).
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Create a degenerate range holding a single value.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_types::numeric::NumericRange;
    ///
    /// let value = NumericRange::value(42.0);
    /// assert!(!value.is_range());
    /// assert_eq!(value.centroid(), 42.0);
    /// ```
    pub fn value(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Midpoint of the range.
    pub fn centroid(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    /// Distance between the bounds.
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Whether the range spans more than a single value.
    pub fn is_range(&self) -> bool {
        self.min != self.max
    }

    /// Whether either bound is NaN.
    pub fn is_nan(&self) -> bool {
        self.min.is_nan() || self.max.is_nan()
    }

    /// Check if a value lies within the closed range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Check if two closed ranges share at least one value.
    pub fn intersects(&self, other: &NumericRange) -> bool {
        !(self.max < other.min || self.min > other.max)
    }
}

impl From<(f64, f64)> for NumericRange {
    fn from((min, max): (f64, f64)) -> Self {
        Self::new(min, max)
    }
}

/// An ordered sequence of per-dimension numeric ranges.
///
/// The position of each range is significant: it must match the order of the
/// dimension definitions of the index strategy the data is handed to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiDimensionalNumericData {
    ranges: Vec<NumericRange>,
}

impl MultiDimensionalNumericData {
    pub fn new(ranges: Vec<NumericRange>) -> Self {
        Self { ranges }
    }

    /// Build a degenerate hyper-rectangle around a single point.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_types::numeric::MultiDimensionalNumericData;
    ///
    /// let point = MultiDimensionalNumericData::from_values(&[-74.0060, 40.7128]);
    /// assert_eq!(point.mins(), vec![-74.0060, 40.7128]);
    /// assert_eq!(point.mins(), point.maxes());
    /// ```
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            ranges: values.iter().copied().map(NumericRange::value).collect(),
        }
    }

    /// Longitude (x) and latitude (y) ranges of a rectangle, in that order.
    pub fn from_rect(rect: &Rect<f64>) -> Self {
        Self {
            ranges: vec![
                NumericRange::new(rect.min().x, rect.max().x),
                NumericRange::new(rect.min().y, rect.max().y),
            ],
        }
    }

    /// Longitude (x) and latitude (y) of a point, in that order.
    pub fn from_point(point: &Point<f64>) -> Self {
        Self::from_values(&[point.x(), point.y()])
    }

    /// Append a range for the next dimension (typically time).
    pub fn with_range(mut self, range: NumericRange) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn ranges(&self) -> &[NumericRange] {
        &self.ranges
    }

    pub fn get(&self, dimension: usize) -> Option<&NumericRange> {
        self.ranges.get(dimension)
    }

    pub fn dimension_count(&self) -> usize {
        self.ranges.len()
    }

    /// True when there is nothing to index: no dimensions, or a dimension
    /// without a value (NaN bound).
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(NumericRange::is_nan)
    }

    pub fn mins(&self) -> Vec<f64> {
        self.ranges.iter().map(|r| r.min).collect()
    }

    pub fn maxes(&self) -> Vec<f64> {
        self.ranges.iter().map(|r| r.max).collect()
    }

    pub fn centroids(&self) -> Vec<f64> {
        self.ranges.iter().map(NumericRange::centroid).collect()
    }

    /// Check if every dimension of `self` intersects the same dimension of `other`.
    pub fn intersects(&self, other: &MultiDimensionalNumericData) -> bool {
        self.ranges.len() == other.ranges.len()
            && self
                .ranges
                .iter()
                .zip(&other.ranges)
                .all(|(a, b)| a.intersects(b))
    }
}

impl From<Vec<NumericRange>> for MultiDimensionalNumericData {
    fn from(ranges: Vec<NumericRange>) -> Self {
        Self::new(ranges)
    }
}

impl FromIterator<NumericRange> for MultiDimensionalNumericData {
    fn from_iter<I: IntoIterator<Item = NumericRange>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_basics() {
        let range = NumericRange::new(10.0, 20.0);
        assert_eq!(range.centroid(), 15.0);
        assert_eq!(range.width(), 10.0);
        assert!(range.is_range());
        assert!(range.contains(10.0));
        assert!(range.contains(20.0));
        assert!(!range.contains(20.5));
    }

    #[test]
    fn test_range_intersects_touching() {
        let a = NumericRange::new(0.0, 5.0);
        let b = NumericRange::new(5.0, 10.0);
        let c = NumericRange::new(5.1, 10.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_from_rect_orders_longitude_first() {
        let rect = Rect::new(geo::coord! { x: -10.0, y: 20.0 }, geo::coord! { x: 5.0, y: 30.0 });
        let data = MultiDimensionalNumericData::from_rect(&rect);
        assert_eq!(data.mins(), vec![-10.0, 20.0]);
        assert_eq!(data.maxes(), vec![5.0, 30.0]);
    }

    #[test]
    fn test_empty_detection() {
        assert!(MultiDimensionalNumericData::default().is_empty());
        let missing = MultiDimensionalNumericData::new(vec![
            NumericRange::new(0.0, 1.0),
            NumericRange::value(f64::NAN),
        ]);
        assert!(missing.is_empty());
        assert!(!MultiDimensionalNumericData::from_values(&[1.0]).is_empty());
    }
}
