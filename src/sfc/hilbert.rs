//! Compact Hilbert index.
//!
//! Dimensions may carry different precisions. At each level, from the most
//! significant bit down, only the dimensions that still have bits at that
//! level take part, and the index grows by exactly that many bits. With equal
//! precisions this is the standard Hilbert curve.
//!
//! State carried between levels is the entry point `e` and the intra-cell
//! direction `d` of the current sub-hypercube.

use super::{IndexRange, SfcDimension, low_mask, merge_contiguous, merge_to_budget};
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq)]
pub struct HilbertSfc {
    dimensions: Vec<SfcDimension>,
    total_bits: u32,
    max_bits: u32,
}

/// Orientation of a sub-hypercube.
#[derive(Debug, Clone, Copy, Default)]
struct Orientation {
    entry: u64,
    direction: u32,
}

/// Step taken inside a sub-hypercube at one level.
struct LevelStep {
    /// Positions (rotated) of the dimensions that still have bits.
    free_mask: u64,
    free_bits: u32,
    /// Fixed gray code bits of the exhausted dimensions.
    fixed: u64,
}

impl HilbertSfc {
    pub(super) fn from_validated(dimensions: Vec<SfcDimension>) -> Self {
        let total_bits = dimensions.iter().map(SfcDimension::bits).sum();
        let max_bits = dimensions
            .iter()
            .map(SfcDimension::bits)
            .max()
            .unwrap_or(0);
        Self {
            dimensions,
            total_bits,
            max_bits,
        }
    }

    pub fn dimensions(&self) -> &[SfcDimension] {
        &self.dimensions
    }

    fn n(&self) -> u32 {
        self.dimensions.len() as u32
    }

    fn level_step(&self, level: u32, orientation: Orientation) -> LevelStep {
        let n = self.n();
        let mut mask = 0u64;
        for (j, dim) in self.dimensions.iter().enumerate() {
            if dim.bits() > level {
                mask |= 1 << j;
            }
        }
        let shift = orientation.direction + 1;
        let free_mask = rotate_right(mask, shift, n);
        LevelStep {
            free_mask,
            free_bits: free_mask.count_ones(),
            fixed: rotate_right(orientation.entry, shift, n) & !free_mask & dims_mask(n),
        }
    }

    /// Orientation of the child reached through gray-rank `w`.
    fn descend(&self, orientation: Orientation, w: u64) -> Orientation {
        let n = self.n();
        Orientation {
            entry: orientation.entry ^ rotate_left(entry_point(w), orientation.direction + 1, n),
            direction: (orientation.direction + intra_direction(w, n) + 1) % n,
        }
    }

    /// Bits of the cell coordinates at `level`, one per dimension, for the
    /// child with gray code `g`.
    fn level_bits(&self, g: u64, orientation: Orientation) -> u64 {
        rotate_left(g, orientation.direction + 1, self.n()) ^ orientation.entry
    }

    pub(super) fn index_of_cells(&self, cells: &[u64]) -> u128 {
        let n = self.n();
        let mut index = 0u128;
        let mut orientation = Orientation::default();
        for level in (0..self.max_bits).rev() {
            let step = self.level_step(level, orientation);
            let mut bits = 0u64;
            for (j, &cell) in cells.iter().enumerate() {
                bits |= ((cell >> level) & 1) << j;
            }
            let w = gray_inverse(rotate_right(bits ^ orientation.entry, orientation.direction + 1, n));
            let rank = gray_rank(step.free_mask, w, n);
            orientation = self.descend(orientation, w);
            index = (index << step.free_bits) | rank as u128;
        }
        index
    }

    pub(super) fn cells_of_index(&self, index: u128) -> Vec<u64> {
        let n = self.n();
        let mut cells = vec![0u64; self.dimensions.len()];
        let mut orientation = Orientation::default();
        let mut consumed = 0u32;
        for level in (0..self.max_bits).rev() {
            let step = self.level_step(level, orientation);
            consumed += step.free_bits;
            let rank = ((index >> (self.total_bits - consumed)) & low_mask(step.free_bits)) as u64;
            let (w, g) = gray_rank_inverse(step.free_mask, step.fixed, rank, n, step.free_bits);
            let bits = self.level_bits(g, orientation);
            for (j, cell) in cells.iter_mut().enumerate() {
                *cell |= ((bits >> j) & 1) << level;
            }
            orientation = self.descend(orientation, w);
        }
        cells
    }

    /// Index ranges covering the inclusive cell box `query`.
    ///
    /// Cells are refined level by level. Cells disjoint from the box are
    /// dropped and contained cells are emitted whole. Refinement stops at the
    /// first level whose output would exceed `max_ranges`; the partially
    /// covered cells of that level are then emitted whole and the result is
    /// merged down to the budget.
    pub(super) fn decompose(&self, query: &[(u64, u64)], max_ranges: usize) -> Vec<IndexRange> {
        let n = self.n();
        let mut done: Vec<IndexRange> = Vec::new();
        let mut pending = vec![Cell {
            prefix: 0,
            orientation: Orientation::default(),
            origin: SmallVec::from_elem(0, query.len()),
            range: IndexRange::new(0, low_mask(self.total_bits)),
        }];

        for level in (0..self.max_bits).rev() {
            let remaining: u32 = self.dimensions.iter().map(|d| d.bits().min(level)).sum();
            let mut next = Vec::new();
            for cell in &pending {
                let step = self.level_step(level, cell.orientation);
                for rank in 0..(1u64 << step.free_bits) {
                    let (w, g) = gray_rank_inverse(step.free_mask, step.fixed, rank, n, step.free_bits);
                    let bits = self.level_bits(g, cell.orientation);

                    let mut disjoint = false;
                    let mut contained = true;
                    let mut origin = cell.origin.clone();
                    for (j, ((lo, hi), dim)) in query.iter().zip(&self.dimensions).enumerate() {
                        origin[j] |= ((bits >> j) & 1) << level;
                        let extent = low_mask(dim.bits().min(level)) as u64;
                        let (cell_lo, cell_hi) = (origin[j], origin[j] + extent);
                        if cell_hi < *lo || cell_lo > *hi {
                            disjoint = true;
                            break;
                        }
                        contained &= cell_lo >= *lo && cell_hi <= *hi;
                    }
                    if disjoint {
                        continue;
                    }

                    let prefix = (cell.prefix << step.free_bits) | rank as u128;
                    let range = IndexRange::new(prefix << remaining, (prefix << remaining) | low_mask(remaining));
                    if contained || level == 0 {
                        done.push(range);
                    } else {
                        next.push(Cell {
                            prefix,
                            orientation: self.descend(cell.orientation, w),
                            origin,
                            range,
                        });
                    }
                }
            }
            pending = next;

            if pending.is_empty() {
                break;
            }
            let candidates = done.iter().copied().chain(pending.iter().map(|c| c.range)).collect();
            if merge_contiguous(candidates).len() > max_ranges || level == 0 {
                break;
            }
        }

        done.extend(pending.iter().map(|c| c.range));
        merge_to_budget(merge_contiguous(done), max_ranges)
    }
}

struct Cell {
    prefix: u128,
    orientation: Orientation,
    origin: SmallVec<[u64; 4]>,
    range: IndexRange,
}

fn dims_mask(n: u32) -> u64 {
    (1u64 << n) - 1
}

fn rotate_right(x: u64, shift: u32, n: u32) -> u64 {
    let shift = shift % n;
    if shift == 0 {
        return x;
    }
    ((x >> shift) | (x << (n - shift))) & dims_mask(n)
}

fn rotate_left(x: u64, shift: u32, n: u32) -> u64 {
    let shift = shift % n;
    if shift == 0 {
        return x;
    }
    ((x << shift) | (x >> (n - shift))) & dims_mask(n)
}

fn gray_code(i: u64) -> u64 {
    i ^ (i >> 1)
}

fn gray_inverse(g: u64) -> u64 {
    let mut i = g;
    let mut shift = 1;
    while shift < 64 && (g >> shift) != 0 {
        i ^= g >> shift;
        shift += 1;
    }
    i
}

fn entry_point(w: u64) -> u64 {
    if w == 0 {
        0
    } else {
        gray_code(2 * ((w - 1) / 2))
    }
}

fn intra_direction(w: u64, n: u32) -> u32 {
    if w == 0 {
        0
    } else if w % 2 == 0 {
        (w - 1).trailing_ones() % n
    } else {
        w.trailing_ones() % n
    }
}

/// Bits of `w` at the free positions, highest first.
fn gray_rank(free_mask: u64, w: u64, n: u32) -> u64 {
    let mut rank = 0u64;
    for k in (0..n).rev() {
        if (free_mask >> k) & 1 == 1 {
            rank = (rank << 1) | ((w >> k) & 1);
        }
    }
    rank
}

/// Rebuild `w` and its gray code from a rank and the fixed bits.
fn gray_rank_inverse(free_mask: u64, fixed: u64, rank: u64, n: u32, free_bits: u32) -> (u64, u64) {
    let (mut w, mut g) = (0u64, 0u64);
    let mut remaining = free_bits;
    let mut previous = 0u64;
    for k in (0..n).rev() {
        let bit = if (free_mask >> k) & 1 == 1 {
            remaining -= 1;
            let bit = (rank >> remaining) & 1;
            g |= (bit ^ previous) << k;
            bit
        } else {
            let gray_bit = (fixed >> k) & 1;
            g |= gray_bit << k;
            gray_bit ^ previous
        };
        w |= bit << k;
        previous = bit;
    }
    (w, g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionDefinition;
    use crate::sfc::{SfcType, SpaceFillingCurve};
    use strata_types::numeric::{MultiDimensionalNumericData, NumericRange};

    fn lat_lon(bits: u32) -> SpaceFillingCurve {
        SpaceFillingCurve::new(
            SfcType::Hilbert,
            vec![
                SfcDimension::new(DimensionDefinition::latitude(), bits),
                SfcDimension::new(DimensionDefinition::longitude(), bits),
            ],
        )
        .unwrap()
    }

    fn box_query(lon: (f64, f64), lat: (f64, f64)) -> MultiDimensionalNumericData {
        MultiDimensionalNumericData::new(vec![
            NumericRange::new(lat.0, lat.1),
            NumericRange::new(lon.0, lon.1),
        ])
    }

    #[test]
    fn test_known_ids() {
        let curve = lat_lon(31);
        assert_eq!(curve.index_of(&[90.0, 180.0]).unwrap(), 3_074_457_345_618_258_602);
        assert_eq!(curve.index_of(&[0.0, 0.0]).unwrap(), 768_614_336_404_564_650);
        assert_eq!(curve.index_of(&[-90.0, -180.0]).unwrap(), 0);
        assert_eq!(curve.encode(&[-90.0, -180.0]).unwrap().as_ref(), &[0u8; 8]);
    }

    #[test]
    fn test_round_trip_within_cell() {
        let curve = lat_lon(31);
        let eps_lat = 180.0 / 2f64.powi(31);
        let eps_lon = 360.0 / 2f64.powi(31);
        for (lat, lon) in [
            (40.7128, -74.0060),
            (-33.8688, 151.2093),
            (0.0, 0.0),
            (89.999, -179.999),
            (-12.5, 45.25),
        ] {
            let id = curve.encode(&[lat, lon]).unwrap();
            let decoded = curve.decode(&id).unwrap();
            let lat_range = decoded.get(0).unwrap();
            let lon_range = decoded.get(1).unwrap();
            assert!(lat_range.min - eps_lat <= lat && lat <= lat_range.max + eps_lat);
            assert!(lon_range.min - eps_lon <= lon && lon <= lon_range.max + eps_lon);
            assert!(lat_range.width() <= eps_lat * 1.0001);
        }
    }

    #[test]
    fn test_unequal_precision_round_trip() {
        let curve = SpaceFillingCurve::new(
            SfcType::Hilbert,
            vec![
                SfcDimension::new(DimensionDefinition::basic(0.0, 8.0), 3),
                SfcDimension::new(DimensionDefinition::basic(0.0, 4.0), 2),
                SfcDimension::new(DimensionDefinition::basic(0.0, 16.0), 4),
            ],
        )
        .unwrap();
        let SpaceFillingCurve::Hilbert(hilbert) = &curve else {
            unreachable!()
        };
        let mut seen = std::collections::HashSet::new();
        for a in 0..8u64 {
            for b in 0..4u64 {
                for c in 0..16u64 {
                    let index = hilbert.index_of_cells(&[a, b, c]);
                    assert!(index < 512);
                    assert_eq!(hilbert.cells_of_index(index), vec![a, b, c]);
                    seen.insert(index);
                }
            }
        }
        assert_eq!(seen.len(), 512);
    }

    #[test]
    fn test_consecutive_ids_are_adjacent_cells() {
        let curve = lat_lon(4);
        let SpaceFillingCurve::Hilbert(hilbert) = &curve else {
            unreachable!()
        };
        for index in 0..255u128 {
            let a = hilbert.cells_of_index(index);
            let b = hilbert.cells_of_index(index + 1);
            let distance: u64 = a.iter().zip(&b).map(|(x, y)| x.abs_diff(*y)).sum();
            assert_eq!(distance, 1, "ids {index} and {} are not neighbours", index + 1);
        }
    }

    #[test]
    fn test_decompose_respects_budget() {
        let curve = lat_lon(31);
        let query = box_query((10.0, 57.0), (25.0, 50.0));
        assert_eq!(curve.decompose(&query, true, 20).unwrap().len(), 20);
        assert_eq!(curve.decompose(&query, true, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_single_range_covers_query_corners() {
        let curve = lat_lon(31);
        let query = box_query((10.0, 57.0), (25.0, 50.0));
        let ranges = curve.decompose(&query, true, 1).unwrap();
        let range = &ranges.ranges()[0];
        for corner in [[25.0, 10.0], [25.0, 57.0], [50.0, 10.0], [50.0, 57.0], [37.0, 33.0]] {
            let id = curve.encode(&corner).unwrap();
            assert!(range.contains(&id), "{corner:?} outside the single range");
        }
    }

    #[test]
    fn test_full_decomposition_covers_every_cell() {
        let curve = SpaceFillingCurve::new(
            SfcType::Hilbert,
            vec![
                SfcDimension::new(DimensionDefinition::basic(0.0, 16.0), 4),
                SfcDimension::new(DimensionDefinition::basic(0.0, 8.0), 3),
            ],
        )
        .unwrap();
        let query = MultiDimensionalNumericData::new(vec![
            NumericRange::new(2.5, 11.5),
            NumericRange::new(1.5, 5.5),
        ]);
        let ranges = curve.decompose_indices(&query, true, usize::MAX).unwrap();
        let covered: u128 = ranges.iter().map(IndexRange::id_count).sum();
        // cells 2..=11 by 1..=5
        assert_eq!(covered, 10 * 5);
        for x in [2.5, 7.0, 11.5] {
            for y in [1.5, 3.0, 5.5] {
                let index = curve.index_of(&[x, y]).unwrap();
                assert!(ranges.iter().any(|r| r.start <= index && index <= r.end));
            }
        }
    }

    #[test]
    fn test_decomposition_ranges_are_sorted_and_disjoint() {
        let curve = lat_lon(16);
        let query = box_query((-18.0, 18.0), (-45.0, 45.0));
        let ranges = curve.decompose_indices(&query, true, 50).unwrap();
        assert!(ranges.len() <= 50);
        for pair in ranges.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn test_gray_helpers() {
        for i in 0..64u64 {
            assert_eq!(gray_inverse(gray_code(i)), i);
        }
        assert_eq!(rotate_right(0b001, 1, 3), 0b100);
        assert_eq!(rotate_left(0b100, 1, 3), 0b001);
        assert_eq!(rotate_left(0b1, 5, 1), 0b1);
    }
}
