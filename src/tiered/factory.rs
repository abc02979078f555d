use crate::error::{IndexError, Result};
use crate::sfc::MAX_BITS_PER_DIMENSION;
use serde::{Deserialize, Serialize};

/// How the precision of each tier is derived.
///
/// Every variant yields per-dimension bits for each tier, coarsest first.
/// A tier's id is the largest precision it gives any dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tiering {
    /// One tier per bit of the least precise dimension, from the coarsest
    /// usable precision up to `max_bits`.
    FullIncremental { max_bits: Vec<u32> },
    /// `tiers` tiers spaced evenly between zero bits and `max_bits`.
    EqualInterval { max_bits: Vec<u32>, tiers: usize },
    /// Explicit per-dimension bits of every tier.
    Defined { bits_per_level: Vec<Vec<u32>> },
    /// A single tier at `bits`.
    SingleTier { bits: Vec<u32> },
}

impl Tiering {
    pub fn full_incremental(max_bits: impl Into<Vec<u32>>) -> Self {
        Self::FullIncremental {
            max_bits: max_bits.into(),
        }
    }

    pub fn equal_interval(max_bits: impl Into<Vec<u32>>, tiers: usize) -> Self {
        Self::EqualInterval {
            max_bits: max_bits.into(),
            tiers,
        }
    }

    pub fn single_tier(bits: impl Into<Vec<u32>>) -> Self {
        Self::SingleTier { bits: bits.into() }
    }

    /// Per-dimension bits of every tier, coarsest first.
    pub fn tier_bits(&self, dimension_count: usize) -> Result<Vec<Vec<u32>>> {
        let mut levels = match self {
            Self::FullIncremental { max_bits } => {
                check_width(max_bits, dimension_count)?;
                let steps = max_bits.iter().copied().min().unwrap_or(0) + 1;
                (0..steps)
                    .map(|level| {
                        max_bits
                            .iter()
                            .map(|&bits| bits - (steps - level - 1))
                            .collect()
                    })
                    .collect()
            }
            Self::EqualInterval { max_bits, tiers } => {
                check_width(max_bits, dimension_count)?;
                match *tiers {
                    0 => {
                        return Err(IndexError::InvalidConfig(
                            "equal interval tiering needs at least one tier".into(),
                        ));
                    }
                    1 => vec![max_bits.clone()],
                    tiers => (0..tiers)
                        .map(|level| {
                            max_bits
                                .iter()
                                .map(|&bits| {
                                    (bits as f64 / (tiers - 1) as f64 * level as f64) as u32
                                })
                                .collect()
                        })
                        .collect(),
                }
            }
            Self::Defined { bits_per_level } => {
                for bits in bits_per_level {
                    check_width(bits, dimension_count)?;
                }
                bits_per_level.clone()
            }
            Self::SingleTier { bits } => {
                check_width(bits, dimension_count)?;
                vec![bits.clone()]
            }
        };

        if levels.is_empty() {
            return Err(IndexError::InvalidConfig("no tiers configured".into()));
        }
        levels.sort_by_key(|bits| (tier_id_of(bits), bits.iter().sum::<u32>()));
        levels.dedup();
        if let Some(pair) = levels
            .windows(2)
            .find(|pair| tier_id_of(&pair[0]) == tier_id_of(&pair[1]))
        {
            return Err(IndexError::InvalidConfig(format!(
                "tiers {:?} and {:?} would share tier id {}",
                pair[0],
                pair[1],
                tier_id_of(&pair[0])
            )));
        }
        Ok(levels)
    }
}

/// Tier id of a precision set: its largest per-dimension precision.
pub(crate) fn tier_id_of(bits: &[u32]) -> u8 {
    bits.iter().copied().max().unwrap_or(0) as u8
}

fn check_width(bits: &[u32], dimension_count: usize) -> Result<()> {
    if bits.len() != dimension_count {
        return Err(IndexError::InvalidConfig(format!(
            "expected bits for {dimension_count} dimensions, got {}",
            bits.len()
        )));
    }
    if let Some(bits) = bits.iter().find(|&&b| b > MAX_BITS_PER_DIMENSION) {
        return Err(IndexError::InvalidConfig(format!(
            "{bits} bits exceeds the per-dimension limit of {MAX_BITS_PER_DIMENSION}"
        )));
    }
    Ok(())
}
