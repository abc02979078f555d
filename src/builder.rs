//! Builder for tiered index strategies
//!
//! Assembles a [`TieredIndexStrategy`] from dimension definitions directly,
//! for definitions a configuration file cannot express (custom bin origins,
//! extended latitude bounds mixed with binned attributes, and so on).

use crate::config::IndexConfig;
use crate::dimension::DimensionDefinition;
use crate::error::{IndexError, Result};
use crate::sfc::SfcType;
use crate::tiered::{DEFAULT_MAX_DUPLICATES_PER_DIMENSION, KeyPartitioning, TieredIndexStrategy, Tiering};

/// Builder for a tiered index strategy.
#[derive(Debug, Clone)]
pub struct TieredStrategyBuilder {
    dimensions: Vec<DimensionDefinition>,
    curve: SfcType,
    tiering: Option<Tiering>,
    max_duplicates_per_dimension: u64,
    partitioning: KeyPartitioning,
}

impl TieredStrategyBuilder {
    /// Create a builder with no dimensions and a Hilbert curve.
    pub fn new() -> Self {
        Self {
            dimensions: Vec::new(),
            curve: SfcType::default(),
            tiering: None,
            max_duplicates_per_dimension: DEFAULT_MAX_DUPLICATES_PER_DIMENSION,
            partitioning: KeyPartitioning::default(),
        }
    }

    /// Seed the builder from a configuration.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        config.validate().map_err(IndexError::InvalidConfig)?;
        let dimensions = config
            .dimensions
            .iter()
            .map(|d| d.to_definition())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            dimensions,
            curve: config.curve,
            tiering: Some(config.tiering.clone()),
            max_duplicates_per_dimension: config.max_duplicates_per_dimension,
            partitioning: config.partitioning,
        })
    }

    /// Append a dimension. Data supplies ranges in the order dimensions are added.
    pub fn dimension(mut self, definition: DimensionDefinition) -> Self {
        self.dimensions.push(definition);
        self
    }

    pub fn dimensions(mut self, definitions: impl IntoIterator<Item = DimensionDefinition>) -> Self {
        self.dimensions.extend(definitions);
        self
    }

    pub fn curve(mut self, curve: SfcType) -> Self {
        self.curve = curve;
        self
    }

    pub fn tiering(mut self, tiering: Tiering) -> Self {
        self.tiering = Some(tiering);
        self
    }

    pub fn max_duplicates_per_dimension(mut self, max_duplicates: u64) -> Self {
        self.max_duplicates_per_dimension = max_duplicates;
        self
    }

    pub fn partitioning(mut self, partitioning: KeyPartitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// Build the strategy. Without an explicit tiering, every dimension gets
    /// full incremental tiers up to 31 bits.
    pub fn build(self) -> Result<TieredIndexStrategy> {
        if self.dimensions.is_empty() {
            return Err(IndexError::InvalidConfig(
                "at least one dimension must be added".into(),
            ));
        }
        let tiering = self
            .tiering
            .unwrap_or_else(|| Tiering::full_incremental(vec![31; self.dimensions.len()]));
        TieredIndexStrategy::from_tiering(
            self.curve,
            self.dimensions,
            &tiering,
            self.max_duplicates_per_dimension,
            self.partitioning,
        )
    }
}

impl Default for TieredStrategyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
