//! Serializable index configuration.

use crate::dimension::{
    BinningStrategy, DimensionDefinition, IntervalBinning, TemporalBinning, TemporalUnit,
};
use crate::error::{IndexError, Result};
use crate::sfc::{MAX_DIMENSIONS, MAX_TOTAL_BITS, SfcType};
use crate::tiered::{KeyPartitioning, TieredIndexStrategy, Tiering};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One indexed dimension as it appears in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DimensionConfig {
    Longitude,
    Latitude {
        #[serde(default)]
        extended: bool,
    },
    /// A bounded numeric attribute.
    Numeric { min: f64, max: f64 },
    /// Milliseconds since the Unix epoch, binned by `unit` or by an explicit
    /// `bin_size_millis`.
    Time {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<TemporalUnit>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bin_size_millis: Option<i64>,
        #[serde(default)]
        origin_millis: i64,
    },
    /// An unbounded numeric attribute binned every `interval`.
    BinnedNumeric { interval: f64 },
}

impl DimensionConfig {
    pub fn time(unit: TemporalUnit) -> Self {
        Self::Time {
            unit: Some(unit),
            bin_size_millis: None,
            origin_millis: 0,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Numeric { min, max } => {
                if !(min.is_finite() && max.is_finite()) {
                    return Err("Numeric dimension bounds must be finite".to_string());
                }
                if min >= max {
                    return Err(format!(
                        "Numeric dimension min {min} must be below max {max}"
                    ));
                }
            }
            Self::Time {
                unit,
                bin_size_millis,
                ..
            } => match (unit, bin_size_millis) {
                (Some(_), Some(_)) => {
                    return Err("Time dimension takes either unit or bin_size_millis".to_string());
                }
                (None, None) => {
                    return Err("Time dimension needs a unit or bin_size_millis".to_string());
                }
                (None, Some(size)) if *size <= 0 => {
                    return Err("Time bin size must be positive".to_string());
                }
                _ => {}
            },
            Self::BinnedNumeric { interval } => {
                if !(interval.is_finite() && *interval > 0.0) {
                    return Err("Bin interval must be positive and finite".to_string());
                }
            }
            Self::Longitude | Self::Latitude { .. } => {}
        }
        Ok(())
    }

    pub fn to_definition(&self) -> Result<DimensionDefinition> {
        self.validate().map_err(IndexError::InvalidConfig)?;
        Ok(match self {
            Self::Longitude => DimensionDefinition::Longitude,
            Self::Latitude { extended } => DimensionDefinition::Latitude {
                extended: *extended,
            },
            Self::Numeric { min, max } => DimensionDefinition::basic(*min, *max),
            Self::Time {
                unit,
                bin_size_millis,
                origin_millis,
            } => {
                let size = match (unit, bin_size_millis) {
                    (Some(unit), _) => unit.millis(),
                    (None, Some(size)) => *size,
                    (None, None) => 0,
                };
                DimensionDefinition::time(TemporalBinning::new(*origin_millis, size)?)
            }
            Self::BinnedNumeric { interval } => {
                DimensionDefinition::Binned(BinningStrategy::Interval(IntervalBinning::new(*interval)?))
            }
        })
    }
}

/// Index configuration.
///
/// # Example
///
/// ```rust
/// use strata::IndexConfig;
///
/// let json = r#"{
///     "dimensions": [
///         { "type": "longitude" },
///         { "type": "latitude" },
///         { "type": "time", "unit": "day" }
///     ],
///     "curve": "hilbert",
///     "tiering": { "type": "single_tier", "bits": [20, 20, 20] },
///     "max_ranges": 500
/// }"#;
/// let config = IndexConfig::from_json_str(json)?;
/// assert_eq!(config.max_duplicates_per_dimension, 2);
/// let strategy = config.build()?;
/// assert_eq!(strategy.partition_key_len(), 5);
/// # Ok::<(), strata::IndexError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Indexed dimensions, in the order data supplies them.
    pub dimensions: Vec<DimensionConfig>,

    #[serde(default)]
    pub curve: SfcType,

    pub tiering: Tiering,

    /// Range budget callers should pass to query planning
    #[serde(default = "IndexConfig::default_max_ranges")]
    pub max_ranges: usize,

    /// Cells an entry may span per dimension before it moves to a coarser tier
    #[serde(default = "IndexConfig::default_max_duplicates_per_dimension")]
    pub max_duplicates_per_dimension: u64,

    #[serde(default)]
    pub partitioning: KeyPartitioning,
}

impl IndexConfig {
    const fn default_max_ranges() -> usize {
        2000
    }

    const fn default_max_duplicates_per_dimension() -> u64 {
        crate::tiered::DEFAULT_MAX_DUPLICATES_PER_DIMENSION
    }

    pub fn new(dimensions: Vec<DimensionConfig>, tiering: Tiering) -> Self {
        Self {
            dimensions,
            curve: SfcType::default(),
            tiering,
            max_ranges: Self::default_max_ranges(),
            max_duplicates_per_dimension: Self::default_max_duplicates_per_dimension(),
            partitioning: KeyPartitioning::default(),
        }
    }

    /// Longitude and latitude at 31 bits each, one tier per bit.
    pub fn spatial() -> Self {
        Self::new(
            vec![
                DimensionConfig::Longitude,
                DimensionConfig::Latitude { extended: false },
            ],
            Tiering::full_incremental([31, 31]),
        )
    }

    /// Longitude, latitude and time binned by `unit`, 20 bits each in a
    /// single tier.
    pub fn spatial_temporal(unit: TemporalUnit) -> Self {
        Self::new(
            vec![
                DimensionConfig::Longitude,
                DimensionConfig::Latitude { extended: false },
                DimensionConfig::time(unit),
            ],
            Tiering::single_tier([20, 20, 20]),
        )
    }

    pub fn with_curve(mut self, curve: SfcType) -> Self {
        self.curve = curve;
        self
    }

    pub fn with_tiering(mut self, tiering: Tiering) -> Self {
        self.tiering = tiering;
        self
    }

    pub fn with_max_ranges(mut self, max_ranges: usize) -> Self {
        self.max_ranges = max_ranges;
        self
    }

    pub fn with_max_duplicates_per_dimension(mut self, max_duplicates: u64) -> Self {
        self.max_duplicates_per_dimension = max_duplicates;
        self
    }

    pub fn with_partitioning(mut self, partitioning: KeyPartitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dimensions.is_empty() {
            return Err("At least one dimension must be configured".to_string());
        }
        if self.dimensions.len() > MAX_DIMENSIONS {
            return Err(format!("At most {MAX_DIMENSIONS} dimensions are supported"));
        }
        for dimension in &self.dimensions {
            dimension.validate()?;
        }

        let levels = self
            .tiering
            .tier_bits(self.dimensions.len())
            .map_err(|e| e.to_string())?;
        if let Some(bits) = levels
            .iter()
            .find(|bits| bits.iter().sum::<u32>() > MAX_TOTAL_BITS)
        {
            return Err(format!(
                "Tier precision {bits:?} exceeds {MAX_TOTAL_BITS} total bits"
            ));
        }

        if self.max_ranges == 0 {
            return Err("Max ranges must be greater than zero".to_string());
        }
        if self.max_duplicates_per_dimension == 0 {
            return Err("Max duplicates per dimension must be greater than zero".to_string());
        }
        self.partitioning.validate()
    }

    /// Construct the index strategy this configuration describes.
    pub fn build(&self) -> Result<TieredIndexStrategy> {
        self.validate().map_err(IndexError::InvalidConfig)?;
        let dimensions = self
            .dimensions
            .iter()
            .map(DimensionConfig::to_definition)
            .collect::<Result<Vec<_>>>()?;
        TieredIndexStrategy::from_tiering(
            self.curve,
            dimensions,
            &self.tiering,
            self.max_duplicates_per_dimension,
            self.partitioning,
        )
    }

    /// Load configuration from JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IndexConfig = serde_json::from_str(json)?;
        config.validate().map_err(IndexError::InvalidConfig)?;
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: IndexConfig = toml::from_str(toml_str)?;
        config.validate().map_err(IndexError::InvalidConfig)?;
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| IndexError::InvalidConfig(e.to_string()))
    }

    /// Load configuration from a `.json` (or, with the toml feature, `.toml`) file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            #[cfg(feature = "toml")]
            Some("toml") => Self::from_toml_str(&contents),
            other => Err(IndexError::InvalidConfig(format!(
                "unsupported configuration file extension {other:?}"
            ))),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::spatial()
    }
}
