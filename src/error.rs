//! Error types for the index core.

use thiserror::Error;

/// Failure to decode a binary row key or a serialized strategy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input ended before a fixed-width field could be read.
    #[error("truncated {what}: expected {expected} bytes but only {available} available")]
    Truncated {
        what: &'static str,
        expected: usize,
        available: usize,
    },

    /// An enum discriminant that this version does not know.
    #[error("unknown {kind} tag {tag}")]
    UnknownTag { kind: &'static str, tag: u64 },

    #[error("malformed varint")]
    MalformedVarint,

    /// A value decoded cleanly but bytes were left over.
    #[error("{remaining} trailing bytes after decoded value")]
    TrailingBytes { remaining: usize },

    #[error("invalid encoded value: {0}")]
    Invalid(String),
}

/// Index core errors.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Input data does not have one range per configured dimension.
    #[error("Dimension mismatch: expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An entry would need more row ids than allowed.
    #[error("Too many ids: {count} exceeds the limit of {limit}")]
    TooManyIds { count: u128, limit: u128 },

    /// A range covers more periodic bins than one request may enumerate.
    #[error("Too many bins: {count} exceeds the limit of {limit}")]
    TooManyBins { count: u128, limit: u128 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "toml")]
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
