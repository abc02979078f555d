//! Composite row keys handed to the storage engine.
//!
//! A row key is a partition key followed by a sort key:
//!
//! ```text
//! ┌──────────┬──────────────────────────┬───────────────┐┌──────────────────────┐
//! │ tier id  │ bin id (fixed width,     │ hash byte     ││ curve id (fixed      │
//! │ (1 byte) │ per-dimension concat)    │ (optional)    ││ width per tier)      │
//! └──────────┴──────────────────────────┴───────────────┘└──────────────────────┘
//!                      partition key                            sort key
//! ```

use crate::error::DecodeError;
use bytes::{BufMut, Bytes, BytesMut};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use strata_types::range::ByteRange;

/// Sort keys written under one partition key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinglePartitionInsertionIds {
    pub partition_key: Bytes,
    pub sort_keys: Vec<Bytes>,
}

impl SinglePartitionInsertionIds {
    pub fn new(partition_key: impl Into<Bytes>, sort_keys: Vec<Bytes>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_keys,
        }
    }

    /// Full row keys of this partition.
    pub fn composite_keys(&self) -> impl Iterator<Item = Bytes> + '_ {
        self.sort_keys
            .iter()
            .map(|sort_key| composite_key(&self.partition_key, sort_key))
    }
}

/// Every row key one entry is written under.
///
/// An entry may be written under several keys: when it covers more than one
/// curve cell, or when it falls into several bins (a range crossing the
/// antimeridian, a time range spanning epochs, an instant on an epoch
/// boundary).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InsertionIds {
    partitions: Vec<SinglePartitionInsertionIds>,
}

impl InsertionIds {
    pub fn new(partitions: Vec<SinglePartitionInsertionIds>) -> Self {
        Self { partitions }
    }

    pub fn partitions(&self) -> &[SinglePartitionInsertionIds] {
        &self.partitions
    }

    pub fn partition_keys(&self) -> impl Iterator<Item = &Bytes> {
        self.partitions.iter().map(|p| &p.partition_key)
    }

    /// Total number of row keys.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.sort_keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn composite_keys(&self) -> Vec<Bytes> {
        self.partitions
            .iter()
            .flat_map(SinglePartitionInsertionIds::composite_keys)
            .collect()
    }
}

/// Sort key ranges to scan within one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinglePartitionQueryRanges {
    pub partition_key: Bytes,
    pub sort_key_ranges: Vec<ByteRange>,
}

impl SinglePartitionQueryRanges {
    pub fn new(partition_key: impl Into<Bytes>, sort_key_ranges: Vec<ByteRange>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key_ranges,
        }
    }

    /// Scan bounds over full row keys.
    pub fn composite_ranges(&self) -> impl Iterator<Item = ByteRange> + '_ {
        self.sort_key_ranges
            .iter()
            .map(|range| range.with_prefix(&self.partition_key))
    }
}

/// Scan bounds for a query, grouped by partition key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryRanges {
    partitions: Vec<SinglePartitionQueryRanges>,
}

impl QueryRanges {
    pub fn new(partitions: Vec<SinglePartitionQueryRanges>) -> Self {
        Self { partitions }
    }

    pub fn partitions(&self) -> &[SinglePartitionQueryRanges] {
        &self.partitions
    }

    pub fn partition_keys(&self) -> impl Iterator<Item = &Bytes> {
        self.partitions.iter().map(|p| &p.partition_key)
    }

    /// Total number of sort key ranges.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.sort_key_ranges.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn composite_ranges(&self) -> Vec<ByteRange> {
        self.partitions
            .iter()
            .flat_map(SinglePartitionQueryRanges::composite_ranges)
            .collect()
    }

    /// Whether a stored row key falls inside any range.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.partitions.iter().any(|p| {
            key.starts_with(&p.partition_key)
                && p
                    .sort_key_ranges
                    .iter()
                    .any(|r| r.contains(&key[p.partition_key.len()..]))
        })
    }
}

/// Groups values by partition key, keeping first-seen partition order.
pub(crate) struct PartitionGrouper<T> {
    positions: FxHashMap<Bytes, usize>,
    groups: Vec<(Bytes, Vec<T>)>,
}

impl<T> PartitionGrouper<T> {
    pub(crate) fn new() -> Self {
        Self {
            positions: FxHashMap::default(),
            groups: Vec::new(),
        }
    }

    pub(crate) fn extend(&mut self, partition_key: Bytes, values: impl IntoIterator<Item = T>) {
        let position = *self
            .positions
            .entry(partition_key.clone())
            .or_insert_with(|| {
                self.groups.push((partition_key, Vec::new()));
                self.groups.len() - 1
            });
        self.groups[position].1.extend(values);
    }

    pub(crate) fn into_groups(self) -> Vec<(Bytes, Vec<T>)> {
        self.groups
    }
}

pub fn composite_key(partition_key: &[u8], sort_key: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(partition_key.len() + sort_key.len());
    buf.put_slice(partition_key);
    buf.put_slice(sort_key);
    buf.freeze()
}

/// Split a row key into its partition key and sort key.
pub fn split_composite_key(
    key: &[u8],
    partition_key_len: usize,
) -> Result<(&[u8], &[u8]), DecodeError> {
    if key.len() < partition_key_len {
        return Err(DecodeError::Truncated {
            what: "partition key",
            expected: partition_key_len,
            available: key.len(),
        });
    }
    Ok(key.split_at(partition_key_len))
}
