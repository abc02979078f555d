use crate::error::DecodeError;
use crate::keys::InsertionIds;
use crate::persist::{self, Persistable};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row counts per tier, kept by the caller as entries are written.
///
/// Passed back as a query hint so tiers that never received an entry are
/// not scanned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierMetadata {
    counts: BTreeMap<u8, u64>,
}

impl TierMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the rows of a written entry.
    pub fn record(&mut self, ids: &InsertionIds) {
        for partition in ids.partitions() {
            if let Some(&tier) = partition.partition_key.first() {
                *self.counts.entry(tier).or_insert(0) += partition.sort_keys.len() as u64;
            }
        }
    }

    /// Forget the rows of a deleted entry.
    pub fn remove(&mut self, ids: &InsertionIds) {
        for partition in ids.partitions() {
            if let Some(&tier) = partition.partition_key.first()
                && let Some(count) = self.counts.get_mut(&tier)
            {
                *count = count.saturating_sub(partition.sort_keys.len() as u64);
                if *count == 0 {
                    self.counts.remove(&tier);
                }
            }
        }
    }

    pub fn merge(&mut self, other: &TierMetadata) {
        for (&tier, &count) in &other.counts {
            *self.counts.entry(tier).or_insert(0) += count;
        }
    }

    pub fn count(&self, tier: u8) -> u64 {
        self.counts.get(&tier).copied().unwrap_or(0)
    }

    pub fn has_entries(&self, tier: u8) -> bool {
        self.count(tier) > 0
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl Persistable for TierMetadata {
    fn write_to(&self, buf: &mut BytesMut) {
        persist::put_varint(buf, self.counts.len() as u64);
        for (&tier, &count) in &self.counts {
            persist::put_varint(buf, tier as u64);
            persist::put_varint(buf, count);
        }
    }

    fn read_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let entries = persist::get_len(buf)?;
        let mut counts = BTreeMap::new();
        for _ in 0..entries {
            let tier = persist::get_varint(buf)?;
            let tier = u8::try_from(tier)
                .map_err(|_| DecodeError::Invalid(format!("tier id {tier}")))?;
            counts.insert(tier, persist::get_varint(buf)?);
        }
        Ok(Self { counts })
    }
}
