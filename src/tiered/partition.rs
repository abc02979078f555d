use crate::error::DecodeError;
use crate::persist::{self, Persistable};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Extra partition bits appended to every partition key.
///
/// With `Hash`, rows of one tier and bin are spread over `partitions`
/// partitions by a hash of their sort key, and queries fan out over all of
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyPartitioning {
    #[default]
    None,
    Hash { partitions: u8 },
}

impl KeyPartitioning {
    /// Bytes this partitioning adds to a partition key.
    pub fn key_len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Hash { .. } => 1,
        }
    }

    /// Partition byte of a row with `sort_key`.
    pub fn insertion_suffix(&self, sort_key: &[u8]) -> Option<u8> {
        match self {
            Self::None => None,
            Self::Hash { partitions } => {
                let partitions = u32::from((*partitions).max(1));
                Some((sort_key_hash(sort_key).unsigned_abs() % partitions) as u8)
            }
        }
    }

    /// Every partition byte a query must visit.
    pub fn query_suffixes(&self) -> Vec<Option<u8>> {
        match self {
            Self::None => vec![None],
            Self::Hash { partitions } => (0..(*partitions).max(1)).map(Some).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Hash { partitions: 0 } => Err("hash partitioning needs at least one partition".into()),
            _ => Ok(()),
        }
    }
}

/// 31-multiplier polynomial hash over signed bytes.
fn sort_key_hash(bytes: &[u8]) -> i32 {
    bytes.iter().fold(1i32, |hash, &b| {
        hash.wrapping_mul(31).wrapping_add(b as i8 as i32)
    })
}

const TAG_NONE: u64 = 0;
const TAG_HASH: u64 = 1;

impl Persistable for KeyPartitioning {
    fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Self::None => persist::put_varint(buf, TAG_NONE),
            Self::Hash { partitions } => {
                persist::put_varint(buf, TAG_HASH);
                buf.put_u8(*partitions);
            }
        }
    }

    fn read_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        match persist::get_varint(buf)? {
            TAG_NONE => Ok(Self::None),
            TAG_HASH => Ok(Self::Hash {
                partitions: persist::get_u8(buf, "partition count")?,
            }),
            tag => Err(DecodeError::UnknownTag {
                kind: "key partitioning",
                tag,
            }),
        }
    }
}
