use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// An inclusive range of binary keys, compared lexicographically (unsigned).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: Bytes,
    pub end: Bytes,
}

impl ByteRange {
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// A range matching exactly one key.
    pub fn single(key: impl Into<Bytes>) -> Self {
        let key = key.into();
        Self {
            start: key.clone(),
            end: key,
        }
    }

    pub fn is_single_value(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_ref() && key <= self.end.as_ref()
    }

    pub fn intersects(&self, other: &ByteRange) -> bool {
        !(self.end < other.start || self.start > other.end)
    }

    /// Prepend the same prefix to both bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_types::range::ByteRange;
    ///
    /// let range = ByteRange::new(vec![0x10], vec![0x20]).with_prefix(&[0x07]);
    /// assert_eq!(range.start.as_ref(), &[0x07, 0x10]);
    /// assert_eq!(range.end.as_ref(), &[0x07, 0x20]);
    /// ```
    pub fn with_prefix(&self, prefix: &[u8]) -> Self {
        Self {
            start: concat(prefix, &self.start),
            end: concat(prefix, &self.end),
        }
    }

    /// Sort ranges and merge those that overlap.
    pub fn merge_overlapping(mut ranges: Vec<ByteRange>) -> Vec<ByteRange> {
        ranges.sort();
        let mut merged: Vec<ByteRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => {
                    if range.end > last.end {
                        last.end = range.end;
                    }
                }
                _ => merged.push(range),
            }
        }
        merged
    }
}

pub(crate) fn concat(prefix: &[u8], suffix: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(prefix.len() + suffix.len());
    buf.put_slice(prefix);
    buf.put_slice(suffix);
    buf.freeze()
}
