//! Binary form of configured strategies.
//!
//! A configured strategy is serialized once and shipped as immutable bytes to
//! remote workers, which rebuild an identical value locally.
//!
//! ```text
//! unsigned integer   LEB128 varint
//! signed integer     zigzag + LEB128 varint
//! f64                8 bytes, big-endian IEEE 754
//! nested value       varint length || value bytes
//! enum variant       varint tag || variant payload
//! ```

use crate::error::DecodeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A value with a stable, length-prefixed binary encoding.
pub trait Persistable: Sized {
    /// Append the encoded value to `buf`.
    fn write_to(&self, buf: &mut BytesMut);

    /// Decode one value from the front of `buf`, advancing it.
    fn read_from(buf: &mut &[u8]) -> Result<Self, DecodeError>;

    fn to_binary(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Decode a value that must occupy all of `bytes`.
    fn from_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = bytes;
        let value = Self::read_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(DecodeError::TrailingBytes {
                remaining: cursor.len(),
            });
        }
        Ok(value)
    }
}

pub(crate) fn put_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

pub(crate) fn get_varint(buf: &mut &[u8]) -> Result<u64, DecodeError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(DecodeError::MalformedVarint);
        }
        let byte = buf.get_u8();
        let payload = (byte & 0x7F) as u64;
        // a u64 takes at most ten bytes, the tenth holding a single bit
        if shift > 63 || (shift == 63 && payload > 1) {
            return Err(DecodeError::MalformedVarint);
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

pub(crate) fn put_zigzag(buf: &mut BytesMut, value: i64) {
    put_varint(buf, ((value << 1) ^ (value >> 63)) as u64);
}

pub(crate) fn get_zigzag(buf: &mut &[u8]) -> Result<i64, DecodeError> {
    let value = get_varint(buf)?;
    Ok(((value >> 1) as i64) ^ (-((value & 1) as i64)))
}

/// Read a varint used as a count or length.
pub(crate) fn get_len(buf: &mut &[u8]) -> Result<usize, DecodeError> {
    let value = get_varint(buf)?;
    usize::try_from(value).map_err(|_| DecodeError::Invalid(format!("length {value} overflows")))
}

pub(crate) fn ensure(buf: &[u8], expected: usize, what: &'static str) -> Result<(), DecodeError> {
    if buf.len() < expected {
        return Err(DecodeError::Truncated {
            what,
            expected,
            available: buf.len(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut &[u8], what: &'static str) -> Result<u8, DecodeError> {
    ensure(buf, 1, what)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_f64(buf: &mut &[u8], what: &'static str) -> Result<f64, DecodeError> {
    ensure(buf, 8, what)?;
    Ok(buf.get_f64())
}

pub(crate) fn take<'a>(
    buf: &mut &'a [u8],
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], DecodeError> {
    ensure(buf, len, what)?;
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

pub(crate) fn put_nested<T: Persistable>(buf: &mut BytesMut, value: &T) {
    let encoded = value.to_binary();
    put_varint(buf, encoded.len() as u64);
    buf.put_slice(&encoded);
}

pub(crate) fn get_nested<T: Persistable>(
    buf: &mut &[u8],
    what: &'static str,
) -> Result<T, DecodeError> {
    let len = get_len(buf)?;
    let bytes = take(buf, len, what)?;
    T::from_binary(bytes)
}

pub(crate) fn put_nested_seq<T: Persistable>(buf: &mut BytesMut, values: &[T]) {
    put_varint(buf, values.len() as u64);
    for value in values {
        put_nested(buf, value);
    }
}

pub(crate) fn get_nested_seq<T: Persistable>(
    buf: &mut &[u8],
    what: &'static str,
) -> Result<Vec<T>, DecodeError> {
    let count = get_len(buf)?;
    // every nested value carries at least a one-byte length prefix
    ensure(buf, count, what)?;
    (0..count).map(|_| get_nested(buf, what)).collect()
}
