//! ## Wire helpers
//! Keys are stored as fixed-width little-endian integers.
//!
//! Exact containers (`SmallSet` and `MediumSet`) share one self-delimiting payload format:
//! - varint (LEB128) number of elements `N`
//! - `N` keys
//!
//! `ElementReader` decodes this payload lazily, one key at a time, so that serialized
//! partial states can be folded into a live estimator without building a temporary container.

use std::fmt::Debug;
use std::hash::Hash;
use std::io::{self, Read, Write};
use std::marker::PhantomData;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{EstimatorError, Result};

/// Maximum number of bytes used by varint encoding of `u64`
const MAX_VARINT_LEN: usize = 10;

/// Key type which can be counted by `CombinedEstimator`
pub trait Key: Copy + Eq + Hash + Default + Debug + Send + Sync + 'static {
    /// Read key from its fixed-width binary form
    fn read_from<R: Read + ?Sized>(input: &mut R) -> io::Result<Self>;
    /// Write key in its fixed-width binary form
    fn write_to<Wr: Write + ?Sized>(self, out: &mut Wr) -> io::Result<()>;
    /// Convert 64-bit hash of an arbitrary item into a key
    fn from_hash(hash: u64) -> Self;
}

macro_rules! impl_key {
    ($t:ty, $read:ident, $write:ident, $from_hash:expr) => {
        impl Key for $t {
            #[inline]
            fn read_from<R: Read + ?Sized>(input: &mut R) -> io::Result<Self> {
                input.$read::<LittleEndian>()
            }

            #[inline]
            fn write_to<Wr: Write + ?Sized>(self, out: &mut Wr) -> io::Result<()> {
                out.$write::<LittleEndian>(self)
            }

            #[inline]
            fn from_hash(hash: u64) -> Self {
                $from_hash(hash)
            }
        }
    };
}

impl_key!(u16, read_u16, write_u16, |h: u64| h as u16);
impl_key!(u32, read_u32, write_u32, |h: u64| h as u32);
impl_key!(u64, read_u64, write_u64, |h: u64| h);
impl_key!(u128, read_u128, write_u128, u128::from);
impl_key!(i32, read_i32, write_i32, |h: u64| h as i32);
impl_key!(i64, read_i64, write_i64, |h: u64| h as i64);

/// Write `value` using LEB128 encoding
pub(crate) fn write_varint<Wr: Write + ?Sized>(mut value: u64, out: &mut Wr) -> io::Result<()> {
    while value >= 0x80 {
        out.write_u8((value as u8) | 0x80)?;
        value >>= 7;
    }
    out.write_u8(value as u8)
}

/// Read LEB128 encoded value
pub(crate) fn read_varint<R: Read + ?Sized>(input: &mut R) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let byte = input.read_u8()?;
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(EstimatorError::MalformedVarint)
}

/// Write exact container payload: number of elements followed by the elements
pub(crate) fn write_elements<K, I, Wr>(len: usize, items: I, out: &mut Wr) -> io::Result<()>
where
    K: Key,
    I: IntoIterator<Item = K>,
    Wr: Write + ?Sized,
{
    write_varint(len as u64, out)?;
    for key in items {
        key.write_to(out)?;
    }
    Ok(())
}

/// Streaming reader of exact container payload.
///
/// Yields at most the number of elements announced in the payload header and stops
/// right after the first decoding error.
pub struct ElementReader<'r, K, R: ?Sized> {
    input: &'r mut R,
    remaining: u64,
    _key: PhantomData<K>,
}

impl<'r, K: Key, R: Read + ?Sized> ElementReader<'r, K, R> {
    /// Read payload header and create reader, rejecting payloads above `capacity` elements
    pub fn new(input: &'r mut R, capacity: usize) -> Result<Self> {
        let len = read_varint(input)?;
        if len > capacity as u64 {
            return Err(EstimatorError::TooManyElements { len, capacity });
        }
        Ok(Self {
            input,
            remaining: len,
            _key: PhantomData,
        })
    }

    /// Return number of elements not yet read
    pub fn remaining(&self) -> usize {
        self.remaining as usize
    }
}

impl<K: Key, R: Read + ?Sized> Iterator for ElementReader<'_, K, R> {
    type Item = Result<K>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match K::read_from(self.input) {
            Ok(key) => {
                self.remaining -= 1;
                Some(Ok(key))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e.into()))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0 => vec![0x00])]
    #[test_case(127 => vec![0x7f])]
    #[test_case(128 => vec![0x80, 0x01])]
    #[test_case(300 => vec![0xac, 0x02])]
    fn test_write_varint(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(value, &mut out).unwrap();
        out
    }

    #[test]
    fn test_varint_max_value() {
        let mut out = Vec::new();
        write_varint(u64::MAX, &mut out).unwrap();
        assert_eq!(out.len(), MAX_VARINT_LEN);
        assert_eq!(read_varint(&mut out.as_slice()).unwrap(), u64::MAX);
    }

    #[test]
    fn test_malformed_varint() {
        let bytes = [0xffu8; 11];
        let err = read_varint(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, EstimatorError::MalformedVarint));
    }

    #[test]
    fn test_element_reader() {
        let mut bytes = Vec::new();
        write_elements(3, [7u32, 8, 9], &mut bytes).unwrap();
        bytes.push(0xaa);

        let mut input = bytes.as_slice();
        let reader = ElementReader::<u32, _>::new(&mut input, 4).unwrap();
        assert_eq!(reader.remaining(), 3);
        let keys: Vec<u32> = reader.map(|k| k.unwrap()).collect();
        assert_eq!(keys, vec![7, 8, 9]);
        // reader must not consume bytes past its payload
        assert_eq!(input, &[0xaa]);
    }

    #[test]
    fn test_element_reader_capacity() {
        let mut bytes = Vec::new();
        write_elements(3, [1u64, 2, 3], &mut bytes).unwrap();
        let err = ElementReader::<u64, _>::new(&mut bytes.as_slice(), 2)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            EstimatorError::TooManyElements {
                len: 3,
                capacity: 2
            }
        ));
    }

    #[test]
    fn test_element_reader_truncated() {
        let mut bytes = Vec::new();
        write_elements(2, [1u64, 2], &mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);

        let mut input = bytes.as_slice();
        let mut reader = ElementReader::<u64, _>::new(&mut input, 16).unwrap();
        assert_eq!(reader.next().unwrap().unwrap(), 1);
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test_case(0x1234_5678_9abc_def0 => 0xdef0; "u16 truncates")]
    #[test_case(u64::MAX => 0xffff; "u16 all ones")]
    fn test_u16_from_hash(hash: u64) -> u16 {
        u16::from_hash(hash)
    }
}
