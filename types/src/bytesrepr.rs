//! Canonical byte encoding.
//!
//! Every value that is hashed, signed or measured for an execution request goes through
//! [`ToBytes`] so that all nodes agree on the exact bytes.  Integers are little-endian, sequences
//! and strings carry a `u32` length prefix and optional values carry a one-byte tag.

mod bytes;

use std::{collections::BTreeMap, convert::TryFrom, mem};

use thiserror::Error;

use highway_hashing::Digest;

pub use bytes::Bytes;

/// The number of bytes in a serialized `()`.
pub const UNIT_SERIALIZED_LENGTH: usize = 0;
/// The number of bytes in a serialized `bool`.
pub const BOOL_SERIALIZED_LENGTH: usize = 1;
/// The number of bytes in a serialized `u8`.
pub const U8_SERIALIZED_LENGTH: usize = mem::size_of::<u8>();
/// The number of bytes in a serialized `u32`.
pub const U32_SERIALIZED_LENGTH: usize = mem::size_of::<u32>();
/// The number of bytes in a serialized `u64`.
pub const U64_SERIALIZED_LENGTH: usize = mem::size_of::<u64>();
/// The tag byte of a serialized `Option::None`.
pub const OPTION_NONE_TAG: u8 = 0;
/// The tag byte of a serialized `Option::Some`.
pub const OPTION_SOME_TAG: u8 = 1;

/// Serialization and deserialization errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Early end of stream while deserializing.
    #[error("deserialization error: early end of stream")]
    EarlyEndOfStream,
    /// Formatting error while deserializing.
    #[error("deserialization error: formatting")]
    Formatting,
    /// Not all input bytes were consumed in [`deserialize`].
    #[error("deserialization error: left-over bytes")]
    LeftOverBytes,
    /// A length does not fit into the `u32` prefix.
    #[error("serialization error: exceeded maximum length")]
    ExceededLimit,
}

/// A type which can be serialized to a `Vec<u8>`.
pub trait ToBytes {
    /// Serializes `&self` to a `Vec<u8>`.
    fn to_bytes(&self) -> Result<Vec<u8>, Error>;

    /// Consumes `self` and serializes to a `Vec<u8>`.
    fn into_bytes(self) -> Result<Vec<u8>, Error>
    where
        Self: Sized,
    {
        self.to_bytes()
    }

    /// Returns the length of the `Vec<u8>` which would be returned from a successful call to
    /// `to_bytes()` or `into_bytes()`.
    fn serialized_length(&self) -> usize;

    /// Writes `&self` into a mutable `writer`.
    fn write_bytes(&self, writer: &mut Vec<u8>) -> Result<(), Error> {
        writer.extend(self.to_bytes()?);
        Ok(())
    }
}

/// A type which can be deserialized from a `Vec<u8>`.
pub trait FromBytes: Sized {
    /// Deserializes the slice into `Self`, returning the unconsumed remainder.
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error>;
}

/// Serializes `t` into a `Vec<u8>`.
pub fn serialize(t: impl ToBytes) -> Result<Vec<u8>, Error> {
    t.into_bytes()
}

/// Deserializes `bytes` into an instance of `T`.
///
/// Returns an error if the bytes cannot be deserialized into `T` or if not all of the input
/// bytes are consumed in the operation.
pub fn deserialize<T: FromBytes>(bytes: Vec<u8>) -> Result<T, Error> {
    let (t, remainder) = T::from_bytes(&bytes)?;
    if remainder.is_empty() {
        Ok(t)
    } else {
        Err(Error::LeftOverBytes)
    }
}

/// Returns a `Vec<u8>` initialized with sufficient capacity to hold `to_be_serialized` after
/// serialization.
pub fn allocate_buffer<T: ToBytes>(to_be_serialized: &T) -> Result<Vec<u8>, Error> {
    let serialized_length = to_be_serialized.serialized_length();
    if serialized_length > u32::MAX as usize {
        return Err(Error::ExceededLimit);
    }
    Ok(Vec::with_capacity(serialized_length))
}

/// Returns a tuple of the first `n` bytes and the remainder, or an error if the slice is too
/// short.
pub fn safe_split_at(bytes: &[u8], n: usize) -> Result<(&[u8], &[u8]), Error> {
    if n > bytes.len() {
        Err(Error::EarlyEndOfStream)
    } else {
        Ok(bytes.split_at(n))
    }
}

fn length_prefix(length: usize) -> Result<[u8; U32_SERIALIZED_LENGTH], Error> {
    u32::try_from(length)
        .map(u32::to_le_bytes)
        .map_err(|_| Error::ExceededLimit)
}

pub(crate) fn write_u8_slice(bytes: &[u8], writer: &mut Vec<u8>) -> Result<(), Error> {
    writer.extend_from_slice(&length_prefix(bytes.len())?);
    writer.extend_from_slice(bytes);
    Ok(())
}

pub(crate) fn u8_slice_serialized_length(bytes: &[u8]) -> usize {
    U32_SERIALIZED_LENGTH + bytes.len()
}

/// Reads a `u32` length prefix followed by that many bytes.
pub(crate) fn read_u8_slice(bytes: &[u8]) -> Result<(&[u8], &[u8]), Error> {
    let (size, remainder) = u32::from_bytes(bytes)?;
    safe_split_at(remainder, size as usize)
}

impl ToBytes for () {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(Vec::new())
    }

    fn serialized_length(&self) -> usize {
        UNIT_SERIALIZED_LENGTH
    }
}

impl FromBytes for () {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        Ok(((), bytes))
    }
}

impl ToBytes for bool {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        u8::from(*self).to_bytes()
    }

    fn serialized_length(&self) -> usize {
        BOOL_SERIALIZED_LENGTH
    }
}

impl FromBytes for bool {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        match bytes.split_first() {
            None => Err(Error::EarlyEndOfStream),
            Some((byte, rem)) => match byte {
                1 => Ok((true, rem)),
                0 => Ok((false, rem)),
                _ => Err(Error::Formatting),
            },
        }
    }
}

impl ToBytes for u8 {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(vec![*self])
    }

    fn serialized_length(&self) -> usize {
        U8_SERIALIZED_LENGTH
    }
}

impl FromBytes for u8 {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        match bytes.split_first() {
            None => Err(Error::EarlyEndOfStream),
            Some((byte, rem)) => Ok((*byte, rem)),
        }
    }
}

macro_rules! impl_to_from_bytes_for_integer {
    ($type:ty) => {
        impl ToBytes for $type {
            fn to_bytes(&self) -> Result<Vec<u8>, Error> {
                Ok(self.to_le_bytes().to_vec())
            }

            fn serialized_length(&self) -> usize {
                mem::size_of::<$type>()
            }
        }

        impl FromBytes for $type {
            fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
                let mut result = [0u8; mem::size_of::<$type>()];
                let (bytes, remainder) = safe_split_at(bytes, mem::size_of::<$type>())?;
                result.copy_from_slice(bytes);
                Ok((<$type>::from_le_bytes(result), remainder))
            }
        }
    };
}

impl_to_from_bytes_for_integer!(u32);
impl_to_from_bytes_for_integer!(u64);

impl ToBytes for String {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        self.as_str().to_bytes()
    }

    fn serialized_length(&self) -> usize {
        u8_slice_serialized_length(self.as_bytes())
    }
}

impl ToBytes for str {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut buffer = Vec::with_capacity(u8_slice_serialized_length(self.as_bytes()));
        write_u8_slice(self.as_bytes(), &mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        u8_slice_serialized_length(self.as_bytes())
    }
}

impl FromBytes for String {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (str_bytes, remainder) = read_u8_slice(bytes)?;
        let result = String::from_utf8(str_bytes.to_vec()).map_err(|_| Error::Formatting)?;
        Ok((result, remainder))
    }
}

impl<T: ToBytes> ToBytes for Vec<T> {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut result = allocate_buffer(self)?;
        result.extend_from_slice(&length_prefix(self.len())?);
        for item in self {
            item.write_bytes(&mut result)?;
        }
        Ok(result)
    }

    fn serialized_length(&self) -> usize {
        U32_SERIALIZED_LENGTH + self.iter().map(ToBytes::serialized_length).sum::<usize>()
    }
}

impl<T: FromBytes> FromBytes for Vec<T> {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (count, mut stream) = u32::from_bytes(bytes)?;
        // Each element takes at least one byte, except for zero-sized ones.
        let mut result = Vec::with_capacity((count as usize).min(stream.len()));
        for _ in 0..count {
            let (value, remainder) = T::from_bytes(stream)?;
            result.push(value);
            stream = remainder;
        }
        Ok((result, stream))
    }
}

impl<const COUNT: usize> ToBytes for [u8; COUNT] {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(self.to_vec())
    }

    fn serialized_length(&self) -> usize {
        COUNT
    }

    fn write_bytes(&self, writer: &mut Vec<u8>) -> Result<(), Error> {
        writer.extend_from_slice(self);
        Ok(())
    }
}

impl<const COUNT: usize> FromBytes for [u8; COUNT] {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (bytes, remainder) = safe_split_at(bytes, COUNT)?;
        let mut result = [0u8; COUNT];
        result.copy_from_slice(bytes);
        Ok((result, remainder))
    }
}

impl<T: ToBytes> ToBytes for Option<T> {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        match self {
            None => Ok(vec![OPTION_NONE_TAG]),
            Some(v) => {
                let mut result = allocate_buffer(self)?;
                result.push(OPTION_SOME_TAG);
                v.write_bytes(&mut result)?;
                Ok(result)
            }
        }
    }

    fn serialized_length(&self) -> usize {
        U8_SERIALIZED_LENGTH
            + match self {
                Some(v) => v.serialized_length(),
                None => 0,
            }
    }
}

impl<T: FromBytes> FromBytes for Option<T> {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (tag, rem) = u8::from_bytes(bytes)?;
        match tag {
            OPTION_NONE_TAG => Ok((None, rem)),
            OPTION_SOME_TAG => {
                let (t, rem) = T::from_bytes(rem)?;
                Ok((Some(t), rem))
            }
            _ => Err(Error::Formatting),
        }
    }
}

impl<K: ToBytes, V: ToBytes> ToBytes for BTreeMap<K, V> {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut result = allocate_buffer(self)?;
        result.extend_from_slice(&length_prefix(self.len())?);
        for (key, value) in self {
            key.write_bytes(&mut result)?;
            value.write_bytes(&mut result)?;
        }
        Ok(result)
    }

    fn serialized_length(&self) -> usize {
        U32_SERIALIZED_LENGTH
            + self
                .iter()
                .map(|(key, value)| key.serialized_length() + value.serialized_length())
                .sum::<usize>()
    }
}

impl<K: FromBytes + Ord, V: FromBytes> FromBytes for BTreeMap<K, V> {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (count, mut stream) = u32::from_bytes(bytes)?;
        let mut result = BTreeMap::new();
        for _ in 0..count {
            let (key, rem) = K::from_bytes(stream)?;
            let (value, rem) = V::from_bytes(rem)?;
            result.insert(key, value);
            stream = rem;
        }
        Ok((result, stream))
    }
}

impl<T1: ToBytes, T2: ToBytes> ToBytes for (T1, T2) {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut result = allocate_buffer(self)?;
        self.0.write_bytes(&mut result)?;
        self.1.write_bytes(&mut result)?;
        Ok(result)
    }

    fn serialized_length(&self) -> usize {
        self.0.serialized_length() + self.1.serialized_length()
    }
}

impl<T1: FromBytes, T2: FromBytes> FromBytes for (T1, T2) {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (t1, remainder) = T1::from_bytes(bytes)?;
        let (t2, remainder) = T2::from_bytes(remainder)?;
        Ok(((t1, t2), remainder))
    }
}

impl<T: ToBytes + ?Sized> ToBytes for &T {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        (*self).to_bytes()
    }

    fn serialized_length(&self) -> usize {
        (*self).serialized_length()
    }

    fn write_bytes(&self, writer: &mut Vec<u8>) -> Result<(), Error> {
        (*self).write_bytes(writer)
    }
}

impl ToBytes for Digest {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        self.inner().to_bytes()
    }

    fn serialized_length(&self) -> usize {
        Digest::LENGTH
    }

    fn write_bytes(&self, writer: &mut Vec<u8>) -> Result<(), Error> {
        writer.extend_from_slice(self.inner());
        Ok(())
    }
}

impl FromBytes for Digest {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (inner, remainder) = <[u8; Digest::LENGTH]>::from_bytes(bytes)?;
        Ok((Digest::from(inner), remainder))
    }
}

/// Asserts that `t` survives a round trip and that its declared length is exact.
#[cfg(any(feature = "testing", test))]
pub fn test_serialization_roundtrip<T>(t: &T)
where
    T: std::fmt::Debug + ToBytes + FromBytes + PartialEq,
{
    let serialized = ToBytes::to_bytes(t).expect("Unable to serialize data");
    assert_eq!(
        serialized.len(),
        t.serialized_length(),
        "\nLength of serialized data: {},\nserialized_length() yielded: {},\nt is {:?}",
        serialized.len(),
        t.serialized_length(),
        t
    );
    let deserialized = deserialize::<T>(serialized).expect("Unable to deserialize data");
    assert_eq!(*t, deserialized);
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec, prelude::*};

    use super::*;

    #[test]
    fn integers_are_little_endian() {
        assert_eq!(0x0102_0304u32.to_bytes().unwrap(), vec![4, 3, 2, 1]);
        assert_eq!(
            1u64.to_bytes().unwrap(),
            vec![1, 0, 0, 0, 0, 0, 0, 0],
        );
    }

    #[test]
    fn strings_and_vectors_are_length_prefixed() {
        assert_eq!(
            "ab".to_string().to_bytes().unwrap(),
            vec![2, 0, 0, 0, b'a', b'b']
        );
        assert_eq!(
            vec![7u64].to_bytes().unwrap(),
            vec![1, 0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn should_reject_truncated_input() {
        let bytes = "hello".to_string().to_bytes().unwrap();
        assert_eq!(
            String::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err(),
            Error::EarlyEndOfStream
        );
    }

    #[test]
    fn should_reject_left_over_bytes() {
        let mut bytes = 5u32.to_bytes().unwrap();
        bytes.push(0);
        assert_eq!(deserialize::<u32>(bytes).unwrap_err(), Error::LeftOverBytes);
    }

    #[test]
    fn should_reject_bad_tags() {
        assert_eq!(bool::from_bytes(&[2]).unwrap_err(), Error::Formatting);
        assert_eq!(
            Option::<u8>::from_bytes(&[9, 1]).unwrap_err(),
            Error::Formatting
        );
    }

    #[test]
    fn huge_length_prefix_does_not_preallocate() {
        let bytes = u32::MAX.to_bytes().unwrap();
        assert_eq!(
            Vec::<u64>::from_bytes(&bytes).unwrap_err(),
            Error::EarlyEndOfStream
        );
    }

    proptest! {
        #[test]
        fn nested_values_keep_their_length(
            entries in vec((any::<[u8; 32]>(), any::<u64>()), 0..8),
            label in ".{0,16}",
            flag in any::<Option<bool>>(),
        ) {
            let map: BTreeMap<Digest, u64> = entries
                .into_iter()
                .map(|(hash, weight)| (Digest::from(hash), weight))
                .collect();
            test_serialization_roundtrip(&map);
            test_serialization_roundtrip(&(label, flag));
        }
    }
}
