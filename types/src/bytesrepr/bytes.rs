use std::{
    fmt::{self, Debug, Display, Formatter},
    iter::FromIterator,
    ops::Deref,
};

use datasize::DataSize;
use hex_fmt::HexFmt;
use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};

use super::{Error, FromBytes, ToBytes};

/// A newtype wrapper for bytes that has efficient serialization routines.
///
/// Human-readable formats see a lowercase hex string.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Default, Hash, DataSize)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    /// Constructs a new, empty vector of bytes.
    pub fn new() -> Bytes {
        Bytes::default()
    }

    /// Returns reference to inner container.
    #[inline]
    pub fn inner_bytes(&self) -> &Vec<u8> {
        &self.0
    }

    /// Extracts a slice containing the entire vector.
    pub fn as_slice(&self) -> &[u8] {
        self
    }

    /// Consumes `self`, returning the inner vector.
    pub fn take_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(vec: Vec<u8>) -> Self {
        Self(vec)
    }
}

impl From<Bytes> for Vec<u8> {
    fn from(bytes: Bytes) -> Self {
        bytes.0
    }
}

impl From<&[u8]> for Bytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl FromIterator<u8> for Bytes {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Bytes(iter.into_iter().collect())
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Debug for Bytes {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "Bytes({})", HexFmt(&self.0))
    }
}

impl Display for Bytes {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "{:10}", HexFmt(&self.0))
    }
}

impl ToBytes for Bytes {
    #[inline(always)]
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut buffer = Vec::with_capacity(self.serialized_length());
        super::write_u8_slice(self.as_slice(), &mut buffer)?;
        Ok(buffer)
    }

    #[inline(always)]
    fn serialized_length(&self) -> usize {
        super::u8_slice_serialized_length(&self.0)
    }

    #[inline(always)]
    fn write_bytes(&self, writer: &mut Vec<u8>) -> Result<(), Error> {
        super::write_u8_slice(self.as_slice(), writer)
    }
}

impl FromBytes for Bytes {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (result, remainder) = super::read_u8_slice(bytes)?;
        Ok((Bytes(result.to_vec()), remainder))
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            base16::encode_lower(&self.0).serialize(serializer)
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let hex_string = String::deserialize(deserializer)?;
            base16::decode(hex_string.as_bytes())
                .map(Bytes)
                .map_err(SerdeError::custom)
        } else {
            let bytes = Vec::<u8>::deserialize(deserializer)?;
            Ok(Bytes(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytesrepr;

    #[test]
    fn should_encode_like_a_byte_vector() {
        let bytes = Bytes::from(vec![1u8, 2, 3]);
        assert_eq!(
            bytes.to_bytes().unwrap(),
            vec![1u8, 2, 3].to_bytes().unwrap()
        );
        bytesrepr::test_serialization_roundtrip(&bytes);
    }

    #[test]
    fn json_is_hex() {
        let bytes = Bytes::from(vec![0xde, 0xad]);
        let json = serde_json::to_string(&bytes).unwrap();
        assert_eq!(json, "\"dead\"");
        assert_eq!(serde_json::from_str::<Bytes>(&json).unwrap(), bytes);
    }

    #[test]
    fn bincode_roundtrip() {
        let bytes = Bytes::from(vec![9u8; 40]);
        let encoded = bincode::serialize(&bytes).unwrap();
        assert_eq!(bincode::deserialize::<Bytes>(&encoded).unwrap(), bytes);
    }
}
