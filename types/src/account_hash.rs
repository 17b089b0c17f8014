use std::{
    array::TryFromSliceError,
    convert::TryFrom,
    fmt::{self, Debug, Display, Formatter},
};

use datasize::DataSize;
use hex_fmt::HexFmt;
#[cfg(any(feature = "testing", test))]
use rand::Rng;
use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};

use highway_hashing::Digest;

#[cfg(any(feature = "testing", test))]
use crate::testing::TestRng;
use crate::bytesrepr::{self, FromBytes, ToBytes};

/// The length in bytes of an [`AccountHash`].
pub const ACCOUNT_HASH_LENGTH: usize = 32;

/// A Blake2b hash of an algorithm name and a public key; identifies validators and deploy
/// approvers.
#[derive(DataSize, Default, PartialOrd, Ord, PartialEq, Eq, Hash, Clone, Copy)]
pub struct AccountHash([u8; ACCOUNT_HASH_LENGTH]);

impl AccountHash {
    /// Constructs a new `AccountHash` instance from the raw bytes of an account hash.
    pub const fn new(value: [u8; ACCOUNT_HASH_LENGTH]) -> AccountHash {
        AccountHash(value)
    }

    /// Returns the raw bytes of the account hash as an array.
    pub fn value(&self) -> [u8; ACCOUNT_HASH_LENGTH] {
        self.0
    }

    /// Returns the raw bytes of the account hash as a `slice`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hashes the algorithm name, a zero separator and the public key bytes.
    pub fn from_public_key(algorithm_name: &str, public_key_bytes: &[u8]) -> Self {
        let mut preimage =
            Vec::with_capacity(algorithm_name.len() + 1 + public_key_bytes.len());
        preimage.extend(algorithm_name.as_bytes());
        preimage.push(0);
        preimage.extend(public_key_bytes);
        AccountHash(Digest::hash(&preimage).value())
    }

    /// Returns a random account hash.
    #[cfg(any(feature = "testing", test))]
    pub fn random(rng: &mut TestRng) -> Self {
        AccountHash(rng.gen())
    }
}

impl Display for AccountHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:10}", HexFmt(&self.0))
    }
}

impl Debug for AccountHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "AccountHash({})", base16::encode_lower(&self.0))
    }
}

impl From<[u8; ACCOUNT_HASH_LENGTH]> for AccountHash {
    fn from(bytes: [u8; ACCOUNT_HASH_LENGTH]) -> Self {
        AccountHash(bytes)
    }
}

impl TryFrom<&[u8]> for AccountHash {
    type Error = TryFromSliceError;

    fn try_from(bytes: &[u8]) -> Result<Self, TryFromSliceError> {
        <[u8; ACCOUNT_HASH_LENGTH]>::try_from(bytes).map(AccountHash)
    }
}

impl ToBytes for AccountHash {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        self.0.to_bytes()
    }

    fn serialized_length(&self) -> usize {
        ACCOUNT_HASH_LENGTH
    }

    fn write_bytes(&self, writer: &mut Vec<u8>) -> Result<(), bytesrepr::Error> {
        writer.extend_from_slice(&self.0);
        Ok(())
    }
}

impl FromBytes for AccountHash {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (bytes, rem) = <[u8; ACCOUNT_HASH_LENGTH]>::from_bytes(bytes)?;
        Ok((AccountHash(bytes), rem))
    }
}

impl Serialize for AccountHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            base16::encode_lower(&self.0).serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AccountHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let hex_string = String::deserialize(deserializer)?;
            let mut bytes = [0u8; ACCOUNT_HASH_LENGTH];
            hex::decode_to_slice(hex_string, &mut bytes).map_err(SerdeError::custom)?;
            Ok(AccountHash(bytes))
        } else {
            let bytes = <[u8; ACCOUNT_HASH_LENGTH]>::deserialize(deserializer)?;
            Ok(AccountHash(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_hash_name_separator_and_key() {
        let key = [3u8; 32];
        let mut preimage = b"ed25519".to_vec();
        preimage.push(0);
        preimage.extend_from_slice(&key);
        assert_eq!(
            AccountHash::from_public_key("ed25519", &key).value(),
            Digest::hash(&preimage).value()
        );
    }

    #[test]
    fn should_serialize_as_hex_in_json() {
        let mut rng = TestRng::new();
        let account_hash = AccountHash::random(&mut rng);
        let json = serde_json::to_string(&account_hash).unwrap();
        assert_eq!(json, format!("\"{}\"", base16::encode_lower(&account_hash.0)));
        assert_eq!(
            serde_json::from_str::<AccountHash>(&json).unwrap(),
            account_hash
        );
        bytesrepr::test_serialization_roundtrip(&account_hash);
    }

    #[test]
    fn try_from_slice_checks_length() {
        assert!(AccountHash::try_from(&[0u8; 31][..]).is_err());
        assert!(AccountHash::try_from(&[0u8; 32][..]).is_ok());
    }
}
