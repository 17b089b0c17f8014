use std::{
    fmt::{self, Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};

use datasize::DataSize;
use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::bytesrepr::{self, FromBytes, ToBytes, U32_SERIALIZED_LENGTH};

/// Error parsing a `major.minor.patch` protocol version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseProtocolVersionError {
    /// Wrong number of dot-separated components.
    #[error("invalid protocol version '{0}': expected major.minor.patch")]
    InvalidFormat(String),
    /// A component is not a number.
    #[error("invalid protocol version component: {0}")]
    InvalidNumber(#[from] ParseIntError),
}

/// The protocol version a message or an execution request was produced under.
#[derive(DataSize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProtocolVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl ProtocolVersion {
    /// Version 1.0.0.
    pub const V1_0_0: ProtocolVersion = ProtocolVersion::from_parts(1, 0, 0);

    /// Constructs a version from its components.
    pub const fn from_parts(major: u32, minor: u32, patch: u32) -> Self {
        ProtocolVersion {
            major,
            minor,
            patch,
        }
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ProtocolVersion {
    type Err = ParseProtocolVersionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value.split('.').collect::<Vec<_>>();
        if parts.len() != 3 {
            return Err(ParseProtocolVersionError::InvalidFormat(value.to_string()));
        }
        Ok(ProtocolVersion {
            major: parts[0].parse()?,
            minor: parts[1].parse()?,
            patch: parts[2].parse()?,
        })
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.to_string().serialize(serializer)
        } else {
            (self.major, self.minor, self.patch).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let value_as_string = String::deserialize(deserializer)?;
            ProtocolVersion::from_str(&value_as_string).map_err(SerdeError::custom)
        } else {
            let (major, minor, patch) = <(u32, u32, u32)>::deserialize(deserializer)?;
            Ok(ProtocolVersion::from_parts(major, minor, patch))
        }
    }
}

impl ToBytes for ProtocolVersion {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        buffer.extend(self.major.to_bytes()?);
        buffer.extend(self.minor.to_bytes()?);
        buffer.extend(self.patch.to_bytes()?);
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        3 * U32_SERIALIZED_LENGTH
    }
}

impl FromBytes for ProtocolVersion {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (major, remainder) = u32::from_bytes(bytes)?;
        let (minor, remainder) = u32::from_bytes(remainder)?;
        let (patch, remainder) = u32::from_bytes(remainder)?;
        Ok((ProtocolVersion::from_parts(major, minor, patch), remainder))
    }
}
