use std::fmt::{self, Display, Formatter};

use datasize::DataSize;
use hex_fmt::HexFmt;
use serde::{Deserialize, Serialize};

use highway_hashing::Digest;

use crate::{
    bytesrepr::{self, Bytes, FromBytes, ToBytes, U8_SERIALIZED_LENGTH},
    RuntimeArgs,
};

/// The entry point invoked for session code and transfers.
pub const DEFAULT_ENTRY_POINT_NAME: &str = "call";

const MODULE_BYTES_TAG: u8 = 0;
const STORED_CONTRACT_BY_HASH_TAG: u8 = 1;
const STORED_CONTRACT_BY_NAME_TAG: u8 = 2;
const STORED_VERSIONED_CONTRACT_BY_HASH_TAG: u8 = 3;
const STORED_VERSIONED_CONTRACT_BY_NAME_TAG: u8 = 4;
const TRANSFER_TAG: u8 = 5;

/// The version of a contract within a contract package.
pub type ContractVersion = u32;

/// The payment or session part of a deploy.
///
/// `args` always hold serialized [`RuntimeArgs`]; they are only decoded when the item is handed
/// to the execution engine.
#[derive(Clone, DataSize, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
pub enum ExecutableDeployItem {
    /// Wasm to run directly.
    ModuleBytes {
        /// The wasm module.
        module_bytes: Bytes,
        /// Serialized runtime args.
        args: Bytes,
    },
    /// A stored contract addressed by its hash.
    StoredContractByHash {
        /// Contract hash.
        hash: Digest,
        /// Entry point to call.
        entry_point: String,
        /// Serialized runtime args.
        args: Bytes,
    },
    /// A stored contract addressed by a named key of the calling account.
    StoredContractByName {
        /// Named key.
        name: String,
        /// Entry point to call.
        entry_point: String,
        /// Serialized runtime args.
        args: Bytes,
    },
    /// A contract package addressed by its hash.
    StoredVersionedContractByHash {
        /// Contract package hash.
        hash: Digest,
        /// `None` selects the active version.
        version: Option<ContractVersion>,
        /// Entry point to call.
        entry_point: String,
        /// Serialized runtime args.
        args: Bytes,
    },
    /// A contract package addressed by a named key of the calling account.
    StoredVersionedContractByName {
        /// Named key holding the package hash.
        name: String,
        /// `None` selects the active version.
        version: Option<ContractVersion>,
        /// Entry point to call.
        entry_point: String,
        /// Serialized runtime args.
        args: Bytes,
    },
    /// A native transfer.
    Transfer {
        /// Serialized runtime args.
        args: Bytes,
    },
}

impl ExecutableDeployItem {
    /// Returns the serialized runtime args.
    pub fn args(&self) -> &Bytes {
        match self {
            ExecutableDeployItem::ModuleBytes { args, .. }
            | ExecutableDeployItem::StoredContractByHash { args, .. }
            | ExecutableDeployItem::StoredContractByName { args, .. }
            | ExecutableDeployItem::StoredVersionedContractByHash { args, .. }
            | ExecutableDeployItem::StoredVersionedContractByName { args, .. }
            | ExecutableDeployItem::Transfer { args } => args,
        }
    }

    /// Decodes the runtime args.
    pub fn into_runtime_args(self) -> Result<RuntimeArgs, bytesrepr::Error> {
        match self {
            ExecutableDeployItem::ModuleBytes { args, .. }
            | ExecutableDeployItem::StoredContractByHash { args, .. }
            | ExecutableDeployItem::StoredContractByName { args, .. }
            | ExecutableDeployItem::StoredVersionedContractByHash { args, .. }
            | ExecutableDeployItem::StoredVersionedContractByName { args, .. }
            | ExecutableDeployItem::Transfer { args } => bytesrepr::deserialize(args.into()),
        }
    }

    /// Returns the name of the entry point this item calls.
    pub fn entry_point_name(&self) -> &str {
        match self {
            ExecutableDeployItem::ModuleBytes { .. } | ExecutableDeployItem::Transfer { .. } => {
                DEFAULT_ENTRY_POINT_NAME
            }
            ExecutableDeployItem::StoredVersionedContractByName { entry_point, .. }
            | ExecutableDeployItem::StoredVersionedContractByHash { entry_point, .. }
            | ExecutableDeployItem::StoredContractByHash { entry_point, .. }
            | ExecutableDeployItem::StoredContractByName { entry_point, .. } => entry_point,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            ExecutableDeployItem::ModuleBytes { .. } => MODULE_BYTES_TAG,
            ExecutableDeployItem::StoredContractByHash { .. } => STORED_CONTRACT_BY_HASH_TAG,
            ExecutableDeployItem::StoredContractByName { .. } => STORED_CONTRACT_BY_NAME_TAG,
            ExecutableDeployItem::StoredVersionedContractByHash { .. } => {
                STORED_VERSIONED_CONTRACT_BY_HASH_TAG
            }
            ExecutableDeployItem::StoredVersionedContractByName { .. } => {
                STORED_VERSIONED_CONTRACT_BY_NAME_TAG
            }
            ExecutableDeployItem::Transfer { .. } => TRANSFER_TAG,
        }
    }
}

impl Display for ExecutableDeployItem {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ExecutableDeployItem::ModuleBytes { module_bytes, .. } => {
                write!(f, "module-bytes [{} bytes]", module_bytes.len())
            }
            ExecutableDeployItem::StoredContractByHash {
                hash, entry_point, ..
            } => write!(
                f,
                "stored-contract-by-hash: {:10}, entry-point: {}",
                HexFmt(hash),
                entry_point
            ),
            ExecutableDeployItem::StoredContractByName {
                name, entry_point, ..
            } => write!(f, "stored-contract-by-name: {}, entry-point: {}", name, entry_point),
            ExecutableDeployItem::StoredVersionedContractByHash {
                hash,
                version,
                entry_point,
                ..
            } => write!(
                f,
                "stored-versioned-contract-by-hash: {:10}, version: {:?}, entry-point: {}",
                HexFmt(hash),
                version,
                entry_point
            ),
            ExecutableDeployItem::StoredVersionedContractByName {
                name,
                version,
                entry_point,
                ..
            } => write!(
                f,
                "stored-versioned-contract-by-name: {}, version: {:?}, entry-point: {}",
                name, version, entry_point
            ),
            ExecutableDeployItem::Transfer { .. } => write!(f, "transfer"),
        }
    }
}

impl ToBytes for ExecutableDeployItem {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        buffer.push(self.tag());
        match self {
            ExecutableDeployItem::ModuleBytes { module_bytes, args } => {
                module_bytes.write_bytes(&mut buffer)?;
                args.write_bytes(&mut buffer)?;
            }
            ExecutableDeployItem::StoredContractByHash {
                hash,
                entry_point,
                args,
            } => {
                hash.write_bytes(&mut buffer)?;
                entry_point.write_bytes(&mut buffer)?;
                args.write_bytes(&mut buffer)?;
            }
            ExecutableDeployItem::StoredContractByName {
                name,
                entry_point,
                args,
            } => {
                name.write_bytes(&mut buffer)?;
                entry_point.write_bytes(&mut buffer)?;
                args.write_bytes(&mut buffer)?;
            }
            ExecutableDeployItem::StoredVersionedContractByHash {
                hash,
                version,
                entry_point,
                args,
            } => {
                hash.write_bytes(&mut buffer)?;
                version.write_bytes(&mut buffer)?;
                entry_point.write_bytes(&mut buffer)?;
                args.write_bytes(&mut buffer)?;
            }
            ExecutableDeployItem::StoredVersionedContractByName {
                name,
                version,
                entry_point,
                args,
            } => {
                name.write_bytes(&mut buffer)?;
                version.write_bytes(&mut buffer)?;
                entry_point.write_bytes(&mut buffer)?;
                args.write_bytes(&mut buffer)?;
            }
            ExecutableDeployItem::Transfer { args } => {
                args.write_bytes(&mut buffer)?;
            }
        }
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        U8_SERIALIZED_LENGTH
            + match self {
                ExecutableDeployItem::ModuleBytes { module_bytes, args } => {
                    module_bytes.serialized_length() + args.serialized_length()
                }
                ExecutableDeployItem::StoredContractByHash {
                    hash,
                    entry_point,
                    args,
                } => {
                    hash.serialized_length()
                        + entry_point.serialized_length()
                        + args.serialized_length()
                }
                ExecutableDeployItem::StoredContractByName {
                    name,
                    entry_point,
                    args,
                } => {
                    name.serialized_length()
                        + entry_point.serialized_length()
                        + args.serialized_length()
                }
                ExecutableDeployItem::StoredVersionedContractByHash {
                    hash,
                    version,
                    entry_point,
                    args,
                } => {
                    hash.serialized_length()
                        + version.serialized_length()
                        + entry_point.serialized_length()
                        + args.serialized_length()
                }
                ExecutableDeployItem::StoredVersionedContractByName {
                    name,
                    version,
                    entry_point,
                    args,
                } => {
                    name.serialized_length()
                        + version.serialized_length()
                        + entry_point.serialized_length()
                        + args.serialized_length()
                }
                ExecutableDeployItem::Transfer { args } => args.serialized_length(),
            }
    }
}

impl FromBytes for ExecutableDeployItem {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (tag, remainder) = u8::from_bytes(bytes)?;
        match tag {
            MODULE_BYTES_TAG => {
                let (module_bytes, remainder) = Bytes::from_bytes(remainder)?;
                let (args, remainder) = Bytes::from_bytes(remainder)?;
                Ok((
                    ExecutableDeployItem::ModuleBytes { module_bytes, args },
                    remainder,
                ))
            }
            STORED_CONTRACT_BY_HASH_TAG => {
                let (hash, remainder) = Digest::from_bytes(remainder)?;
                let (entry_point, remainder) = String::from_bytes(remainder)?;
                let (args, remainder) = Bytes::from_bytes(remainder)?;
                Ok((
                    ExecutableDeployItem::StoredContractByHash {
                        hash,
                        entry_point,
                        args,
                    },
                    remainder,
                ))
            }
            STORED_CONTRACT_BY_NAME_TAG => {
                let (name, remainder) = String::from_bytes(remainder)?;
                let (entry_point, remainder) = String::from_bytes(remainder)?;
                let (args, remainder) = Bytes::from_bytes(remainder)?;
                Ok((
                    ExecutableDeployItem::StoredContractByName {
                        name,
                        entry_point,
                        args,
                    },
                    remainder,
                ))
            }
            STORED_VERSIONED_CONTRACT_BY_HASH_TAG => {
                let (hash, remainder) = Digest::from_bytes(remainder)?;
                let (version, remainder) = Option::<ContractVersion>::from_bytes(remainder)?;
                let (entry_point, remainder) = String::from_bytes(remainder)?;
                let (args, remainder) = Bytes::from_bytes(remainder)?;
                Ok((
                    ExecutableDeployItem::StoredVersionedContractByHash {
                        hash,
                        version,
                        entry_point,
                        args,
                    },
                    remainder,
                ))
            }
            STORED_VERSIONED_CONTRACT_BY_NAME_TAG => {
                let (name, remainder) = String::from_bytes(remainder)?;
                let (version, remainder) = Option::<ContractVersion>::from_bytes(remainder)?;
                let (entry_point, remainder) = String::from_bytes(remainder)?;
                let (args, remainder) = Bytes::from_bytes(remainder)?;
                Ok((
                    ExecutableDeployItem::StoredVersionedContractByName {
                        name,
                        version,
                        entry_point,
                        args,
                    },
                    remainder,
                ))
            }
            TRANSFER_TAG => {
                let (args, remainder) = Bytes::from_bytes(remainder)?;
                Ok((ExecutableDeployItem::Transfer { args }, remainder))
            }
            _ => Err(bytesrepr::Error::Formatting),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_args() -> Bytes {
        let mut args = RuntimeArgs::new();
        args.insert("amount", 10u64).unwrap();
        Bytes::from(args.to_bytes().unwrap())
    }

    #[test]
    fn entry_point_defaults_to_call() {
        let transfer = ExecutableDeployItem::Transfer {
            args: transfer_args(),
        };
        assert_eq!(transfer.entry_point_name(), DEFAULT_ENTRY_POINT_NAME);

        let stored = ExecutableDeployItem::StoredVersionedContractByName {
            name: "faucet".to_string(),
            version: Some(2),
            entry_point: "claim".to_string(),
            args: Bytes::new(),
        };
        assert_eq!(stored.entry_point_name(), "claim");
    }

    #[test]
    fn should_decode_runtime_args() {
        let item = ExecutableDeployItem::ModuleBytes {
            module_bytes: Bytes::from(vec![0, 97, 115, 109]),
            args: transfer_args(),
        };
        let args = item.into_runtime_args().unwrap();
        assert_eq!(args.len(), 1);
        assert!(args.get("amount").is_some());
    }

    #[test]
    fn malformed_args_are_an_encoding_error() {
        let item = ExecutableDeployItem::StoredContractByHash {
            hash: Digest::hash(b"contract"),
            entry_point: "run".to_string(),
            args: Bytes::from(vec![5, 0, 0]),
        };
        assert_eq!(
            item.into_runtime_args().unwrap_err(),
            bytesrepr::Error::EarlyEndOfStream
        );
    }

    #[test]
    fn every_variant_keeps_its_declared_length() {
        let items = vec![
            ExecutableDeployItem::ModuleBytes {
                module_bytes: Bytes::from(vec![1, 2, 3]),
                args: transfer_args(),
            },
            ExecutableDeployItem::StoredContractByHash {
                hash: Digest::hash(b"a"),
                entry_point: "a".to_string(),
                args: Bytes::new(),
            },
            ExecutableDeployItem::StoredContractByName {
                name: "b".to_string(),
                entry_point: "b".to_string(),
                args: transfer_args(),
            },
            ExecutableDeployItem::StoredVersionedContractByHash {
                hash: Digest::hash(b"c"),
                version: None,
                entry_point: "c".to_string(),
                args: Bytes::new(),
            },
            ExecutableDeployItem::StoredVersionedContractByName {
                name: "d".to_string(),
                version: Some(4),
                entry_point: "d".to_string(),
                args: transfer_args(),
            },
            ExecutableDeployItem::Transfer {
                args: transfer_args(),
            },
        ];
        for item in &items {
            bytesrepr::test_serialization_roundtrip(item);
        }
    }
}
