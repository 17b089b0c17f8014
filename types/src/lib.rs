//! Types shared by the Highway consensus core and its collaborators.
//!
//! Everything that gets hashed or signed has a canonical [`bytesrepr`] encoding; everything that
//! gets stored or configured also implements `serde`.

#![doc(test(attr(deny(warnings))))]
#![warn(missing_docs)]

mod account_hash;
pub mod bytesrepr;
pub mod crypto;
mod executable_deploy_item;
mod protocol_version;
mod runtime_args;
#[cfg(any(feature = "testing", test))]
pub mod testing;
mod timestamp;

pub use account_hash::{AccountHash, ACCOUNT_HASH_LENGTH};
pub use crypto::{PublicKey, SecretKey, Signature, SignatureAlgorithm};
pub use executable_deploy_item::{ContractVersion, ExecutableDeployItem, DEFAULT_ENTRY_POINT_NAME};
pub use highway_hashing::Digest;
pub use protocol_version::{ParseProtocolVersionError, ProtocolVersion};
pub use runtime_args::{NamedArg, RuntimeArgs};
pub use timestamp::{Tick, TickDiff, TickUnit, TimeDiff};
