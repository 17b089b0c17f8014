//! Cryptographic types: the signature algorithms, keys and detached signatures used by
//! consensus messages and deploy approvals.

mod asymmetric_key;
mod error;

pub use asymmetric_key::{PublicKey, SecretKey, Signature, SignatureAlgorithm};
pub use error::Error;
