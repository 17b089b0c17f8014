use std::{io, path::PathBuf};

use ed25519_dalek::SignatureError;
use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The signature algorithm name is not one this node knows.
    #[error("unknown signature algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Error resulting from creating or using asymmetric key types.
    #[error("asymmetric key error: {0}")]
    AsymmetricKey(String),

    /// Signature error.
    #[error("signature error: {0}")]
    SignatureError(#[from] SignatureError),

    /// A key could not be decoded from PEM.
    #[error("failed to decode from PEM: {0}")]
    FromPem(String),

    /// A key file could not be read.
    #[error("unable to read key file {}: {error}", path.display())]
    ReadKeyFile {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A key file could not be written.
    #[error("unable to write key file {}: {error}", path.display())]
    WriteKeyFile {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
}
