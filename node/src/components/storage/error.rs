use std::{io, path::PathBuf};

use thiserror::Error;

/// A specialized `Result` type for message store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a message store.
#[derive(Debug, Error)]
pub enum Error {
    /// Failure to create the database directory.
    #[error("failed to create database directory `{}`: {}", .0.display(), .1)]
    CreateDatabaseDirectory(PathBuf, io::Error),
    /// Error from the LMDB environment or a transaction.
    #[error("internal database error: {0}")]
    Lmdb(#[from] lmdb::Error),
    /// A message failed to serialize or a stored one failed to deserialize.
    #[error("failed to (de)serialize stored message: {0}")]
    Serialization(#[from] bincode::Error),
    /// A stored key is not a valid message hash.
    #[error("stored key of length {0} is not a message hash")]
    InvalidKey(usize),
    /// The store was used after being closed.
    #[error("message store is closed")]
    Closed,
}
