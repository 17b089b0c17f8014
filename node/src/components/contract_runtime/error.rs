use thiserror::Error;

use highway_types::{bytesrepr, crypto};

use crate::types::DeployHash;

/// An error raised while translating or executing deploys.
#[derive(Debug, Error)]
pub enum Error {
    /// An approval names an unusable signature algorithm or key.
    #[error("invalid approval: {0}")]
    Approval(crypto::Error),
    /// A payment or session argument payload doesn't decode.
    #[error("malformed deploy arguments: {0}")]
    Args(bytesrepr::Error),
    /// A single deploy doesn't fit into any request.
    #[error(
        "deploy {deploy_hash} needs a request of {size} bytes, limit is below {max_request_size}"
    )]
    DeployTooLarge {
        /// The offending deploy.
        deploy_hash: DeployHash,
        /// Serialized size of a request carrying only this deploy.
        size: usize,
        /// The exclusive request size limit.
        max_request_size: usize,
    },
    /// Encoding a request failed.
    #[error(transparent)]
    Encoding(#[from] bytesrepr::Error),
    /// The execution engine reported a failure for a whole request.
    #[error("execution engine error: {0}")]
    Engine(String),
}
