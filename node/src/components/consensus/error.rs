use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use highway_types::{bytesrepr, crypto};

use crate::{
    components::storage,
    types::{MessageHash, ValidatorId, VerificationError},
    utils::DisplayIter,
};

/// A way in which a message breaks the DAG's structural rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// A ballot must have exactly one parent.
    BallotParentCount(usize),
    /// A ballot was found as the main parent of a message.
    BallotAsMainParent(MessageHash),
    /// A message has no weight map to inherit, e.g. a ballot without parents.
    NoWeightMap,
    /// More than one justification cites the same validator.
    DuplicateJustification(ValidatorId),
}

impl Display for Violation {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        match self {
            Violation::BallotParentCount(count) => {
                write!(formatter, "ballot has {} parents instead of one", count)
            }
            Violation::BallotAsMainParent(parent) => {
                write!(formatter, "main parent {} is a ballot", parent)
            }
            Violation::NoWeightMap => formatter.write_str("no weight map to inherit"),
            Violation::DuplicateJustification(validator) => {
                write!(formatter, "more than one justification by {}", validator)
            }
        }
    }
}

/// Error returned by the consensus core.
#[derive(Debug, Error)]
pub enum Error {
    /// A message references hashes the DAG doesn't know.
    #[error("{message} depends on unknown messages: {}", DisplayIter::new(.missing))]
    MissingDependency {
        /// The referencing message.
        message: MessageHash,
        /// Every referenced hash that is absent.
        missing: Vec<MessageHash>,
    },
    /// A hash that was asked about is not in the DAG.
    #[error("unknown message {0}")]
    UnknownMessage(MessageHash),
    /// A message breaks the DAG's structural rules.
    #[error("structural violation in {hash}: {violation}")]
    StructuralViolation {
        /// The offending message.
        hash: MessageHash,
        /// What is wrong with it.
        violation: Violation,
    },
    /// A message failed hash or signature verification.
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// Signing or key handling failed.
    #[error(transparent)]
    Crypto(#[from] crypto::Error),
    /// Encoding failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] bytesrepr::Error),
    /// The message store failed.
    #[error(transparent)]
    Storage(#[from] storage::Error),
}
