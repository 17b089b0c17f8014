//! Common types used across multiple components.

mod deploy;
mod message;
mod node_config;
mod weight;

pub use datasize::DataSize;
pub use deploy::{Approval, Deploy, DeployHash, DeployHeader, DeployValidationError};
pub use message::{
    Ballot, Block, BlockBody, Bond, GlobalState, Header, Justification, Message, MessageHash,
    MessageRole, MessageType, ValidatorId, VerificationError,
};
pub use node_config::{Error as ConfigError, NodeConfig};
pub use weight::{Weight, WeightMap};
