//! # Highway consensus core
//!
//! This crate contains the core of a Highway proof-of-stake validator: the message DAG and its
//! store, fork choice, the validator weight ledger, era timing, finality detection and the
//! factory producing new blocks and ballots.
//!
//! ## Crate structure
//!
//! The consensus logic lives in [`components::consensus`]. Messages are persisted through
//! [`components::storage`] and deploys are handed to an execution engine through
//! [`components::contract_runtime`].

#![doc(test(attr(forbid(warnings))))]
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_qualifications
)]

pub mod components;
pub mod logging;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod utils;

pub use components::{
    consensus::{Config as ConsensusConfig, Error as ConsensusError},
    contract_runtime::{Config as ContractRuntimeConfig, Error as ContractRuntimeError},
    storage::{Config as StorageConfig, Error as StorageError},
};
pub use logging::{LoggingConfig, LoggingFormat};
