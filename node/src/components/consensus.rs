//! The Highway consensus core.
//!
//! The core keeps the message DAG in a [`DagStore`](highway_core::DagStore) and derives
//! everything else from it on demand: main-chain membership and fork choice, the weight map a
//! block inherits, era timing and the fault tolerance of a candidate block. New messages are
//! produced by a [`MessageFactory`](highway_core::MessageFactory).

mod config;
mod error;
pub mod highway_core;

pub use config::Config;
pub use error::{Error, Violation};
