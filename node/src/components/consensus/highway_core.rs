//! The DAG-derived views of the Highway protocol.

mod dag_store;
pub mod era_clock;
pub mod finality_detector;
pub mod fork_choice;
mod message_factory;
pub mod weights;

pub use dag_store::{DagStore, DerivedFields, MessageKind, MessageMeta};
pub use era_clock::{Era, EraClock, EraState, HighwayConfig};
pub use finality_detector::{FinalityOracle, SummitDetector};
pub use message_factory::{DerivedInputs, MessageFactory, RoundInfo};
