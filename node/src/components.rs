//! Components
//!
//! Components are the building blocks of the consensus core. Each one owns a single concern and
//! talks to the others through plain function calls and the types in [`crate::types`].
pub mod consensus;
pub mod contract_runtime;
pub mod storage;
