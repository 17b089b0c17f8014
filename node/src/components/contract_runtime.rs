//! The boundary to the execution engine.
//!
//! Deploys are translated into [`DeployItem`]s, packed into size-bounded [`ExecuteRequest`]s and
//! handed to an [`ExecutionEngine`] one request at a time, each on top of the state the previous
//! request produced.

mod config;
mod deploy_item;
mod error;
mod execute_request;

use datasize::DataSize;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use highway_types::{Digest, ProtocolVersion, Tick};

pub use config::Config;
pub use deploy_item::DeployItem;
pub use error::Error;
pub use execute_request::ExecuteRequest;

use crate::types::{Deploy, DeployHash};

/// The outcome of executing a single deploy.
#[derive(Clone, DataSize, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionResult {
    /// The deploy ran to completion.
    Success {
        /// Gas spent.
        cost: u64,
    },
    /// The deploy was executed but failed; its payment still applies.
    Failure {
        /// Why it failed.
        error_message: String,
        /// Gas spent.
        cost: u64,
    },
}

/// The engine's answer to one [`ExecuteRequest`].
#[derive(Clone, DataSize, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// The global state after the whole request.
    pub post_state_hash: Digest,
    /// One result per deploy, in request order.
    pub results: Vec<ExecutionResult>,
}

/// A request/response service executing deploys against a global state.
pub trait ExecutionEngine {
    /// Executes every deploy of `request` in order, starting from its parent state.
    fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, Error>;
}

/// The combined outcome of [`execute_batched`].
#[derive(Debug)]
pub struct BlockExecution {
    /// The state after the last request.
    pub post_state_hash: Digest,
    /// Results of every executed deploy, in input order.
    pub results: Vec<(DeployHash, ExecutionResult)>,
    /// Deploys that couldn't be translated and were never sent to the engine.
    pub rejected: Vec<(DeployHash, Error)>,
}

/// Executes `deploys` on top of `pre_state_hash`, in order, using as many requests as
/// `max_request_size` demands.
///
/// A deploy that fails translation is rejected on its own and doesn't stop the others.
pub fn execute_batched<E: ExecutionEngine + ?Sized>(
    engine: &E,
    pre_state_hash: Digest,
    block_time: Tick,
    protocol_version: ProtocolVersion,
    deploys: &[Deploy],
    max_request_size: usize,
) -> Result<BlockExecution, Error> {
    let mut items = Vec::with_capacity(deploys.len());
    let mut rejected = vec![];
    for deploy in deploys {
        match deploy.to_deploy_item() {
            Ok(item) => items.push(item),
            Err(error) => {
                warn!(deploy_hash = %deploy.id(), %error, "rejecting deploy");
                rejected.push((*deploy.id(), error));
            }
        }
    }

    let requests = ExecuteRequest::batches(
        pre_state_hash,
        block_time,
        items,
        protocol_version,
        max_request_size,
    )?;
    let batch_count = requests.len();
    let mut state_hash = pre_state_hash;
    let mut results = vec![];
    for (index, mut request) in requests.into_iter().enumerate() {
        request.parent_state_hash = state_hash;
        let deploy_hashes: Vec<DeployHash> = request
            .deploys
            .iter()
            .map(|item| item.deploy_hash)
            .collect();
        debug!(
            batch = index + 1,
            batch_count,
            deploys = deploy_hashes.len(),
            parent_state_hash = %state_hash,
            "executing batch"
        );
        let response = engine.execute(request)?;
        if response.results.len() != deploy_hashes.len() {
            return Err(Error::Engine(format!(
                "expected {} execution results, got {}",
                deploy_hashes.len(),
                response.results.len()
            )));
        }
        state_hash = response.post_state_hash;
        results.extend(deploy_hashes.into_iter().zip(response.results));
    }

    Ok(BlockExecution {
        post_state_hash: state_hash,
        results,
        rejected,
    })
}
