use std::{path::Path, str::FromStr};

use datasize::DataSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    components::{
        consensus::{highway_core::HighwayConfig, Config as ConsensusConfig},
        contract_runtime::Config as ContractRuntimeConfig,
        storage::Config as StorageConfig,
    },
    logging::LoggingConfig,
    utils::{self, ReadFileError, WithDir},
};

/// Error loading the node configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// The config file couldn't be read.
    #[error(transparent)]
    ReadFile(#[from] ReadFileError),
    /// The config file isn't valid TOML or doesn't match the expected layout.
    #[error("failed to decode config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Root configuration.
#[derive(Clone, DataSize, Debug, Deserialize, Serialize)]
// Disallow unknown fields to ensure config files and command-line overrides contain valid keys.
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Consensus configuration.
    #[serde(default)]
    pub consensus: ConsensusConfig,
    /// On-disk storage configuration.
    pub storage: StorageConfig,
    /// Highway era timing.
    pub highway: HighwayConfig,
    /// Contract runtime configuration.
    #[serde(default)]
    pub contract_runtime: ContractRuntimeConfig,
}

impl NodeConfig {
    /// Loads the config file at `path`.
    ///
    /// Relative paths inside the config are meant to be resolved against the returned directory,
    /// which is the one containing the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<WithDir<NodeConfig>, Error> {
        let path = path.as_ref();
        let bytes = utils::read_file(path)?;
        let config: NodeConfig = toml::from_slice(&bytes)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(WithDir::new(dir, config))
    }
}

impl FromStr for NodeConfig {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(input)?)
    }
}
