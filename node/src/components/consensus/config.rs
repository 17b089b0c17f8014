use std::path::{Path, PathBuf};

use datasize::DataSize;
use num_rational::Ratio;
use serde::{Deserialize, Serialize};

use highway_types::{crypto, SecretKey};

use super::{
    highway_core::{DagStore, FinalityOracle, SummitDetector},
    Error,
};
use crate::types::{MessageHash, WeightMap};

/// Consensus configuration.
#[derive(DataSize, Debug, Deserialize, Serialize, Clone)]
// Disallow unknown fields to ensure config files contain valid keys.
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Path to secret key file, relative to the config file's directory unless absolute.
    pub secret_key_path: PathBuf,
    /// The fault tolerance a block needs, as a fraction of the total weight, to count as final.
    #[data_size(skip)]
    pub finality_threshold_fraction: Ratio<u64>,
    /// The highest summit level the finality detector looks for.
    pub max_summit_level: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            secret_key_path: PathBuf::from("secret_key.pem"),
            finality_threshold_fraction: Ratio::new(1, 3),
            max_summit_level: 8,
        }
    }
}

impl Config {
    /// Loads the validator's secret key, resolving a relative path against `root`.
    pub fn load_secret_key(&self, root: &Path) -> Result<SecretKey, crypto::Error> {
        let path = if self.secret_key_path.is_relative() {
            root.join(&self.secret_key_path)
        } else {
            self.secret_key_path.clone()
        };
        SecretKey::from_file(path)
    }

    /// Returns whether `candidate`'s fault tolerance, as found by a summit detector limited to
    /// `max_summit_level`, reaches `finality_threshold_fraction`.
    pub fn is_final(
        &self,
        dag: &DagStore,
        weights: &WeightMap,
        candidate: &MessageHash,
    ) -> Result<bool, Error> {
        SummitDetector::from(self).is_finalized(
            dag,
            weights,
            candidate,
            self.finality_threshold_fraction,
        )
    }
}
