use datasize::DataSize;
use serde::{Deserialize, Serialize};

/// 10 MiB, comfortably below typical transport frame limits.
const DEFAULT_MAX_EXECUTE_REQUEST_SIZE: u32 = 10 * 1024 * 1024;

/// Contract runtime configuration.
#[derive(Clone, Copy, DataSize, Debug, Deserialize, Serialize)]
// Disallow unknown fields to ensure config files and command-line overrides contain valid keys.
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Every execute request sent to the engine serializes to strictly fewer bytes than this.
    ///
    /// Defaults to 10 MiB.
    max_execute_request_size: Option<u32>,
}

impl Config {
    pub(crate) fn max_execute_request_size(&self) -> usize {
        self.max_execute_request_size
            .unwrap_or(DEFAULT_MAX_EXECUTE_REQUEST_SIZE) as usize
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_execute_request_size: Some(DEFAULT_MAX_EXECUTE_REQUEST_SIZE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_limit_falls_back_to_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(
            config.max_execute_request_size(),
            DEFAULT_MAX_EXECUTE_REQUEST_SIZE as usize
        );

        let config: Config = toml::from_str("max_execute_request_size = 4096").unwrap();
        assert_eq!(config.max_execute_request_size(), 4096);

        assert!(toml::from_str::<Config>("max_query_depth = 5").is_err());
    }
}
