// crates/ecdysis-daemon/src/config.rs
//
// Runtime configuration for the Ecdysis node daemon.
// Loaded from a TOML file or populated with sensible defaults.

use serde::Deserialize;
use std::fs;

/// Errors from loading the daemon configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read. The daemon runs with defaults.
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but its contents are not a usable configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Directory for local data storage (RocksDB, migration artifacts).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Host address for the RPC server.
    #[serde(default = "default_rpc_host")]
    pub rpc_host: String,

    /// Port for the RPC server.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Number of blocks in each consensus epoch.
    #[serde(default = "default_blocks_per_epoch")]
    pub blocks_per_epoch: u64,

    /// Simulated block interval in milliseconds.
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,
}

fn default_data_dir() -> String {
    "~/.ecdysis/data".to_string()
}

fn default_rpc_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    50052
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_blocks_per_epoch() -> u64 {
    100
}

fn default_block_interval_ms() -> u64 {
    1000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            rpc_host: default_rpc_host(),
            rpc_port: default_rpc_port(),
            log_level: default_log_level(),
            blocks_per_epoch: default_blocks_per_epoch(),
            block_interval_ms: default_block_interval_ms(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// A missing or unreadable file is `Unreadable`; bad TOML or values that
    /// fail `validate` are `Invalid`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: DaemonConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Reject values the block driver cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.blocks_per_epoch == 0 {
            return Err("blocks_per_epoch must be greater than zero".to_string());
        }
        if self.block_interval_ms == 0 {
            return Err("block_interval_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}
