//! Service configuration.
//!
//! Settings come from an optional JSON file named by `INTEREP_SYNC_CONFIG`, then from `INTEREP_*`
//! environment variables. Every field has a default, so an empty file is valid; the contract and
//! sender addresses still have to be supplied one way or the other.

use crate::merkle::MAX_TREE_DEPTH;
use crate::sync::SyncConfig;

use alloy_primitives::Address;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the path of the JSON config file.
pub const CONFIG_PATH_ENV: &str = "INTEREP_SYNC_CONFIG";

/// Deepest confirmation requirement accepted.
pub const MAX_CONFIRMATIONS: u64 = 1_000;

/// Default number of blocks per event query.
pub const DEFAULT_LOG_WINDOW_BLOCKS: u64 = 500;

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Depth of every group tree
    pub tree_depth: usize,
    /// JSON-RPC endpoint of the Ethereum node
    pub rpc_url: String,
    pub contract_address: String,
    /// Node-managed account used to send batches
    pub sender_address: String,
    /// First block scanned for contract events
    pub deployment_block: u64,
    /// Blocks covered by one `eth_getLogs` request
    pub log_window_blocks: u64,
    /// Directory of the commitment log; without it admissions are kept in memory only
    pub data_dir: Option<PathBuf>,
    pub confirmations: u64,
    pub batch_interval_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub retry_initial_secs: u64,
    pub retry_max_secs: u64,
    pub retry_multiplier: f64,
    pub poll_interval_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            tree_depth: 20,
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: String::new(),
            sender_address: String::new(),
            deployment_block: 0,
            log_window_blocks: DEFAULT_LOG_WINDOW_BLOCKS,
            data_dir: None,
            confirmations: sync.confirmations,
            batch_interval_secs: sync.batch_interval.as_secs(),
            confirmation_timeout_secs: sync.confirmation_timeout.as_secs(),
            retry_initial_secs: sync.retry_initial_interval.as_secs(),
            retry_max_secs: sync.retry_max_interval.as_secs(),
            retry_multiplier: sync.retry_multiplier,
            poll_interval_ms: 2000,
        }
    }
}

impl ServiceConfig {
    /// Load the file named by `INTEREP_SYNC_CONFIG` (if set), apply environment overrides and
    /// validate the result.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Override fields from `INTEREP_*` variables as returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("INTEREP_RPC_URL") {
            self.rpc_url = value;
        }
        if let Some(value) = lookup("INTEREP_CONTRACT_ADDRESS") {
            self.contract_address = value;
        }
        if let Some(value) = lookup("INTEREP_SENDER_ADDRESS") {
            self.sender_address = value;
        }
        if let Some(value) = lookup("INTEREP_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("INTEREP_TREE_DEPTH") {
            self.tree_depth = value
                .parse()
                .map_err(|_| invalid("tree_depth", format!("'{}' is not a number", value)))?;
        }
        if let Some(value) = lookup("INTEREP_DEPLOYMENT_BLOCK") {
            self.deployment_block = value
                .parse()
                .map_err(|_| invalid("deployment_block", format!("'{}' is not a number", value)))?;
        }
        if let Some(value) = lookup("INTEREP_LOG_WINDOW_BLOCKS") {
            self.log_window_blocks = value
                .parse()
                .map_err(|_| invalid("log_window_blocks", format!("'{}' is not a number", value)))?;
        }
        if let Some(value) = lookup("INTEREP_CONFIRMATIONS") {
            self.confirmations = value
                .parse()
                .map_err(|_| invalid("confirmations", format!("'{}' is not a number", value)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tree_depth == 0 || self.tree_depth > MAX_TREE_DEPTH {
            return Err(invalid(
                "tree_depth",
                format!("{} is outside 1..={}", self.tree_depth, MAX_TREE_DEPTH),
            ));
        }
        if !(self.rpc_url.starts_with("http://") || self.rpc_url.starts_with("https://")) {
            return Err(invalid("rpc_url", format!("'{}' is not an HTTP URL", self.rpc_url)));
        }
        self.contract_address()?;
        self.sender_address()?;
        if self.confirmations == 0 || self.confirmations > MAX_CONFIRMATIONS {
            return Err(invalid(
                "confirmations",
                format!("{} is outside 1..={}", self.confirmations, MAX_CONFIRMATIONS),
            ));
        }
        if self.log_window_blocks == 0 {
            return Err(invalid("log_window_blocks", "must be at least 1"));
        }
        if self.batch_interval_secs == 0 || self.confirmation_timeout_secs == 0 {
            return Err(invalid(
                "batch_interval_secs",
                "batch interval and confirmation timeout must be positive",
            ));
        }
        if self.retry_multiplier < 1.0 || self.retry_initial_secs > self.retry_max_secs {
            return Err(invalid(
                "retry_multiplier",
                "retry delays must not shrink between attempts",
            ));
        }
        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address, ConfigError> {
        parse_address("contract_address", &self.contract_address)
    }

    pub fn sender_address(&self) -> Result<Address, ConfigError> {
        parse_address("sender_address", &self.sender_address)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            confirmations: self.confirmations,
            batch_interval: Duration::from_secs(self.batch_interval_secs),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            retry_initial_interval: Duration::from_secs(self.retry_initial_secs),
            retry_max_interval: Duration::from_secs(self.retry_max_secs),
            retry_multiplier: self.retry_multiplier,
        }
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    if value.is_empty() {
        return Err(invalid(field, "not set"));
    }
    value
        .parse::<Address>()
        .map_err(|e| invalid(field, format!("'{}': {}", value, e)))
}
