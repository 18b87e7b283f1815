//! Configuration management for ledgermirror
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use ledgermirror::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Mirroring contract: {:?}", config.ledger.contract_address);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `LEDGERMIRROR__<section>__<key>`
//!
//! Examples:
//! - `LEDGERMIRROR__LEDGER__RPC_URL=https://node.example:8545`
//! - `LEDGERMIRROR__LEDGER__START_BLOCK=1200`
//! - `LEDGERMIRROR__SYNC__HEARTBEAT_TIMEOUT=45s`
//!
//! `WEB3_PROVIDER` supplies the RPC URL when `ledger.rpc_url` is not set.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/ledgermirror.toml`.
//! This can be overridden using the `LEDGERMIRROR_CONFIG` environment variable
//! or the `--config` flag.

mod models;
mod sources;
mod validation;

use std::path::PathBuf;

// Re-export public types
pub use crate::humanize::HumanDuration;
pub use models::{Config, LedgerConfig, MirrorConfig, ServerConfig, SyncConfig};
pub use validation::ValidationError;

use thiserror::Error;

use crate::chain::RpcSettings;
use crate::model::Address;
use crate::reconcile::{Backoff, ReconcilerSettings, SupervisorSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`LEDGERMIRROR__*`)
    /// 2. TOML file (default: `config/ledgermirror.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (missing contract, bad endpoint, inconsistent timings)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Same as [`Config::load`], with an explicit file taking precedence over
    /// `LEDGERMIRROR_CONFIG`
    pub fn load_with(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration for commands that only read the local mirror.
    ///
    /// Ledger settings (`rpc_url`, `contract_address`, timings) are not checked,
    /// so `status` and `project` work without a node endpoint.
    pub fn load_read_only(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate_mirror(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn contract(&self) -> Result<Address, ValidationError> {
        self.ledger
            .contract_address
            .ok_or(ValidationError::MissingContractAddress)
    }

    pub fn rpc_settings(&self) -> Result<RpcSettings, ValidationError> {
        let url = self
            .ledger
            .rpc_url
            .clone()
            .ok_or(ValidationError::MissingRpcUrl)?;

        Ok(RpcSettings::builder()
            .url(url)
            .contract(self.contract()?)
            .confirmations(self.ledger.confirmations)
            .poll_interval(self.ledger.poll_interval.into())
            .request_timeout(self.ledger.request_timeout.into())
            .max_block_range(self.ledger.max_block_range)
            .build())
    }

    pub fn reconciler_settings(&self) -> Result<ReconcilerSettings, ValidationError> {
        Ok(ReconcilerSettings {
            contract: self.contract()?,
            start_block: self.ledger.start_block,
            max_block_range: self.ledger.max_block_range,
        })
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            backoff: Backoff::new(self.sync.backoff_base.into(), self.sync.backoff_cap.into()),
            heartbeat_timeout: self.sync.heartbeat_timeout.into(),
            rebuild_on_start: self.mirror.rebuild_on_start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[ledger]
rpc_url = "http://127.0.0.1:8545"
contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.ledger.start_block, 0);
        assert_eq!(config.mirror.path, PathBuf::from("data/mirror"));
    }

    #[test]
    fn test_validation_catches_missing_contract() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[ledger]
rpc_url = "http://127.0.0.1:8545"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::MissingContractAddress)
        ));
    }

    #[test]
    fn test_read_only_load_without_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[mirror]
path = "/var/lib/ledgermirror"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_read_only(Some(config_path)).unwrap();
        assert_eq!(config.mirror.path, PathBuf::from("/var/lib/ledgermirror"));
        assert!(config.ledger.contract_address.is_none());
    }

    #[test]
    fn test_component_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[ledger]
rpc_url = "https://node.example"
contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
start_block = 500
confirmations = 3
max_block_range = 100
poll_interval = "1s"

[mirror]
rebuild_on_start = true

[sync]
backoff_base = "200ms"
backoff_cap = "10s"
heartbeat_timeout = "15s"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        let rpc = config.rpc_settings().unwrap();
        assert_eq!(rpc.url, "https://node.example");
        assert_eq!(rpc.confirmations, 3);
        assert_eq!(rpc.poll_interval, Duration::from_secs(1));
        assert_eq!(rpc.max_block_range, 100);

        let reconciler = config.reconciler_settings().unwrap();
        assert_eq!(reconciler.start_block, 500);
        assert_eq!(reconciler.contract, rpc.contract);

        let supervisor = config.supervisor_settings();
        assert!(supervisor.rebuild_on_start);
        assert_eq!(supervisor.heartbeat_timeout, Duration::from_secs(15));
        assert_eq!(supervisor.backoff.base, Duration::from_millis(200));
        assert_eq!(supervisor.backoff.cap, Duration::from_secs(10));
    }
}
