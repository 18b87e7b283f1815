use crate::humanize::HumanDuration;
use crate::model::Address;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Ledger node and contract configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint; falls back to `WEB3_PROVIDER` when unset
    pub rpc_url: Option<String>,
    pub contract_address: Option<Address>,
    /// First block scanned on a full sync
    #[serde(default)]
    pub start_block: u64,
    /// Blocks behind the node head still treated as unconfirmed
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: None,
            start_block: 0,
            confirmations: 0,
            max_block_range: default_max_block_range(),
            poll_interval: default_poll_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_max_block_range() -> u64 {
    2000
}

fn default_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(2)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

/// Mirror store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorConfig {
    #[serde(default = "default_mirror_path")]
    pub path: PathBuf,
    /// Clear the mirror and resync from `start_block` instead of resuming
    #[serde(default)]
    pub rebuild_on_start: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            path: default_mirror_path(),
            rebuild_on_start: false,
        }
    }
}

fn default_mirror_path() -> PathBuf {
    PathBuf::from("data/mirror")
}

/// Reconnection and liveness settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_backoff_base")]
    pub backoff_base: HumanDuration,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap: HumanDuration,
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout: HumanDuration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff_base: default_backoff_base(),
            backoff_cap: default_backoff_cap(),
            heartbeat_timeout: default_heartbeat_timeout(),
        }
    }
}

fn default_backoff_base() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_backoff_cap() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_heartbeat_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

/// Read API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enabled: default_enabled(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5000))
}

fn default_enabled() -> bool {
    true
}
