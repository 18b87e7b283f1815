//! Ledger client: the reconciler's only view of the chain
//!
//! The client exposes three capabilities:
//!
//! - bounded historical fetch of contract logs in a block range
//! - a live [`Subscription`] fed by a single producer task through a bounded channel
//! - the current confirmed head block, used to decide when catch-up is done
//!
//! Logs are returned undecoded; decoding happens in the reconciler so a
//! malformed log can be skipped without failing the whole fetch.
//!
//! ## Implementations
//!
//! - [`RpcLedgerClient`]: JSON-RPC over HTTP (`eth_blockNumber`, `eth_getLogs`)
//! - [`MockLedger`]: in-memory ledger for tests and local runs

pub mod abi;
pub mod error;
pub mod mock;
pub mod rpc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::{EventKind, RawLog};

pub use error::{ChainError, DecodeError, Result};
pub use mock::MockLedger;
pub use rpc::{RpcLedgerClient, RpcSettings};

/// Connection health as last observed by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientHealth {
    Connected,
    Degraded,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch logs of the given kinds in the inclusive block range `[from_block, to_block]`
    async fn fetch_historical(
        &self,
        kinds: &[EventKind],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>>;

    /// Open a live feed starting at `from_block`. Logs may overlap with a previous
    /// fetch; delivery is at-least-once in emission order.
    async fn subscribe(&self, kinds: &[EventKind], from_block: u64) -> Result<Subscription>;

    /// Latest confirmed block number
    async fn current_head(&self) -> Result<u64>;

    fn health(&self) -> ClientHealth;
}

/// One message from a live feed
#[derive(Debug, Clone)]
pub enum SubscriptionItem {
    Log(RawLog),
    /// Periodic liveness signal carrying the confirmed head the producer has scanned to
    Heartbeat { head: u64 },
}

pub type FeedSender = mpsc::Sender<Result<SubscriptionItem>>;

/// Live event feed. There is no end of stream: a closed channel means the
/// producer is gone and is reported as [`ChainError::Disconnected`].
pub struct Subscription {
    rx: mpsc::Receiver<Result<SubscriptionItem>>,
    producer: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<Result<SubscriptionItem>>, producer: Option<JoinHandle<()>>) -> Self {
        Self { rx, producer }
    }

    pub fn channel(capacity: usize) -> (FeedSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx, None))
    }

    pub async fn next(&mut self) -> Result<SubscriptionItem> {
        match self.rx.recv().await {
            Some(item) => item,
            None => Err(ChainError::Disconnected("feed closed".to_string())),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}
