//! JSON-RPC ledger client
//!
//! Historical fetch maps to `eth_getLogs`, the head to `eth_blockNumber`.
//! The live feed is a polling producer task: each tick it scans newly confirmed
//! blocks, pushes their logs in order, then a heartbeat. Any RPC failure ends
//! the feed with an explicit disconnect so the supervisor can resync.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::abi;
use super::error::{ChainError, Result};
use super::{ClientHealth, FeedSender, LedgerClient, Subscription, SubscriptionItem};
use crate::model::{Address, EventKind, Position, RawLog};

/// Connection settings for [`RpcLedgerClient`]
#[derive(Debug, Clone, Builder)]
pub struct RpcSettings {
    #[builder(into)]
    pub url: String,
    pub contract: Address,
    /// Blocks behind the node head that count as confirmed
    #[builder(default = 0)]
    pub confirmations: u64,
    #[builder(default = Duration::from_secs(2))]
    pub poll_interval: Duration,
    #[builder(default = Duration::from_secs(10))]
    pub request_timeout: Duration,
    /// Largest block span requested by one `eth_getLogs` call in the live feed
    #[builder(default = 2000)]
    pub max_block_range: u64,
    #[builder(default = 256)]
    pub feed_capacity: usize,
}

#[derive(Clone)]
pub struct RpcLedgerClient {
    http: Client,
    settings: Arc<RpcSettings>,
    connected: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

impl RpcLedgerClient {
    pub fn new(settings: RpcSettings) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(settings.request_timeout)
            .timeout(settings.request_timeout)
            .user_agent(concat!("ledgermirror/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            settings: Arc::new(settings),
            connected: Arc::new(AtomicBool::new(true)),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn settings(&self) -> &RpcSettings {
        &self.settings
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let result = self.call_once(method, params).await;
        self.connected.store(result.is_ok(), Ordering::Relaxed);
        result
    }

    async fn call_once<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "RPC request");

        let response: RpcResponse<T> = self
            .http
            .post(&self.settings.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| ChainError::InvalidResponse(format!("{} returned no result", method)))
    }

    async fn block_number(&self) -> Result<u64> {
        let quantity: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&quantity)
    }

    async fn get_logs(&self, kinds: &[EventKind], from_block: u64, to_block: u64) -> Result<Vec<RawLog>> {
        let topics: Vec<String> = kinds
            .iter()
            .map(|kind| format!("0x{}", hex::encode(abi::topic(*kind))))
            .collect();

        let filter = json!([{
            "address": self.settings.contract.to_string(),
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "topics": [topics],
        }]);

        let logs: Vec<RpcLog> = self.call("eth_getLogs", filter).await?;

        let mut raw = Vec::with_capacity(logs.len());
        for log in logs {
            // Pending logs have no position yet
            if let Some(log) = convert_log(log)? {
                raw.push(log);
            }
        }
        raw.sort_by_key(|log| log.position);
        Ok(raw)
    }

    async fn poll_feed(self, kinds: Vec<EventKind>, from_block: u64, tx: FeedSender) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_block = from_block;

        loop {
            ticker.tick().await;
            match self.scan(&kinds, next_block, &tx).await {
                Ok(Some(next)) => next_block = next,
                Ok(None) => {
                    debug!("Feed consumer gone, stopping producer");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, next_block, "Live feed failed");
                    let _ = tx.send(Err(ChainError::Disconnected(e.to_string()))).await;
                    return;
                }
            }
        }
    }

    /// Push every log in newly confirmed blocks, then a heartbeat.
    /// Returns the next block to scan, or `None` when the consumer hung up.
    async fn scan(&self, kinds: &[EventKind], next_block: u64, tx: &FeedSender) -> Result<Option<u64>> {
        let head = self.current_head().await?;
        let mut from = next_block;
        let span = self.settings.max_block_range.max(1);

        while from <= head {
            let to = head.min(from.saturating_add(span - 1));
            for log in self.get_logs(kinds, from, to).await? {
                if tx.send(Ok(SubscriptionItem::Log(log))).await.is_err() {
                    return Ok(None);
                }
            }
            from = to + 1;
        }

        if tx.send(Ok(SubscriptionItem::Heartbeat { head })).await.is_err() {
            return Ok(None);
        }
        Ok(Some(from))
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn fetch_historical(
        &self,
        kinds: &[EventKind],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>> {
        if from_block > to_block {
            return Ok(Vec::new());
        }
        self.get_logs(kinds, from_block, to_block).await
    }

    async fn subscribe(&self, kinds: &[EventKind], from_block: u64) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(self.settings.feed_capacity);
        let producer = tokio::spawn(self.clone().poll_feed(kinds.to_vec(), from_block, tx));
        Ok(Subscription::new(rx, Some(producer)))
    }

    async fn current_head(&self) -> Result<u64> {
        let head = self.block_number().await?;
        Ok(head.saturating_sub(self.settings.confirmations))
    }

    fn health(&self) -> ClientHealth {
        if self.connected.load(Ordering::Relaxed) {
            ClientHealth::Connected
        } else {
            ClientHealth::Degraded
        }
    }
}

fn parse_quantity(value: &str) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::InvalidResponse(format!("quantity without 0x: {}", value)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad quantity {}: {}", value, e)))
}

fn parse_data(value: &str) -> Result<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| ChainError::InvalidResponse(format!("bad hex data: {}", e)))
}

fn parse_topic(value: &str) -> Result<[u8; 32]> {
    let bytes = parse_data(value)?;
    bytes
        .try_into()
        .map_err(|_| ChainError::InvalidResponse(format!("topic is not 32 bytes: {}", value)))
}

fn convert_log(log: RpcLog) -> Result<Option<RawLog>> {
    let (Some(block), Some(index)) = (log.block_number, log.log_index) else {
        return Ok(None);
    };

    let address = log
        .address
        .parse::<Address>()
        .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

    let topics = log
        .topics
        .iter()
        .map(String::as_str)
        .map(parse_topic)
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(RawLog {
        address,
        topics,
        data: parse_data(&log.data)?,
        position: Position::new(parse_quantity(&block)?, parse_quantity(&index)?),
        removed: log.removed,
    }))
}
