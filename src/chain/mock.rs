//! In-memory ledger for tests and local development.
//!
//! Events are encoded through the real ABI so the reconciler exercises the
//! same decode path as against a node. Failures can be injected into
//! historical fetches, head queries, and live subscriptions.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::abi;
use super::error::{ChainError, Result};
use super::{ClientHealth, FeedSender, LedgerClient, Subscription, SubscriptionItem};
use crate::model::{Address, EventKind, LedgerEvent, RawLog};

const FEED_CAPACITY: usize = 1024;

#[derive(Default)]
struct MockState {
    logs: Vec<RawLog>,
    head: u64,
    subscribers: Vec<(Vec<EventKind>, FeedSender)>,
    failing_fetches: usize,
    failing_heads: usize,
    fetch_calls: usize,
    subscribe_calls: usize,
}

/// Cloneable handle to a shared in-memory ledger
#[derive(Clone)]
pub struct MockLedger {
    contract: Address,
    state: Arc<Mutex<MockState>>,
}

impl MockLedger {
    pub fn new(contract: Address) -> Self {
        Self {
            contract,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Append an event to the ledger and deliver it to live subscribers
    pub fn push(&self, event: &LedgerEvent) {
        self.push_raw(abi::encode(event, self.contract));
    }

    /// Append a raw log as-is, e.g. a malformed one
    pub fn push_raw(&self, log: RawLog) {
        let mut state = self.state.lock();
        state.head = state.head.max(log.position.block);
        let kind = log.topics.first().and_then(abi::kind_for_topic);

        state.subscribers.retain(|(kinds, tx)| {
            if kind.is_some_and(|k| !kinds.contains(&k)) {
                return !tx.is_closed();
            }
            tx.try_send(Ok(SubscriptionItem::Log(log.clone()))).is_ok()
        });
        state.logs.push(log);
    }

    /// Advance the head without emitting events and heartbeat subscribers
    pub fn set_head(&self, head: u64) {
        let mut state = self.state.lock();
        state.head = state.head.max(head);
        let head = state.head;
        state
            .subscribers
            .retain(|(_, tx)| tx.try_send(Ok(SubscriptionItem::Heartbeat { head })).is_ok());
    }

    /// Fail the next `n` historical fetches with a connectivity error
    pub fn fail_next_fetches(&self, n: usize) {
        self.state.lock().failing_fetches = n;
    }

    /// Fail the next `n` head queries with a connectivity error
    pub fn fail_next_heads(&self, n: usize) {
        self.state.lock().failing_heads = n;
    }

    /// Drop every live subscription with an explicit disconnect
    pub fn disconnect_subscribers(&self) {
        let subscribers = std::mem::take(&mut self.state.lock().subscribers);
        for (_, tx) in subscribers {
            let _ = tx.try_send(Err(ChainError::Disconnected("mock disconnect".to_string())));
        }
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().fetch_calls
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state.subscribers.len()
    }
}

fn wanted(log: &RawLog, kinds: &[EventKind]) -> bool {
    // Unknown topics are still delivered so decode failures surface in the consumer
    match log.topics.first().and_then(abi::kind_for_topic) {
        Some(kind) => kinds.contains(&kind),
        None => true,
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn fetch_historical(
        &self,
        kinds: &[EventKind],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>> {
        let mut state = self.state.lock();
        state.fetch_calls += 1;
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(ChainError::Disconnected("mock fetch failure".to_string()));
        }

        let mut logs: Vec<RawLog> = state
            .logs
            .iter()
            .filter(|log| (from_block..=to_block).contains(&log.position.block))
            .filter(|log| wanted(log, kinds))
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.position);
        Ok(logs)
    }

    async fn subscribe(&self, kinds: &[EventKind], from_block: u64) -> Result<Subscription> {
        let (tx, subscription) = Subscription::channel(FEED_CAPACITY);
        let mut state = self.state.lock();
        state.subscribe_calls += 1;

        let mut backlog: Vec<&RawLog> = state
            .logs
            .iter()
            .filter(|log| log.position.block >= from_block && wanted(log, kinds))
            .collect();
        backlog.sort_by_key(|log| log.position);
        for log in backlog {
            let _ = tx.try_send(Ok(SubscriptionItem::Log(log.clone())));
        }

        state.subscribers.push((kinds.to_vec(), tx));
        Ok(subscription)
    }

    async fn current_head(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if state.failing_heads > 0 {
            state.failing_heads -= 1;
            return Err(ChainError::Disconnected("mock head failure".to_string()));
        }
        Ok(state.head)
    }

    fn health(&self) -> ClientHealth {
        let state = self.state.lock();
        if state.failing_fetches > 0 || state.failing_heads > 0 {
            ClientHealth::Degraded
        } else {
            ClientHealth::Connected
        }
    }
}
