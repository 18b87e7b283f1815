//! Sync metrics and the published health status

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::model::Position;

/// Metrics handle for recording reconciliation counters
#[derive(Debug, Default)]
pub struct Metrics {
    events_applied: AtomicU64,
    events_unchanged: AtomicU64,
    duplicates_skipped: AtomicU64,
    decode_failures: AtomicU64,
    anomalies: AtomicU64,
    store_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "events_applied", "Metric incremented");
    }

    pub fn event_unchanged(&self) {
        self.events_unchanged.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "events_unchanged", "Metric incremented");
    }

    pub fn duplicate_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "duplicates_skipped", "Metric incremented");
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "decode_failures", "Metric incremented");
    }

    pub fn anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "anomalies", "Metric incremented");
    }

    pub fn store_failed(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "store_failures", "Metric incremented");
    }

    pub fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "reconnects", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_unchanged: self.events_unchanged.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub events_applied: u64,
    pub events_unchanged: u64,
    pub duplicates_skipped: u64,
    pub decode_failures: u64,
    pub anomalies: u64,
    pub store_failures: u64,
    pub reconnects: u64,
}

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Disconnected,
    CatchingUp,
    Live,
    Stopped,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Disconnected => "disconnected",
            SyncState::CatchingUp => "catching_up",
            SyncState::Live => "live",
            SyncState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Health indicator exposed to mirror readers. Staleness shows here, never as a read error.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub last_synced: Option<Position>,
    pub chain_head: Option<u64>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Disconnected,
            last_synced: None,
            chain_head: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Writer side of the status channel, owned by the supervisor
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<SyncStatus>,
}

impl StatusPublisher {
    pub fn channel() -> (Self, watch::Receiver<SyncStatus>) {
        let (tx, rx) = watch::channel(SyncStatus::default());
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    pub fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        self.tx.send_modify(|status| {
            f(status);
            status.updated_at = Utc::now();
        });
    }

    pub fn set_state(&self, state: SyncState) {
        self.update(|status| status.state = state);
    }
}
