use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Result;
use super::backoff::Backoff;
use super::reconciler::EventReconciler;
use crate::chain::{ChainError, LedgerClient, SubscriptionItem};
use crate::model::EventKind;
use crate::observability::{Metrics, StatusPublisher, SyncState, SyncStatus};

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub backoff: Backoff,
    /// Max silence on the live feed before it is considered dead
    pub heartbeat_timeout: Duration,
    /// Clear the mirror and resync from genesis on start
    pub rebuild_on_start: bool,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            heartbeat_timeout: Duration::from_secs(30),
            rebuild_on_start: false,
        }
    }
}

/// Keeps the mirror converging on the ledger for as long as the service runs.
///
/// Each cycle catches up from the cursor until the confirmed head stops
/// moving, then switches to the live feed. Any connectivity or store failure
/// ends the cycle; the next one starts after an exponential backoff, from the
/// cursor, so nothing between the last applied event and the reconnect is lost.
pub struct Supervisor {
    reconciler: EventReconciler,
    settings: SupervisorSettings,
    status: StatusPublisher,
    metrics: Arc<Metrics>,
}

impl Supervisor {
    pub fn new(
        reconciler: EventReconciler,
        settings: SupervisorSettings,
        status: StatusPublisher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            reconciler,
            settings,
            status,
            metrics,
        }
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Run until `cancel` fires. Only a store failure while resuming is fatal;
    /// everything after that is retried. Returns the reconciler for inspection.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<EventReconciler> {
        info!(
            heartbeat_timeout_ms = self.settings.heartbeat_timeout.as_millis() as u64,
            rebuild = self.settings.rebuild_on_start,
            "Starting ledger sync supervisor"
        );

        if let Err(e) = self.reconciler.resume(self.settings.rebuild_on_start) {
            self.status.update(|s| {
                s.state = SyncState::Stopped;
                s.last_error = Some(e.to_string());
            });
            return Err(e.into());
        }
        self.publish_cursor();

        let mut attempt = 0u32;
        while !cancel.is_cancelled() {
            let mut reached_live = false;
            let result = self.sync_cycle(&cancel, &mut reached_live).await;
            if reached_live {
                attempt = 0;
            }

            let Err(e) = result else {
                break;
            };

            self.metrics.reconnect();
            let delay = self.settings.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            warn!(
                error = %e,
                health = ?self.reconciler.client().health(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Ledger sync interrupted, reconnecting after backoff"
            );
            self.status.update(|s| {
                s.state = SyncState::Disconnected;
                s.last_error = Some(e.to_string());
            });

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.status.set_state(SyncState::Stopped);
        info!(cursor = ?self.reconciler.cursor(), "Ledger sync supervisor stopped");
        Ok(self.reconciler)
    }

    /// One CatchingUp -> Live pass. `Ok` only when cancelled.
    async fn sync_cycle(&mut self, cancel: &CancellationToken, reached_live: &mut bool) -> Result<()> {
        self.status.set_state(SyncState::CatchingUp);
        let client: Arc<dyn LedgerClient> = Arc::clone(self.reconciler.client());

        // Repeat until no new blocks arrived during the last pass
        let caught_up_to = loop {
            let head = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                head = client.current_head() => head?,
            };
            self.status.update(|s| s.chain_head = Some(head));

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                report = self.reconciler.catch_up(head) => { report?; }
            }
            self.publish_cursor();

            let latest = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                head = client.current_head() => head?,
            };
            if latest <= head {
                break head;
            }
            debug!(head, latest, "Head moved during catch-up, continuing");
        };

        let from_block = caught_up_to
            .saturating_add(1)
            .max(self.reconciler.settings().start_block);
        let mut subscription = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            sub = client.subscribe(&EventKind::ALL, from_block) => sub?,
        };

        self.status.set_state(SyncState::Live);
        *reached_live = true;
        info!(from_block, cursor = ?self.reconciler.cursor(), "Caught up, following live feed");

        let timeout = self.settings.heartbeat_timeout;
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                item = tokio::time::timeout(timeout, subscription.next()) => item,
            };

            match item {
                Err(_) => return Err(ChainError::HeartbeatTimeout(timeout).into()),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(SubscriptionItem::Log(log))) => {
                    self.reconciler.apply_log(&log)?;
                    self.publish_cursor();
                }
                Ok(Ok(SubscriptionItem::Heartbeat { head })) => {
                    self.status.update(|s| s.chain_head = Some(head));
                }
            }
        }
    }

    fn publish_cursor(&self) {
        let cursor = self.reconciler.cursor();
        self.status.update(|s| s.last_synced = cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockLedger;
    use crate::mirror::{FjallMirror, MirrorStore};
    use crate::model::{Address, LedgerEvent, Position};
    use crate::reconcile::ReconcilerSettings;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn contract() -> Address {
        Address([0xcc; 20])
    }

    fn owner(n: u8) -> Address {
        Address([n; 20])
    }

    struct Harness {
        ledger: MockLedger,
        store: Arc<FjallMirror>,
        metrics: Arc<Metrics>,
        status: watch::Receiver<SyncStatus>,
        supervisor: Supervisor,
        _temp: TempDir,
    }

    fn harness(heartbeat_timeout: Duration) -> Harness {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FjallMirror::open(temp.path().join("mirror")).unwrap());
        let ledger = MockLedger::new(contract());
        let metrics = Arc::new(Metrics::new());
        let reconciler = EventReconciler::new(
            Arc::new(ledger.clone()),
            store.clone(),
            ReconcilerSettings {
                contract: contract(),
                start_block: 0,
                max_block_range: 100,
            },
            metrics.clone(),
        );
        let (publisher, status) = StatusPublisher::channel();
        let settings = SupervisorSettings {
            backoff: Backoff::new(Duration::from_millis(10), Duration::from_millis(50)),
            heartbeat_timeout,
            rebuild_on_start: false,
        };
        let supervisor = Supervisor::new(reconciler, settings, publisher, metrics.clone());
        Harness {
            ledger,
            store,
            metrics,
            status,
            supervisor,
            _temp: temp,
        }
    }

    async fn wait_until(status: &mut watch::Receiver<SyncStatus>, f: impl FnMut(&SyncStatus) -> bool) {
        tokio::time::timeout(WAIT, status.wait_for(f))
            .await
            .expect("status condition not reached in time")
            .expect("status channel closed");
    }

    #[tokio::test]
    async fn test_catches_up_then_applies_live_events() {
        let Harness {
            ledger,
            store,
            mut status,
            supervisor,
            _temp,
            ..
        } = harness(Duration::from_secs(60));
        ledger.push(&LedgerEvent::submitted(owner(1), Position::new(1, 0), "a", "b"));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervisor.run(cancel.clone()));

        wait_until(&mut status, |s| s.state == SyncState::Live).await;
        assert!(store.get_project(&owner(1)).unwrap().is_some());

        ledger.push(&LedgerEvent::approved(owner(1), Position::new(2, 0), "H"));
        wait_until(&mut status, |s| s.last_synced == Some(Position::new(2, 0))).await;
        assert_eq!(store.list_approved().unwrap().len(), 1);

        cancel.cancel();
        let reconciler = handle.await.unwrap().unwrap();
        assert_eq!(reconciler.cursor(), Some(Position::new(2, 0)));
        assert_eq!(status.borrow().state, SyncState::Stopped);
    }

    #[tokio::test]
    async fn test_reconnects_after_disconnect_without_losing_events() {
        let Harness {
            ledger,
            store,
            metrics,
            mut status,
            supervisor,
            _temp,
        } = harness(Duration::from_secs(60));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervisor.run(cancel.clone()));
        wait_until(&mut status, |s| s.state == SyncState::Live).await;

        ledger.disconnect_subscribers();
        // Emitted while no subscriber exists; must come back through catch-up
        ledger.push(&LedgerEvent::submitted(owner(2), Position::new(3, 0), "a", "b"));
        ledger.push(&LedgerEvent::approved(owner(2), Position::new(4, 0), "H"));

        wait_until(&mut status, |s| s.last_synced == Some(Position::new(4, 0))).await;
        wait_until(&mut status, |s| s.state == SyncState::Live).await;

        let record = store.get_project(&owner(2)).unwrap().unwrap();
        assert!(record.is_approved);
        assert!(metrics.snapshot().reconnects >= 1);
        assert!(ledger.subscribe_calls() >= 2);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connectivity_failures_are_retried() {
        let Harness {
            ledger,
            store,
            metrics,
            mut status,
            supervisor,
            _temp,
        } = harness(Duration::from_secs(60));
        ledger.push(&LedgerEvent::submitted(owner(1), Position::new(1, 0), "a", "b"));
        ledger.fail_next_heads(2);
        ledger.fail_next_fetches(1);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervisor.run(cancel.clone()));

        wait_until(&mut status, |s| s.state == SyncState::Live).await;
        assert!(store.get_project(&owner(1)).unwrap().is_some());
        assert_eq!(metrics.snapshot().reconnects, 3);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_silent_feed_times_out_and_reconnects() {
        let Harness {
            ledger,
            metrics,
            mut status,
            supervisor,
            _temp,
            ..
        } = harness(Duration::from_millis(50));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervisor.run(cancel.clone()));

        wait_until(&mut status, |s| s.last_error.as_deref().is_some_and(|e| e.contains("heartbeat"))).await;
        assert!(metrics.snapshot().reconnects >= 1);
        assert!(ledger.subscribe_calls() >= 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_before_start_stops_cleanly() {
        let h = harness(Duration::from_secs(60));
        let mut status = h.status.clone();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let reconciler = h.supervisor.run(cancel).await.unwrap();
        assert_eq!(reconciler.cursor(), None);
        wait_until(&mut status, |s| s.state == SyncState::Stopped).await;
    }
}
