use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::Result;
use super::reduce::reduce;
use crate::chain::{LedgerClient, abi};
use crate::mirror::{Checkpoint, MirrorError, MirrorStore};
use crate::model::{Address, EventKind, LedgerEvent, Position, ProjectRecord, RawLog};
use crate::observability::Metrics;

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Contract whose events are mirrored
    pub contract: Address,
    /// First block of the scan ("genesis" for this contract)
    pub start_block: u64,
    /// Largest block span requested per historical fetch
    pub max_block_range: u64,
}

/// What `apply` did with one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Record upserted and cursor advanced
    Applied,
    /// Nothing to upsert (idempotent merge or ignored anomaly); cursor advanced
    Unchanged,
    /// At or behind the cursor: redelivery, no mutation
    Duplicate,
    /// Undecodable, removed by reorg, or from another contract
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    pub from_block: u64,
    pub to_block: u64,
    pub fetched: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

impl CatchUpReport {
    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Unchanged => self.unchanged += 1,
            ApplyOutcome::Duplicate => self.duplicates += 1,
            ApplyOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Applies ledger events to the mirror store behind a monotonic sync cursor.
///
/// The cursor is the position of the last event whose effects (possibly none)
/// are durably stored. It only moves forward, and only after the store write
/// succeeded, so a failed write is redelivered and a replayed event is a no-op.
pub struct EventReconciler {
    client: Arc<dyn LedgerClient>,
    store: Arc<dyn MirrorStore>,
    settings: ReconcilerSettings,
    metrics: Arc<Metrics>,
    cursor: Option<Position>,
}

impl EventReconciler {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        store: Arc<dyn MirrorStore>,
        settings: ReconcilerSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            metrics,
            cursor: None,
        }
    }

    pub fn cursor(&self) -> Option<Position> {
        self.cursor
    }

    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn MirrorStore> {
        &self.store
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// First block the next catch-up has to fetch. The cursor's own block is
    /// fetched again since later logs in it may not have been applied yet.
    pub fn next_block(&self) -> u64 {
        self.cursor
            .map(|position| position.block)
            .unwrap_or(self.settings.start_block)
            .max(self.settings.start_block)
    }

    /// Restore the cursor from the persisted checkpoint.
    ///
    /// Falls back to a full rebuild when asked to, when there is no
    /// checkpoint, or when the checkpoint belongs to another contract.
    pub fn resume(&mut self, rebuild: bool) -> std::result::Result<(), MirrorError> {
        if rebuild {
            info!("Full rebuild requested");
            return self.rebuild();
        }

        match self.store.load_checkpoint()? {
            Some(checkpoint) if checkpoint.contract == self.settings.contract => {
                info!(
                    position = %checkpoint.position,
                    saved_at = %checkpoint.updated_at,
                    "Resuming from checkpoint"
                );
                self.cursor = Some(checkpoint.position);
                Ok(())
            }
            Some(checkpoint) => {
                warn!(
                    checkpoint_contract = %checkpoint.contract,
                    contract = %self.settings.contract,
                    "Checkpoint belongs to another contract, rebuilding mirror"
                );
                self.rebuild()
            }
            None => {
                info!("No checkpoint found, syncing from genesis");
                self.rebuild()
            }
        }
    }

    /// Wipe the mirror and reset the cursor to genesis
    pub fn rebuild(&mut self) -> std::result::Result<(), MirrorError> {
        self.store.clear()?;
        self.cursor = None;
        info!(start_block = self.settings.start_block, "Mirror cleared, cursor reset to genesis");
        Ok(())
    }

    /// Restore the cursor, then replay history up to the current confirmed head.
    ///
    /// Afterwards the mirror reflects every event up to the head observed at call time.
    pub async fn bootstrap(&mut self, rebuild: bool) -> Result<CatchUpReport> {
        self.resume(rebuild)?;
        let head = self.client.current_head().await?;
        self.catch_up(head).await
    }

    /// Fetch and apply historical events from the cursor up to `head`, in
    /// block chunks of at most `max_block_range`.
    pub async fn catch_up(&mut self, head: u64) -> Result<CatchUpReport> {
        let mut report = CatchUpReport {
            from_block: self.next_block(),
            to_block: head,
            ..Default::default()
        };
        let span = self.settings.max_block_range.max(1);
        let mut from = report.from_block;

        while from <= head {
            let to = head.min(from.saturating_add(span - 1));
            let mut logs = self
                .client
                .fetch_historical(&EventKind::ALL, from, to)
                .await?;
            logs.sort_by_key(|log| log.position);

            for log in &logs {
                let outcome = self.apply_log(log)?;
                report.record(outcome);
            }
            report.fetched += logs.len();
            debug!(from, to, fetched = logs.len(), "Applied historical chunk");

            match to.checked_add(1) {
                Some(next) => from = next,
                None => break,
            }
        }

        if report.fetched > 0 {
            info!(
                from_block = report.from_block,
                to_block = report.to_block,
                fetched = report.fetched,
                applied = report.applied,
                duplicates = report.duplicates,
                skipped = report.skipped,
                "Catch-up complete"
            );
        }
        Ok(report)
    }

    /// Decode and apply a raw log. Decode failures are logged and stepped over.
    pub fn apply_log(&mut self, log: &RawLog) -> std::result::Result<ApplyOutcome, MirrorError> {
        if log.removed {
            debug!(position = %log.position, "Ignoring log removed by reorg");
            return Ok(ApplyOutcome::Skipped);
        }
        if log.address != self.settings.contract {
            warn!(position = %log.position, address = %log.address, "Ignoring log from foreign contract");
            return Ok(ApplyOutcome::Skipped);
        }
        if self.is_duplicate(log.position) {
            self.metrics.duplicate_skipped();
            return Ok(ApplyOutcome::Duplicate);
        }

        match abi::decode(log) {
            Ok(event) => self.apply(&event),
            Err(e) => {
                warn!(position = %log.position, error = %e, "Skipping undecodable event");
                self.metrics.decode_failed();
                self.commit(None, log.position)?;
                Ok(ApplyOutcome::Skipped)
            }
        }
    }

    /// Apply one decoded event: guard, reduce, upsert, then advance the cursor
    pub fn apply(&mut self, event: &LedgerEvent) -> std::result::Result<ApplyOutcome, MirrorError> {
        if self.is_duplicate(event.position) {
            self.metrics.duplicate_skipped();
            debug!(owner = %event.owner, position = %event.position, "Skipping redelivered event");
            return Ok(ApplyOutcome::Duplicate);
        }

        let current = self.store.get_project(&event.owner).inspect_err(|e| {
            self.metrics.store_failed();
            error!(owner = %event.owner, error = %e, "Mirror read failed");
        })?;

        let transition = reduce(current, event);
        if let Some(anomaly) = transition.anomaly {
            self.metrics.anomaly();
            warn!(
                owner = %event.owner,
                position = %event.position,
                event = %event.kind(),
                %anomaly,
                "Inconsistent event sequence, merged without regressing state"
            );
        }

        let record = transition.record.as_ref().filter(|_| transition.changed);
        self.commit(record, event.position)?;

        if transition.changed {
            self.metrics.event_applied();
            debug!(owner = %event.owner, position = %event.position, event = %event.kind(), "Applied event");
            Ok(ApplyOutcome::Applied)
        } else {
            self.metrics.event_unchanged();
            Ok(ApplyOutcome::Unchanged)
        }
    }

    fn is_duplicate(&self, position: Position) -> bool {
        self.cursor.is_some_and(|cursor| position <= cursor)
    }

    fn commit(
        &mut self,
        record: Option<&ProjectRecord>,
        position: Position,
    ) -> std::result::Result<(), MirrorError> {
        let checkpoint = Checkpoint::new(position, self.settings.contract);
        if let Err(e) = self.store.apply(record, &checkpoint) {
            self.metrics.store_failed();
            error!(position = %position, error = %e, "Mirror write failed, cursor not advanced");
            return Err(e);
        }
        self.cursor = Some(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockLedger;
    use crate::mirror::FjallMirror;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Mirror that fails a configurable number of writes
    struct FlakyMirror {
        inner: FjallMirror,
        failing_writes: AtomicUsize,
    }

    impl MirrorStore for FlakyMirror {
        fn get_project(&self, owner: &Address) -> crate::mirror::Result<Option<ProjectRecord>> {
            self.inner.get_project(owner)
        }

        fn list_approved(&self) -> crate::mirror::Result<Vec<ProjectRecord>> {
            self.inner.list_approved()
        }

        fn apply(&self, record: Option<&ProjectRecord>, checkpoint: &Checkpoint) -> crate::mirror::Result<()> {
            if self
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(MirrorError::Io(std::io::Error::other("injected write failure")));
            }
            self.inner.apply(record, checkpoint)
        }

        fn load_checkpoint(&self) -> crate::mirror::Result<Option<Checkpoint>> {
            self.inner.load_checkpoint()
        }

        fn clear(&self) -> crate::mirror::Result<()> {
            self.inner.clear()
        }
    }

    fn contract() -> Address {
        "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap()
    }

    fn x() -> Address {
        Address([0x11; 20])
    }

    fn settings() -> ReconcilerSettings {
        ReconcilerSettings {
            contract: contract(),
            start_block: 0,
            max_block_range: 1000,
        }
    }

    struct Harness {
        ledger: MockLedger,
        store: Arc<FlakyMirror>,
        reconciler: EventReconciler,
        _temp: TempDir,
    }

    fn harness() -> Harness {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FlakyMirror {
            inner: FjallMirror::open(temp.path().join("mirror")).unwrap(),
            failing_writes: AtomicUsize::new(0),
        });
        let ledger = MockLedger::new(contract());
        let reconciler = EventReconciler::new(
            Arc::new(ledger.clone()),
            store.clone(),
            settings(),
            Arc::new(Metrics::new()),
        );
        Harness {
            ledger,
            store,
            reconciler,
            _temp: temp,
        }
    }

    #[test]
    fn test_scenario_a_submission_creates_pending_record() {
        let mut h = harness();
        let event = LedgerEvent::submitted(x(), Position::new(1, 0), "hashA", "hashB");

        assert_eq!(h.reconciler.apply(&event).unwrap(), ApplyOutcome::Applied);

        let record = h.store.get_project(&x()).unwrap().unwrap();
        assert!(!record.is_approved);
        assert!(!record.is_revoked);
        assert_eq!(record.project_details_hash, "hashA");
        assert_eq!(record.certificate_hash, "hashB");
    }

    #[test]
    fn test_scenario_b_redelivered_submission_is_noop() {
        let mut h = harness();
        let submitted = LedgerEvent::submitted(x(), Position::new(1, 0), "hashA", "hashB");
        h.reconciler.apply(&submitted).unwrap();
        h.reconciler
            .apply(&LedgerEvent::approved(x(), Position::new(2, 0), "H"))
            .unwrap();
        let before = h.store.get_project(&x()).unwrap();

        assert_eq!(h.reconciler.apply(&submitted).unwrap(), ApplyOutcome::Duplicate);

        let after = h.store.get_project(&x()).unwrap();
        assert_eq!(before, after);
        let record = after.unwrap();
        assert!(record.is_approved);
        assert_eq!(record.approval_hash.as_deref(), Some("H"));
    }

    #[test]
    fn test_scenario_c_revoked_not_listed() {
        let mut h = harness();
        for event in [
            LedgerEvent::submitted(x(), Position::new(1, 0), "a", "b"),
            LedgerEvent::approved(x(), Position::new(2, 0), "H"),
            LedgerEvent::revoked(x(), Position::new(3, 0)),
        ] {
            h.reconciler.apply(&event).unwrap();
        }
        assert!(h.store.list_approved().unwrap().is_empty());
        assert!(h.store.get_project(&x()).unwrap().unwrap().is_revoked);
    }

    #[test]
    fn test_apply_twice_is_idempotent_for_every_kind() {
        let events = [
            LedgerEvent::submitted(x(), Position::new(1, 0), "a", "b"),
            LedgerEvent::approved(x(), Position::new(1, 1), "H"),
            LedgerEvent::revoked(x(), Position::new(2, 0)),
        ];
        let mut h = harness();
        for event in &events {
            h.reconciler.apply(event).unwrap();
            let once = h.store.get_project(&x()).unwrap();
            let checkpoint = h.store.load_checkpoint().unwrap().map(|c| c.position);

            assert_eq!(h.reconciler.apply(event).unwrap(), ApplyOutcome::Duplicate);
            assert_eq!(h.store.get_project(&x()).unwrap(), once);
            assert_eq!(h.store.load_checkpoint().unwrap().map(|c| c.position), checkpoint);
        }
    }

    #[test]
    fn test_cursor_never_decreases() {
        let mut h = harness();
        let positions = [(3, 0), (1, 0), (3, 1), (2, 5), (3, 1), (7, 0)];
        let mut last = None;
        for (block, index) in positions {
            let event = LedgerEvent::submitted(x(), Position::new(block, index), "a", "b");
            let _ = h.reconciler.apply(&event).unwrap();
            assert!(h.reconciler.cursor() >= last);
            last = h.reconciler.cursor();
        }
        assert_eq!(last, Some(Position::new(7, 0)));
    }

    #[test]
    fn test_store_failure_keeps_cursor_and_retry_succeeds() {
        let mut h = harness();
        let event = LedgerEvent::submitted(x(), Position::new(4, 0), "a", "b");
        h.store.failing_writes.store(1, Ordering::SeqCst);

        assert!(h.reconciler.apply(&event).is_err());
        assert_eq!(h.reconciler.cursor(), None);
        assert!(h.store.get_project(&x()).unwrap().is_none());

        assert_eq!(h.reconciler.apply(&event).unwrap(), ApplyOutcome::Applied);
        assert_eq!(h.reconciler.cursor(), Some(Position::new(4, 0)));
    }

    #[test]
    fn test_undecodable_log_is_skipped_and_stepped_over() {
        let mut h = harness();
        let garbage = RawLog {
            address: contract(),
            topics: vec![[0xee; 32]],
            data: vec![1, 2, 3],
            position: Position::new(2, 0),
            removed: false,
        };
        assert_eq!(h.reconciler.apply_log(&garbage).unwrap(), ApplyOutcome::Skipped);
        assert_eq!(h.reconciler.cursor(), Some(Position::new(2, 0)));

        let valid = abi::encode(&LedgerEvent::submitted(x(), Position::new(2, 1), "a", "b"), contract());
        assert_eq!(h.reconciler.apply_log(&valid).unwrap(), ApplyOutcome::Applied);
    }

    #[test]
    fn test_removed_and_foreign_logs_are_ignored() {
        let mut h = harness();
        let event = LedgerEvent::submitted(x(), Position::new(2, 0), "a", "b");

        let mut removed = abi::encode(&event, contract());
        removed.removed = true;
        assert_eq!(h.reconciler.apply_log(&removed).unwrap(), ApplyOutcome::Skipped);

        let foreign = abi::encode(&event, Address([0x99; 20]));
        assert_eq!(h.reconciler.apply_log(&foreign).unwrap(), ApplyOutcome::Skipped);

        assert_eq!(h.reconciler.cursor(), None);
        assert!(h.store.get_project(&x()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_applies_history_in_position_order() {
        let mut h = harness();
        // Pushed out of order; catch-up must sort by position
        h.ledger.push(&LedgerEvent::approved(x(), Position::new(5, 0), "H"));
        h.ledger.push(&LedgerEvent::submitted(x(), Position::new(2, 0), "a", "b"));

        let report = h.reconciler.bootstrap(false).await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.applied, 2);

        let record = h.store.get_project(&x()).unwrap().unwrap();
        assert!(record.is_approved);
        assert_eq!(record.project_details_hash, "a");
    }

    #[tokio::test]
    async fn test_catch_up_fetches_in_chunks() {
        let mut h = harness();
        h.reconciler.settings.max_block_range = 10;
        for block in [1, 15, 29] {
            let owner = Address([block as u8; 20]);
            h.ledger.push(&LedgerEvent::submitted(owner, Position::new(block, 0), "a", "b"));
        }

        let report = h.reconciler.catch_up(29).await.unwrap();
        assert_eq!(report.applied, 3);
        assert_eq!(h.ledger.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn test_resume_uses_checkpoint() {
        let mut h = harness();
        h.ledger.push(&LedgerEvent::submitted(x(), Position::new(3, 0), "a", "b"));
        h.reconciler.bootstrap(false).await.unwrap();

        let mut restarted = EventReconciler::new(
            Arc::new(h.ledger.clone()),
            h.store.clone(),
            settings(),
            Arc::new(Metrics::new()),
        );
        restarted.resume(false).unwrap();
        assert_eq!(restarted.cursor(), Some(Position::new(3, 0)));
        assert_eq!(restarted.next_block(), 3);
        assert!(h.store.get_project(&x()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_checkpoint_from_other_contract_triggers_rebuild() {
        let mut h = harness();
        h.store
            .apply(
                Some(&ProjectRecord::submitted(x(), "a".into(), "b".into(), Position::new(1, 0))),
                &Checkpoint::new(Position::new(1, 0), Address([0x99; 20])),
            )
            .unwrap();

        h.reconciler.resume(false).unwrap();
        assert_eq!(h.reconciler.cursor(), None);
        assert!(h.store.get_project(&x()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connectivity_error_aborts_bootstrap() {
        let mut h = harness();
        h.ledger.push(&LedgerEvent::submitted(x(), Position::new(1, 0), "a", "b"));
        h.ledger.fail_next_fetches(1);

        assert!(h.reconciler.bootstrap(false).await.is_err());
        assert_eq!(h.reconciler.cursor(), None);

        let report = h.reconciler.bootstrap(false).await.unwrap();
        assert_eq!(report.applied, 1);
    }
}
