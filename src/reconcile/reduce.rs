//! Per-owner state machine folding ledger events into a project record
//!
//! | current            | event     | result                                   |
//! |--------------------|-----------|------------------------------------------|
//! | absent             | Submitted | new record, not approved, not revoked     |
//! | pending            | Approved  | approved, approval hash stored            |
//! | approved           | Revoked   | revoked                                   |
//!
//! Every other combination is merged without ever clearing `is_approved` or
//! `is_revoked`, and is reported as an [`Anomaly`]. A pending resubmission
//! still replaces the hashes, and a submission that follows an out-of-order
//! approval fills in the empty ones.

use std::fmt;

use crate::model::{EventPayload, LedgerEvent, ProjectRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// Approval for an owner with no submission on record
    ApprovedBeforeSubmitted,
    /// Revocation for an owner that is absent or not approved; ignored
    RevokedBeforeApproved,
    /// Second approval carrying a different hash; the first one is kept
    ConflictingApproval,
    /// Submission for a pending project; the new hashes replace the old
    ResubmittedWhilePending,
    /// Submission for an already approved project; only empty hashes are filled
    ResubmittedAfterApproval,
    /// Approval for an already approved project carrying the same hash
    RepeatedApproval,
    /// Revocation of an already revoked project
    AlreadyRevoked,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Anomaly::ApprovedBeforeSubmitted => "approved before submitted",
            Anomaly::RevokedBeforeApproved => "revoked before approved",
            Anomaly::ConflictingApproval => "conflicting approval hash",
            Anomaly::ResubmittedWhilePending => "resubmitted while pending",
            Anomaly::ResubmittedAfterApproval => "resubmitted after approval",
            Anomaly::RepeatedApproval => "repeated approval",
            Anomaly::AlreadyRevoked => "already revoked",
        };
        f.write_str(text)
    }
}

/// Outcome of folding one event into the current record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Record after the event; `None` while the owner is still absent
    pub record: Option<ProjectRecord>,
    /// Whether `record` differs from the input and needs an upsert
    pub changed: bool,
    pub anomaly: Option<Anomaly>,
}

impl Transition {
    fn changed(record: ProjectRecord) -> Self {
        Self {
            record: Some(record),
            changed: true,
            anomaly: None,
        }
    }

    fn merged(record: ProjectRecord, anomaly: Anomaly) -> Self {
        Self {
            record: Some(record),
            changed: true,
            anomaly: Some(anomaly),
        }
    }

    fn unchanged(record: Option<ProjectRecord>, anomaly: Option<Anomaly>) -> Self {
        Self {
            record,
            changed: false,
            anomaly,
        }
    }
}

pub fn reduce(current: Option<ProjectRecord>, event: &LedgerEvent) -> Transition {
    match (current, &event.payload) {
        (
            None,
            EventPayload::Submitted {
                project_details_hash,
                certificate_hash,
            },
        ) => Transition::changed(ProjectRecord::submitted(
            event.owner,
            project_details_hash.clone(),
            certificate_hash.clone(),
            event.position,
        )),

        (
            Some(mut record),
            EventPayload::Submitted {
                project_details_hash,
                certificate_hash,
            },
        ) => {
            let anomaly = if record.is_approved {
                Anomaly::ResubmittedAfterApproval
            } else {
                Anomaly::ResubmittedWhilePending
            };
            let same = record.project_details_hash == *project_details_hash
                && record.certificate_hash == *certificate_hash;
            let missing_hashes =
                record.project_details_hash.is_empty() && record.certificate_hash.is_empty();

            if !same && (!record.is_approved || missing_hashes) {
                record.project_details_hash = project_details_hash.clone();
                record.certificate_hash = certificate_hash.clone();
                record.last_position = event.position;
                Transition::merged(record, anomaly)
            } else {
                Transition::unchanged(Some(record), Some(anomaly))
            }
        }

        (None, EventPayload::Approved { approval_hash }) => {
            let mut record =
                ProjectRecord::submitted(event.owner, String::new(), String::new(), event.position);
            record.is_approved = true;
            record.approval_hash = Some(approval_hash.clone());
            Transition {
                record: Some(record),
                changed: true,
                anomaly: Some(Anomaly::ApprovedBeforeSubmitted),
            }
        }

        (Some(mut record), EventPayload::Approved { approval_hash }) => {
            if !record.is_approved {
                record.is_approved = true;
                record.approval_hash = Some(approval_hash.clone());
                record.last_position = event.position;
                Transition::changed(record)
            } else if record.approval_hash.as_deref() == Some(approval_hash.as_str()) {
                Transition::unchanged(Some(record), Some(Anomaly::RepeatedApproval))
            } else {
                Transition::unchanged(Some(record), Some(Anomaly::ConflictingApproval))
            }
        }

        (None, EventPayload::Revoked) => {
            Transition::unchanged(None, Some(Anomaly::RevokedBeforeApproved))
        }

        (Some(mut record), EventPayload::Revoked) => {
            if !record.is_approved {
                Transition::unchanged(Some(record), Some(Anomaly::RevokedBeforeApproved))
            } else if record.is_revoked {
                Transition::unchanged(Some(record), Some(Anomaly::AlreadyRevoked))
            } else {
                record.is_revoked = true;
                record.last_position = event.position;
                Transition::changed(record)
            }
        }
    }
}

/// Left fold of an ordered event history for a single owner
pub fn fold<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Option<ProjectRecord> {
    events
        .into_iter()
        .fold(None, |record, event| reduce(record, event).record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Address, Position};

    fn x() -> Address {
        Address([0x11; 20])
    }

    fn submitted(block: u64) -> LedgerEvent {
        LedgerEvent::submitted(x(), Position::new(block, 0), "hashA", "hashB")
    }

    fn approved(block: u64, hash: &str) -> LedgerEvent {
        LedgerEvent::approved(x(), Position::new(block, 0), hash)
    }

    fn revoked(block: u64) -> LedgerEvent {
        LedgerEvent::revoked(x(), Position::new(block, 0))
    }

    fn assert_invariants(record: &ProjectRecord) {
        assert!(!record.is_revoked || record.is_approved);
        assert_eq!(record.approval_hash.is_some(), record.is_approved);
    }

    #[test]
    fn test_submit_creates_pending_record() {
        let t = reduce(None, &submitted(1));
        assert!(t.changed);
        assert!(t.anomaly.is_none());

        let record = t.record.unwrap();
        assert_eq!(record.project_details_hash, "hashA");
        assert_eq!(record.certificate_hash, "hashB");
        assert!(!record.is_approved);
        assert!(!record.is_revoked);
        assert_invariants(&record);
    }

    #[test]
    fn test_full_lifecycle() {
        let record = fold(&[submitted(1), approved(2, "H"), revoked(3)]).unwrap();
        assert!(record.is_approved);
        assert!(record.is_revoked);
        assert_eq!(record.approval_hash.as_deref(), Some("H"));
        assert_eq!(record.last_position, Position::new(3, 0));
        assert_invariants(&record);
    }

    #[test]
    fn test_pending_resubmission_replaces_hashes() {
        let first = reduce(None, &submitted(1)).record;
        let resubmit = LedgerEvent::submitted(x(), Position::new(2, 0), "hashC", "hashD");
        let t = reduce(first, &resubmit);
        assert!(t.changed);
        assert_eq!(t.anomaly, Some(Anomaly::ResubmittedWhilePending));

        let record = t.record.unwrap();
        assert_eq!(record.project_details_hash, "hashC");
        assert_eq!(record.certificate_hash, "hashD");
        assert_eq!(record.last_position, Position::new(2, 0));
        assert!(!record.is_approved);

        // Same hashes again: nothing to write, still reported
        let again = LedgerEvent::submitted(x(), Position::new(3, 0), "hashC", "hashD");
        let t = reduce(Some(record.clone()), &again);
        assert!(!t.changed);
        assert_eq!(t.anomaly, Some(Anomaly::ResubmittedWhilePending));
        assert_eq!(t.record, Some(record));
    }

    #[test]
    fn test_repeated_approval_is_reported() {
        let record = fold(&[submitted(1), approved(2, "H")]);
        let t = reduce(record.clone(), &approved(5, "H"));
        assert!(!t.changed);
        assert_eq!(t.anomaly, Some(Anomaly::RepeatedApproval));
        assert_eq!(t.record, record);
        assert_eq!(t.record.unwrap().last_position, Position::new(2, 0));
    }

    #[test]
    fn test_submission_after_approval_keeps_state() {
        let record = fold(&[submitted(1), approved(2, "H")]);
        let resubmit = LedgerEvent::submitted(x(), Position::new(3, 0), "other", "other");
        let t = reduce(record.clone(), &resubmit);
        assert!(!t.changed);
        assert_eq!(t.anomaly, Some(Anomaly::ResubmittedAfterApproval));
        assert_eq!(t.record, record);
    }

    #[test]
    fn test_approval_before_submission_merges() {
        let t = reduce(None, &approved(1, "H"));
        assert_eq!(t.anomaly, Some(Anomaly::ApprovedBeforeSubmitted));
        let record = t.record.clone().unwrap();
        assert!(record.is_approved);
        assert_invariants(&record);

        let t = reduce(t.record, &submitted(2));
        assert!(t.changed);
        assert_eq!(t.anomaly, Some(Anomaly::ResubmittedAfterApproval));
        let record = t.record.unwrap();
        assert!(record.is_approved);
        assert_eq!(record.project_details_hash, "hashA");
    }

    #[test]
    fn test_revoke_without_approval_is_ignored() {
        let t = reduce(None, &revoked(1));
        assert_eq!(t.record, None);
        assert_eq!(t.anomaly, Some(Anomaly::RevokedBeforeApproved));

        let pending = reduce(None, &submitted(1)).record;
        let t = reduce(pending.clone(), &revoked(2));
        assert!(!t.changed);
        assert_eq!(t.record, pending);
    }

    #[test]
    fn test_double_revoke_and_conflicting_approval() {
        let record = fold(&[submitted(1), approved(2, "H"), revoked(3)]);

        let t = reduce(record.clone(), &revoked(4));
        assert_eq!(t.anomaly, Some(Anomaly::AlreadyRevoked));
        assert_eq!(t.record, record);

        let t = reduce(record.clone(), &approved(5, "other"));
        assert_eq!(t.anomaly, Some(Anomaly::ConflictingApproval));
        assert_eq!(t.record, record);
    }

    #[test]
    fn test_flags_never_clear_under_any_sequence() {
        let events = [
            submitted(1),
            approved(2, "H"),
            revoked(3),
            submitted(4),
            approved(5, "H2"),
            revoked(6),
            submitted(7),
        ];

        // Every ordering prefix of every rotation keeps flags monotone
        for start in 0..events.len() {
            let mut record: Option<ProjectRecord> = None;
            let (mut approved_seen, mut revoked_seen) = (false, false);
            for event in events.iter().cycle().skip(start).take(events.len()) {
                record = reduce(record, event).record;
                if let Some(r) = &record {
                    assert!(r.is_approved || !approved_seen);
                    assert!(r.is_revoked || !revoked_seen);
                    approved_seen |= r.is_approved;
                    revoked_seen |= r.is_revoked;
                    assert_invariants(r);
                }
            }
        }
    }
}
