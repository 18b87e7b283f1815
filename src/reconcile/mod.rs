//! Event reconciliation: ledger events in, mirror upserts out
//!
//! - [`reduce`]: pure per-owner state machine
//! - [`EventReconciler`]: cursor-guarded, idempotent application of events and
//!   bounded historical catch-up
//! - [`Supervisor`]: keeps the live feed running across disconnects,
//!   `Disconnected -> CatchingUp -> Live -> Disconnected`, `Stopped` on cancel
//!
//! All applications go through one `EventReconciler` owned by one task, so
//! events for the same owner are never applied concurrently.

pub mod backoff;
pub mod reconciler;
pub mod reduce;
pub mod supervisor;

use thiserror::Error;

use crate::chain::ChainError;
use crate::mirror::MirrorError;

pub use backoff::Backoff;
pub use reconciler::{ApplyOutcome, CatchUpReport, EventReconciler, ReconcilerSettings};
pub use reduce::{Anomaly, Transition, fold, reduce};
pub use supervisor::{Supervisor, SupervisorSettings};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Ledger error: {0}")]
    Chain(#[from] ChainError),

    #[error("Mirror store error: {0}")]
    Mirror(#[from] MirrorError),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
