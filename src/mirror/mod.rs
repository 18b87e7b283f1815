/// Fjall-based mirror store for project records and the sync checkpoint
///
/// The mirror is the mutable, queryable projection of the ledger. The
/// reconciler is its only writer; the read API and CLI read it concurrently.
/// It persists:
///
/// - Project records (one per owner, JSON)
/// - The sync checkpoint (last applied position, bound to a contract address)
///
/// ## Atomicity
///
/// [`MirrorStore::apply`] writes the record and the checkpoint in one batch, so
/// a crash can never leave a record written past the persisted cursor without
/// the cursor, and replaying the event after restart is harmless.
///
/// ## Usage
///
/// ```rust,ignore
/// use ledgermirror::mirror::{FjallMirror, MirrorStore};
///
/// let store = FjallMirror::open("data/mirror")?;
/// let record = store.get_project(&owner)?;
/// let approved = store.list_approved()?;
/// ```

pub mod error;
pub mod partitions;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Address, Position, ProjectRecord};

pub use error::{MirrorError, Result};
pub use store::{FjallMirror, StoreStats};

/// Persisted sync cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub position: Position,
    /// Contract the position refers to; a mismatch invalidates the whole mirror
    pub contract: Address,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(position: Position, contract: Address) -> Self {
        Self {
            position,
            contract,
            updated_at: Utc::now(),
        }
    }
}

pub trait MirrorStore: Send + Sync {
    fn get_project(&self, owner: &Address) -> Result<Option<ProjectRecord>>;

    /// Records that are approved and not revoked
    fn list_approved(&self) -> Result<Vec<ProjectRecord>>;

    /// Upsert `record` (when present) and store `checkpoint`, atomically
    fn apply(&self, record: Option<&ProjectRecord>, checkpoint: &Checkpoint) -> Result<()>;

    fn load_checkpoint(&self) -> Result<Option<Checkpoint>>;

    /// Remove every record and the checkpoint
    fn clear(&self) -> Result<()>;
}
