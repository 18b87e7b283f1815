use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::Serialize;
use tracing::{debug, info};

use super::error::{MirrorError, Result};
use super::partitions::{
    META_CURSOR, PROJECT_PREFIX, decode_project_key, encode_meta_key, encode_project_key,
};
use super::{Checkpoint, MirrorStore};
use crate::model::{Address, ProjectRecord};

/// Fjall-backed persistent mirror of project records
#[derive(Clone)]
pub struct FjallMirror {
    keyspace: Keyspace,
    projects: PartitionHandle,
    metadata: PartitionHandle,
}

impl FjallMirror {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall mirror at: {}", path.display());

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let projects = keyspace.open_partition("projects", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!("Fjall mirror opened successfully");
        Ok(Self {
            keyspace,
            projects,
            metadata,
        })
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        let mut project_count = 0;
        let mut approved_count = 0;
        let mut revoked_count = 0;

        for item in self.projects.prefix(PROJECT_PREFIX) {
            let (_, value) = item?;
            let record: ProjectRecord = serde_json::from_slice(&value)?;
            project_count += 1;
            if record.is_active() {
                approved_count += 1;
            }
            if record.is_revoked {
                revoked_count += 1;
            }
        }

        Ok(StoreStats {
            project_count,
            approved_count,
            revoked_count,
        })
    }

    /// All owners with a record, in key order
    pub fn owners(&self) -> Result<Vec<Address>> {
        let mut owners = Vec::new();
        for item in self.projects.prefix(PROJECT_PREFIX) {
            let (key, _) = item?;
            let owner = decode_project_key(&key)
                .ok_or_else(|| MirrorError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))?;
            owners.push(owner);
        }
        Ok(owners)
    }
}

impl MirrorStore for FjallMirror {
    fn get_project(&self, owner: &Address) -> Result<Option<ProjectRecord>> {
        let key = encode_project_key(owner);
        match self.projects.get(key)? {
            Some(value) => {
                let record = serde_json::from_slice(&value)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list_approved(&self) -> Result<Vec<ProjectRecord>> {
        let mut approved = Vec::new();
        for item in self.projects.prefix(PROJECT_PREFIX) {
            let (_, value) = item?;
            let record: ProjectRecord = serde_json::from_slice(&value)?;
            if record.is_active() {
                approved.push(record);
            }
        }
        Ok(approved)
    }

    fn apply(&self, record: Option<&ProjectRecord>, checkpoint: &Checkpoint) -> Result<()> {
        let mut batch = self.keyspace.batch();

        if let Some(record) = record {
            batch.insert(
                &self.projects,
                encode_project_key(&record.owner),
                to_json(record)?,
            );
        }
        batch.insert(&self.metadata, encode_meta_key(META_CURSOR), to_json(checkpoint)?);
        batch.commit()?;

        debug!(
            owner = ?record.map(|r| r.owner.to_string()),
            position = %checkpoint.position,
            "Applied mirror write"
        );
        Ok(())
    }

    fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        match self.metadata.get(encode_meta_key(META_CURSOR))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn clear(&self) -> Result<()> {
        let mut batch = self.keyspace.batch();
        let mut removed = 0;

        for partition in [&self.projects, &self.metadata] {
            for item in partition.iter() {
                let (key, _) = item?;
                batch.remove(partition, key);
                removed += 1;
            }
        }
        batch.commit()?;

        info!(removed, "Cleared mirror store");
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub project_count: usize,
    pub approved_count: usize,
    pub revoked_count: usize,
}
