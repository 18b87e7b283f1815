/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `projects`: project:{owner} -> ProjectRecord (JSON)
/// - `metadata`: meta:{key} -> value (JSON)
use crate::model::Address;

pub const PROJECT_PREFIX: &str = "project:";

/// Metadata key of the sync checkpoint
pub const META_CURSOR: &str = "cursor";

/// Encode a project key: project:{owner}
pub fn encode_project_key(owner: &Address) -> Vec<u8> {
    format!("{}{}", PROJECT_PREFIX, owner).into_bytes()
}

/// Decode a project key: project:{owner} -> owner
pub fn decode_project_key(key: &[u8]) -> Option<Address> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix(PROJECT_PREFIX)?.parse().ok()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
