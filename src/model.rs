//! Domain types shared by the ledger client, the reconciler and the mirror store.
//!
//! - [`Address`]: 20-byte account identifier, the key of every project record
//! - [`Position`]: (block number, log index), the total order of ledger emission
//! - [`LedgerEvent`]: a decoded contract event with its position
//! - [`ProjectRecord`]: the mirrored projection of one owner's event history

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("address must be 40 hex characters, got {0}")]
    InvalidLength(usize),

    #[error("address contains non-hex characters: {0}")]
    InvalidHex(String),
}

/// Fixed-length (20 byte) account address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex_part = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(s.to_string()))?;

        if hex_part.len() != 40 {
            return Err(AddressError::InvalidLength(hex_part.len()));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|_| AddressError::InvalidHex(s.to_string()))?;
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Sequence position of a ledger event: block number, then log index within the block.
///
/// The derived ordering compares `block` first, which is the emission order of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub block: u64,
    pub log_index: u64,
}

impl Position {
    pub const fn new(block: u64, log_index: u64) -> Self {
        Self { block, log_index }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.log_index)
    }
}

/// Event type tag, used for filtering historical fetches and subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Submitted,
    Approved,
    Revoked,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Submitted, EventKind::Approved, EventKind::Revoked];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Submitted => "ProjectSubmitted",
            EventKind::Approved => "ProjectApproved",
            EventKind::Revoked => "ProjectRevoked",
        };
        f.write_str(name)
    }
}

/// Variant-specific payload of a project lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Submitted {
        project_details_hash: String,
        certificate_hash: String,
    },
    Approved {
        approval_hash: String,
    },
    Revoked,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Submitted { .. } => EventKind::Submitted,
            EventPayload::Approved { .. } => EventKind::Approved,
            EventPayload::Revoked => EventKind::Revoked,
        }
    }
}

/// A decoded ledger event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub owner: Address,
    pub position: Position,
    pub payload: EventPayload,
}

impl LedgerEvent {
    pub fn submitted(
        owner: Address,
        position: Position,
        project_details_hash: impl Into<String>,
        certificate_hash: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            position,
            payload: EventPayload::Submitted {
                project_details_hash: project_details_hash.into(),
                certificate_hash: certificate_hash.into(),
            },
        }
    }

    pub fn approved(owner: Address, position: Position, approval_hash: impl Into<String>) -> Self {
        Self {
            owner,
            position,
            payload: EventPayload::Approved {
                approval_hash: approval_hash.into(),
            },
        }
    }

    pub fn revoked(owner: Address, position: Position) -> Self {
        Self {
            owner,
            position,
            payload: EventPayload::Revoked,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Undecoded contract log as delivered by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub position: Position,
    /// Set by the node when the log was dropped by a reorg
    pub removed: bool,
}

/// Mirrored state of one project, keyed by owner.
///
/// Invariants: `is_revoked` implies `is_approved`, and `approval_hash` is
/// `Some` exactly when `is_approved` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub owner: Address,
    pub project_details_hash: String,
    pub certificate_hash: String,
    pub is_approved: bool,
    pub is_revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_hash: Option<String>,
    /// Position of the last event that changed this record
    pub last_position: Position,
}

impl ProjectRecord {
    pub fn submitted(
        owner: Address,
        project_details_hash: String,
        certificate_hash: String,
        position: Position,
    ) -> Self {
        Self {
            owner,
            project_details_hash,
            certificate_hash,
            is_approved: false,
            is_revoked: false,
            approval_hash: None,
            last_position: position,
        }
    }

    /// Approved and not revoked
    pub fn is_active(&self) -> bool {
        self.is_approved && !self.is_revoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip_lowercases() {
        let addr: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
        assert_eq!(addr.to_string(), "0x5fbdb2315678afecb367f032d93f642f64180aa3");
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!(matches!(
            "5fbdb2315678afecb367f032d93f642f64180aa3".parse::<Address>(),
            Err(AddressError::MissingPrefix(_))
        ));
        assert_eq!("0x1234".parse::<Address>(), Err(AddressError::InvalidLength(4)));
        assert!(matches!(
            "0xzzbdb2315678afecb367f032d93f642f64180aa3".parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_position_orders_by_block_then_log_index() {
        assert!(Position::new(1, 9) < Position::new(2, 0));
        assert!(Position::new(2, 0) < Position::new(2, 1));
        assert_eq!(Position::new(3, 4).to_string(), "3:4");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = ProjectRecord::submitted(
            Address::ZERO,
            "hashA".to_string(),
            "hashB".to_string(),
            Position::new(1, 0),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["projectDetailsHash"], "hashA");
        assert_eq!(json["isApproved"], false);
        assert!(json.get("approvalHash").is_none());
    }
}
