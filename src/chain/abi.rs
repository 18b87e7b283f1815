//! Contract event ABI: topic hashes and payload decoding
//!
//! Events emitted by the project approval contract:
//! - `ProjectSubmitted(address owner, string projectDetailsHash, string certificateHash)`
//! - `ProjectApproved(address owner, string approvalHash)`
//! - `ProjectRevoked(address owner)`
//!
//! `topic0` is keccak256 of the signature. The owner is taken from `topic1`
//! when the contract indexes it, otherwise from the first word of `data`.

use std::sync::LazyLock;

use sha3::{Digest, Keccak256};

use super::error::DecodeError;
use crate::model::{Address, EventKind, EventPayload, LedgerEvent, RawLog};

const WORD: usize = 32;

static TOPICS: LazyLock<[(EventKind, [u8; 32]); 3]> = LazyLock::new(|| {
    EventKind::ALL.map(|kind| (kind, keccak(signature(kind).as_bytes())))
});

pub fn signature(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Submitted => "ProjectSubmitted(address,string,string)",
        EventKind::Approved => "ProjectApproved(address,string)",
        EventKind::Revoked => "ProjectRevoked(address)",
    }
}

pub fn topic(kind: EventKind) -> [u8; 32] {
    TOPICS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, t)| *t)
        .unwrap_or_default()
}

pub fn kind_for_topic(topic: &[u8; 32]) -> Option<EventKind> {
    TOPICS.iter().find(|(_, t)| t == topic).map(|(k, _)| *k)
}

fn keccak(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Decode a raw log into a typed ledger event
pub fn decode(log: &RawLog) -> Result<LedgerEvent, DecodeError> {
    let topic0 = log.topics.first().ok_or(DecodeError::MissingTopic)?;
    let kind =
        kind_for_topic(topic0).ok_or_else(|| DecodeError::UnknownTopic(hex::encode(topic0)))?;

    let payload = Payload {
        data: &log.data,
        event: signature(kind),
    };

    // Indexed owner lives in topic1 and the data head starts with the dynamic fields.
    let (owner, head) = match log.topics.get(1) {
        Some(word) => (address_from_word(word)?, 0),
        None => (payload.address(0)?, 1),
    };

    let payload = match kind {
        EventKind::Submitted => EventPayload::Submitted {
            project_details_hash: payload.string(head)?,
            certificate_hash: payload.string(head + 1)?,
        },
        EventKind::Approved => EventPayload::Approved {
            approval_hash: payload.string(head)?,
        },
        EventKind::Revoked => EventPayload::Revoked,
    };

    Ok(LedgerEvent {
        owner,
        position: log.position,
        payload,
    })
}

/// Encode an event as the contract would emit it, with the owner indexed
pub fn encode(event: &LedgerEvent, contract: Address) -> RawLog {
    let mut owner_word = [0u8; 32];
    owner_word[12..].copy_from_slice(event.owner.as_bytes());

    let data = match &event.payload {
        EventPayload::Submitted {
            project_details_hash,
            certificate_hash,
        } => encode_strings(&[project_details_hash, certificate_hash]),
        EventPayload::Approved { approval_hash } => encode_strings(&[approval_hash]),
        EventPayload::Revoked => Vec::new(),
    };

    RawLog {
        address: contract,
        topics: vec![topic(event.kind()), owner_word],
        data,
        position: event.position,
        removed: false,
    }
}

fn encode_strings(values: &[&String]) -> Vec<u8> {
    let mut head = Vec::with_capacity(values.len() * WORD);
    let mut tail = Vec::new();
    let head_len = values.len() * WORD;

    for value in values {
        head.extend_from_slice(&usize_word(head_len + tail.len()));
        tail.extend_from_slice(&usize_word(value.len()));
        tail.extend_from_slice(value.as_bytes());
        let padding = (WORD - value.len() % WORD) % WORD;
        tail.extend(std::iter::repeat_n(0u8, padding));
    }

    head.extend(tail);
    head
}

fn usize_word(value: usize) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

fn address_from_word(word: &[u8; 32]) -> Result<Address, DecodeError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(DecodeError::InvalidAddress(hex::encode(word)));
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Ok(Address(bytes))
}

struct Payload<'a> {
    data: &'a [u8],
    event: &'static str,
}

impl Payload<'_> {
    fn malformed(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::Malformed {
            event: self.event,
            reason: reason.into(),
        }
    }

    fn slice(&self, start: usize, len: usize) -> Result<&[u8], DecodeError> {
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| {
                self.malformed(format!(
                    "need {} bytes at offset {}, payload is {} bytes",
                    len,
                    start,
                    self.data.len()
                ))
            })
    }

    fn word_at(&self, offset: usize) -> Result<[u8; 32], DecodeError> {
        let bytes = self.slice(offset, WORD)?;
        let mut word = [0u8; 32];
        word.copy_from_slice(bytes);
        Ok(word)
    }

    fn usize_at(&self, offset: usize) -> Result<usize, DecodeError> {
        let word = self.word_at(offset)?;
        if word[..24].iter().any(|b| *b != 0) {
            return Err(self.malformed(format!("length/offset word too large at {}", offset)));
        }
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&word[24..]);
        usize::try_from(u64::from_be_bytes(tail))
            .map_err(|_| self.malformed(format!("length/offset overflows at {}", offset)))
    }

    fn address(&self, index: usize) -> Result<Address, DecodeError> {
        address_from_word(&self.word_at(index * WORD)?)
    }

    fn string(&self, index: usize) -> Result<String, DecodeError> {
        let offset = self.usize_at(index * WORD)?;
        let len = self.usize_at(offset)?;
        let start = offset
            .checked_add(WORD)
            .ok_or_else(|| self.malformed("string offset overflows"))?;
        let bytes = self.slice(start, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| self.malformed(e.to_string()))
    }
}
