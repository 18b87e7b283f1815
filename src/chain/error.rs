use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("Subscription disconnected: {0}")]
    Disconnected(String),

    #[error("No heartbeat from subscription within {0:?}")]
    HeartbeatTimeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Failure to turn a raw log into a typed event. Local to one event, never fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingTopic,

    #[error("unknown event topic 0x{0}")]
    UnknownTopic(String),

    #[error("malformed {event} payload: {reason}")]
    Malformed { event: &'static str, reason: String },

    #[error("invalid address word: {0}")]
    InvalidAddress(String),
}
