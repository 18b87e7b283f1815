use super::models::Config;
use crate::humanize::HumanDuration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("ledger.contract_address is required")]
    MissingContractAddress,

    #[error("ledger.rpc_url is required (or set WEB3_PROVIDER)")]
    MissingRpcUrl,

    #[error("Invalid RPC endpoint '{url}', expected an http:// or https:// URL")]
    InvalidRpcScheme { url: String },

    #[error("mirror.path must not be empty")]
    EmptyMirrorPath,

    #[error("ledger.max_block_range must be positive")]
    ZeroBlockRange,

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("sync.backoff_base ({base}) exceeds sync.backoff_cap ({cap})")]
    BackoffOrder { base: HumanDuration, cap: HumanDuration },

    #[error("sync.heartbeat_timeout ({heartbeat}) must exceed ledger.poll_interval ({poll_interval})")]
    HeartbeatTooShort {
        heartbeat: HumanDuration,
        poll_interval: HumanDuration,
    },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_mirror(config)?;
    validate_ledger(config)?;
    validate_durations(config)?;
    validate_sync(config)?;
    Ok(())
}

/// Subset needed by commands that only read the local mirror
pub fn validate_mirror(config: &Config) -> Result<(), ValidationError> {
    if config.mirror.path.as_os_str().is_empty() {
        return Err(ValidationError::EmptyMirrorPath);
    }
    Ok(())
}

/// Contract and endpoint must be present and well-formed
fn validate_ledger(config: &Config) -> Result<(), ValidationError> {
    if config.ledger.contract_address.is_none() {
        return Err(ValidationError::MissingContractAddress);
    }

    let url = config
        .ledger
        .rpc_url
        .as_deref()
        .ok_or(ValidationError::MissingRpcUrl)?;
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => {
            return Err(ValidationError::InvalidRpcScheme {
                url: url.to_string(),
            });
        }
    }

    if config.ledger.max_block_range == 0 {
        return Err(ValidationError::ZeroBlockRange);
    }

    Ok(())
}

fn validate_durations(config: &Config) -> Result<(), ValidationError> {
    let durations = [
        ("ledger.poll_interval", config.ledger.poll_interval),
        ("ledger.request_timeout", config.ledger.request_timeout),
        ("sync.backoff_base", config.sync.backoff_base),
        ("sync.backoff_cap", config.sync.backoff_cap),
        ("sync.heartbeat_timeout", config.sync.heartbeat_timeout),
    ];

    for (field, value) in durations {
        if value.is_zero() {
            return Err(ValidationError::ZeroDuration { field });
        }
    }

    Ok(())
}

/// A live feed heartbeats once per poll, so the timeout has to leave room for one
fn validate_sync(config: &Config) -> Result<(), ValidationError> {
    let sync = &config.sync;
    if sync.backoff_base > sync.backoff_cap {
        return Err(ValidationError::BackoffOrder {
            base: sync.backoff_base,
            cap: sync.backoff_cap,
        });
    }

    if sync.heartbeat_timeout <= config.ledger.poll_interval {
        return Err(ValidationError::HeartbeatTooShort {
            heartbeat: sync.heartbeat_timeout,
            poll_interval: config.ledger.poll_interval,
        });
    }

    Ok(())
}
