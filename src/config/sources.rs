use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "LEDGERMIRROR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/ledgermirror.toml";
const ENV_PREFIX: &str = "LEDGERMIRROR";
const ENV_SEPARATOR: &str = "__";
const PROVIDER_ENV_VAR: &str = "WEB3_PROVIDER";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
///
/// `path` overrides both `LEDGERMIRROR_CONFIG` and the default location.
pub fn load(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = path.unwrap_or_else(|| {
        env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    });

    let mut config = load_from_sources(config_path)?;
    apply_provider_fallback(&mut config, env::var(PROVIDER_ENV_VAR).ok());

    Ok(config)
}

/// The node URL is often a secret; it may come from `WEB3_PROVIDER` instead of the file
fn apply_provider_fallback(config: &mut Config, provider: Option<String>) {
    if config.ledger.rpc_url.is_some() {
        return;
    }
    if let Some(url) = provider.filter(|url| !url.trim().is_empty()) {
        tracing::debug!("Using RPC endpoint from {}", PROVIDER_ENV_VAR);
        config.ledger.rpc_url = Some(url);
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    // Add TOML file if it exists (optional)
    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // LEDGERMIRROR__LEDGER__START_BLOCK -> ledger.start_block
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
