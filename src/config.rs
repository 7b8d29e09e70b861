//! Configuration for the Clawmegle client.
//!
//! Settings are loaded with priority: env var > default. `.env` files are
//! loaded via dotenvy early in startup (`./.env` first, then
//! `~/.clawmegle/.env`), so explicit env vars always win.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default remote service base URL.
const DEFAULT_API_BASE_URL: &str = "https://www.clawmegle.xyz";

/// Default poll cadence for the session controller.
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default HTTP client timeout.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default paid-query page size.
const DEFAULT_QUERY_LIMIT: u32 = 10;

/// USDC on Base.
const DEFAULT_ASSET_ADDRESS: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
const DEFAULT_ASSET_NAME: &str = "USD Coin";
const DEFAULT_ASSET_VERSION: &str = "2";
const DEFAULT_CHAIN_ID: u64 = 8453;

/// Collective query payee.
const DEFAULT_PAY_TO: &str = "0x81FD234f63Dd559d0EDA56d17BB1Bb78f236DB37";

/// Payment asset the paid-query flow signs authorizations against.
///
/// These four values form the EIP-712 domain of every authorization; they are
/// constants of the asset, not user settings. Env overrides exist so tests
/// and staging deployments can point at a different token.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub address: String,
}

/// Main configuration for the client.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the matching/chat service.
    pub api_base_url: String,
    /// Session poll cadence.
    pub poll_interval: Duration,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Result page size for collective queries.
    pub query_limit: u32,
    /// Payment asset used for paid queries.
    pub asset: AssetConfig,
    /// Address paid-query authorizations transfer to.
    pub pay_to: String,
}

impl Config {
    /// Resolve configuration from the environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let api_base_url =
            optional_env("CLAWMEGLE_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.into());
        url::Url::parse(&api_base_url).map_err(|e| ConfigError::InvalidValue {
            key: "CLAWMEGLE_API_BASE_URL".into(),
            message: e.to_string(),
        })?;

        let poll_interval = Duration::from_millis(parsed_env(
            "CLAWMEGLE_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        )?);
        let http_timeout = Duration::from_secs(parsed_env(
            "CLAWMEGLE_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);
        let query_limit = parsed_env("CLAWMEGLE_QUERY_LIMIT", DEFAULT_QUERY_LIMIT)?;

        let asset = AssetConfig {
            name: optional_env("CLAWMEGLE_ASSET_NAME").unwrap_or_else(|| DEFAULT_ASSET_NAME.into()),
            version: optional_env("CLAWMEGLE_ASSET_VERSION")
                .unwrap_or_else(|| DEFAULT_ASSET_VERSION.into()),
            chain_id: parsed_env("CLAWMEGLE_CHAIN_ID", DEFAULT_CHAIN_ID)?,
            address: optional_env("CLAWMEGLE_ASSET_ADDRESS")
                .unwrap_or_else(|| DEFAULT_ASSET_ADDRESS.into()),
        };
        let pay_to = optional_env("CLAWMEGLE_PAY_TO").unwrap_or_else(|| DEFAULT_PAY_TO.into());

        Ok(Self {
            api_base_url,
            poll_interval,
            http_timeout,
            query_limit,
            asset,
            pay_to,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            query_limit: DEFAULT_QUERY_LIMIT,
            asset: AssetConfig {
                name: DEFAULT_ASSET_NAME.into(),
                version: DEFAULT_ASSET_VERSION.into(),
                chain_id: DEFAULT_CHAIN_ID,
                address: DEFAULT_ASSET_ADDRESS.into(),
            },
            pay_to: DEFAULT_PAY_TO.into(),
        }
    }
}

/// Path to the Clawmegle data directory: `~/.clawmegle` (or `CLAWMEGLE_HOME`).
pub fn clawmegle_dir() -> PathBuf {
    if let Some(dir) = optional_env("CLAWMEGLE_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".clawmegle")
}

/// Load env vars from `./.env` and `~/.clawmegle/.env`.
///
/// dotenvy never overwrites existing vars, so the effective priority is:
/// explicit env vars > `./.env` > `~/.clawmegle/.env`.
pub fn load_env() {
    let _ = dotenvy::dotenv();
    let path = clawmegle_dir().join(".env");
    if path.exists() {
        let _ = dotenvy::from_path(&path);
    }
}

/// Read an env var, treating unset and empty as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
