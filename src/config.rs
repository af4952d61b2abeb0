//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default token/account API base.
pub const DEFAULT_API_URL: &str = "https://apitn.openledger.xyz";
/// Default rewards API base.
pub const DEFAULT_REWARDS_URL: &str = "https://rewardstn.openledger.xyz";
/// Default orchestrator websocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://apitn.openledger.xyz/ws/v1/orch";

/// Locations of the input lists and the persisted record store.
#[derive(Debug, Clone)]
pub struct InputPaths {
    /// Whitespace-delimited identity credentials (required).
    pub accounts: PathBuf,
    /// Whitespace-delimited proxy endpoints (optional).
    pub proxies: PathBuf,
    /// JSON identity record store.
    pub store: PathBuf,
    /// JSON array of compute descriptors. Falls back to the built-in list.
    pub catalogue: PathBuf,
}

impl Default for InputPaths {
    fn default() -> Self {
        Self {
            accounts: PathBuf::from("account.txt"),
            proxies: PathBuf::from("proxy.txt"),
            store: PathBuf::from("data.json"),
            catalogue: PathBuf::from("gpu.json"),
        }
    }
}

/// Remote service base URLs.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub api_base: String,
    pub rewards_base: String,
    pub ws_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_URL.to_string(),
            rewards_base: DEFAULT_REWARDS_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
        }
    }
}

impl Endpoints {
    pub fn api(&self, path: &str) -> String {
        format!("{}{path}", self.api_base.trim_end_matches('/'))
    }

    pub fn rewards(&self, path: &str) -> String {
        format!("{}{path}", self.rewards_base.trim_end_matches('/'))
    }
}

/// Timer periods and retry settings.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Period between HEARTBEAT messages on a live connection.
    pub heartbeat_interval: Duration,
    /// Wait after a connection ends before dialing again.
    pub reconnect_delay: Duration,
    /// Wait between attempts of a failed HTTP call.
    pub retry_delay: Duration,
    /// Attempts for the bounded-retry calls (account details, reward claim).
    pub retry_attempts: u32,
    /// Reward-claim pass period.
    pub claim_interval: Duration,
    /// Medal sweep period.
    pub medal_interval: Duration,
    /// Account-details refresh period.
    pub details_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(30),
            retry_delay: Duration::from_secs(60),
            retry_attempts: 3,
            claim_interval: Duration::from_secs(12 * 60 * 60),
            medal_interval: Duration::from_secs(12 * 60 * 60),
            details_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Fleet configuration.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub paths: InputPaths,
    pub endpoints: Endpoints,
    pub timing: Timing,
    /// Maximum identities processed at once by a periodic tick.
    pub max_concurrency: usize,
    /// Directory for the daily rolling log file, if any.
    pub log_dir: Option<PathBuf>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            paths: InputPaths::default(),
            endpoints: Endpoints::default(),
            timing: Timing::default(),
            max_concurrency: 64,
            log_dir: None,
        }
    }
}

impl FleetConfig {
    /// Build configuration from `WORKER_FLEET_*` environment variables over the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let path = |key: &str, default: PathBuf| {
            std::env::var(key).map(PathBuf::from).unwrap_or(default)
        };
        let url = |key: &str, default: String| std::env::var(key).unwrap_or(default);

        let paths = InputPaths {
            accounts: path("WORKER_FLEET_ACCOUNTS", defaults.paths.accounts),
            proxies: path("WORKER_FLEET_PROXIES", defaults.paths.proxies),
            store: path("WORKER_FLEET_STORE", defaults.paths.store),
            catalogue: path("WORKER_FLEET_CATALOGUE", defaults.paths.catalogue),
        };

        let endpoints = Endpoints {
            api_base: url("WORKER_FLEET_API_URL", defaults.endpoints.api_base),
            rewards_base: url("WORKER_FLEET_REWARDS_URL", defaults.endpoints.rewards_base),
            ws_url: url("WORKER_FLEET_WS_URL", defaults.endpoints.ws_url),
        };

        let t = defaults.timing;
        let timing = Timing {
            heartbeat_interval: env_secs("WORKER_FLEET_HEARTBEAT_SECS", t.heartbeat_interval),
            reconnect_delay: env_secs("WORKER_FLEET_RECONNECT_SECS", t.reconnect_delay),
            retry_delay: env_secs("WORKER_FLEET_RETRY_SECS", t.retry_delay),
            retry_attempts: env_parse("WORKER_FLEET_RETRY_ATTEMPTS", t.retry_attempts).max(1),
            claim_interval: env_secs("WORKER_FLEET_CLAIM_INTERVAL_SECS", t.claim_interval),
            medal_interval: env_secs("WORKER_FLEET_MEDAL_INTERVAL_SECS", t.medal_interval),
            details_interval: env_secs("WORKER_FLEET_DETAILS_INTERVAL_SECS", t.details_interval),
        };

        Self {
            paths,
            endpoints,
            timing,
            max_concurrency: env_parse("WORKER_FLEET_MAX_CONCURRENCY", defaults.max_concurrency)
                .max(1),
            log_dir: std::env::var("WORKER_FLEET_LOG_DIR").ok().map(PathBuf::from),
        }
    }
}

fn env_parse<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => parse_or_default(key, &raw, default),
        Err(_) => default,
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_parse(key, default.as_secs()))
}

fn parse_or_default<T: FromStr + std::fmt::Display>(key: &str, raw: &str, default: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid value '{}' for {}, using default {}", raw, key, default);
        default
    })
}
