use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tufe_core::fetch::ConcurrentFetchPolicy;
use tufe_core::provider::evds;
use tufe_core::registry::FallbackPolicy;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8088";
const DEFAULT_DB_PATH: &str = "./db/tufe.db";

/// Server settings, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    /// Allowed CORS origins; `*` allows any.
    pub cors_allow_origins: Vec<String>,
    pub request_timeout: Duration,
    pub attempt_timeout: Duration,
    pub probe_timeout: Duration,
    pub fallback_policy: FallbackPolicy,
    pub concurrent_fetch: ConcurrentFetchPolicy,
    pub evds_series: String,
    /// URL template of an optional JSON mirror (`{series}`, `{period}`).
    pub mirror_url: Option<String>,
    pub mirror_rate_pointer: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8088)),
            db_path: DEFAULT_DB_PATH.to_string(),
            cors_allow_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_millis(500),
            fallback_policy: FallbackPolicy::default(),
            concurrent_fetch: ConcurrentFetchPolicy::default(),
            evds_series: evds::DEFAULT_SERIES.to_string(),
            mirror_url: None,
            mirror_rate_pointer: "/rate".to_string(),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads `TUFE_*` variables over the defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = var("TUFE_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .context("TUFE_LISTEN_ADDR must be host:port")?;

        let cors_allow_origins = match var("TUFE_CORS_ALLOW_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => defaults.cors_allow_origins,
        };

        let fallback_policy = match var("TUFE_FALLBACK_POLICY") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("TUFE_FALLBACK_POLICY '{}'", raw))?,
            None => defaults.fallback_policy,
        };
        let concurrent_fetch = match var("TUFE_CONCURRENT_FETCH") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("TUFE_CONCURRENT_FETCH '{}'", raw))?,
            None => defaults.concurrent_fetch,
        };

        Ok(Self {
            listen_addr,
            db_path: var("TUFE_DB_PATH").unwrap_or(defaults.db_path),
            cors_allow_origins,
            request_timeout: millis("TUFE_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
            attempt_timeout: millis("TUFE_ATTEMPT_TIMEOUT_MS", defaults.attempt_timeout)?,
            probe_timeout: millis("TUFE_PROBE_TIMEOUT_MS", defaults.probe_timeout)?,
            fallback_policy,
            concurrent_fetch,
            evds_series: var("TUFE_EVDS_SERIES").unwrap_or(defaults.evds_series),
            mirror_url: var("TUFE_MIRROR_URL"),
            mirror_rate_pointer: var("TUFE_MIRROR_RATE_POINTER")
                .unwrap_or(defaults.mirror_rate_pointer),
        })
    }
}

/// Non-empty value of `key`.
fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn millis(key: &str, default: Duration) -> anyhow::Result<Duration> {
    match var(key) {
        Some(raw) => {
            let ms: u64 = raw
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds", key))?;
            anyhow::ensure!(ms > 0, "{} must be positive", key);
            Ok(Duration::from_millis(ms))
        }
        None => Ok(default),
    }
}
