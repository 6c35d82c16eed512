use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{PoolError, Result};
use crate::pool::content::WordChecks;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the upstream pool manager that serves the proxy list
    pub upstream_url: String,
    /// Directory holding persisted filter results
    pub cache_dir: PathBuf,
    /// Worker count for verification sweeps
    pub filter_workers: usize,
    /// Timing knobs shared by the scheduler and the verification engine
    pub timing: TimingConfig,
    /// Success-word check applied to fetched pages
    pub success_words: WordChecks,
    /// Fail-word check applied to fetched pages
    pub fail_words: WordChecks,
}

#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Default per-page load timeout in seconds
    pub page_timeout_secs: u64,
    /// Minimum seconds between two uses of the same node
    pub reuse_min_secs: u32,
    /// Maximum seconds between two uses of the same node
    pub reuse_max_secs: u32,
    /// Cooldown applied to a penalized node, in seconds
    pub penalty_secs: i64,
    /// Hours a persisted filter result stays fresh
    pub filter_ttl_hours: i64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: 15,
            reuse_min_secs: 30,
            reuse_max_secs: 45,
            penalty_secs: 86400,
            filter_ttl_hours: 24,
        }
    }
}

impl TimingConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn filter_ttl_secs(&self) -> i64 {
        self.filter_ttl_hours * 3600
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let upstream_url = get_env_or("POOL_UPSTREAM_URL", "http://127.0.0.1:19038");
        Url::parse(&upstream_url).map_err(|e| {
            PoolError::InvalidConfig(format!("POOL_UPSTREAM_URL must be a valid URL: {}", e))
        })?;

        let timing = TimingConfig {
            page_timeout_secs: parse_env("POOL_PAGE_TIMEOUT", 15)?,
            reuse_min_secs: parse_env("POOL_REUSE_MIN", 30)?,
            reuse_max_secs: parse_env("POOL_REUSE_MAX", 45)?,
            penalty_secs: parse_env("POOL_PENALTY_SECS", 86400)?,
            filter_ttl_hours: parse_env("POOL_FILTER_TTL_HOURS", 24)?,
        };

        if timing.reuse_min_secs >= timing.reuse_max_secs {
            return Err(PoolError::InvalidConfig(format!(
                "POOL_REUSE_MIN ({}) must be below POOL_REUSE_MAX ({})",
                timing.reuse_min_secs, timing.reuse_max_secs
            )));
        }

        Ok(Config {
            upstream_url,
            cache_dir: PathBuf::from(get_env_or("POOL_CACHE_DIR", "proxy_cache")),
            filter_workers: parse_env("POOL_FILTER_WORKERS", 4)?,
            timing,
            success_words: WordChecks::new(
                split_env("POOL_SUCCESS_WORDS"),
                split_env("POOL_SUCCESS_PATTERNS"),
            ),
            fail_words: WordChecks::new(
                split_env("POOL_FAIL_WORDS"),
                split_env("POOL_FAIL_PATTERNS"),
            ),
        })
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| PoolError::InvalidConfig(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated env var into trimmed, non-empty entries
fn split_env(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
