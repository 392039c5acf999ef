//! Client configuration with environment overrides.

use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(2 * 60);
/// Stale time of the slow-changing skill catalog.
pub const CATALOG_STALE_TIME: Duration = Duration::from_secs(10 * 60);
/// How long an unobserved entry may sit unused before it is evicted.
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Page size used by detail lookups, which scan a single page client-side.
pub const DETAIL_SCAN_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub stale_time: Duration,
    pub gc_time: Duration,
    pub retry: u32,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
            retry: 1,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `PORTFOLIO_API_BASE`, `PORTFOLIO_STALE_SECS`,
    /// `PORTFOLIO_GC_SECS`, `PORTFOLIO_RETRY` and `PORTFOLIO_TIMEOUT_SECS`.
    /// Unparseable numbers fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        Self {
            base_url: lookup("PORTFOLIO_API_BASE").unwrap_or(defaults.base_url),
            stale_time: secs("PORTFOLIO_STALE_SECS", defaults.stale_time),
            gc_time: secs("PORTFOLIO_GC_SECS", defaults.gc_time),
            retry: lookup("PORTFOLIO_RETRY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry),
            request_timeout: secs("PORTFOLIO_TIMEOUT_SECS", defaults.request_timeout),
        }
    }
}
