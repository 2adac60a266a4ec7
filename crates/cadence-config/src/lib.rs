#![allow(clippy::must_use_candidate)]

//! Configuration surface for the cadence orchestration engine
//!
//! Every section is optional; omitted sections fall back to the documented
//! defaults (retry 3 / 1s / 30s / x2, timeouts 10s / 2m / 5m at 1 MiB,
//! rate limiting and caching disabled).

pub mod backend;
pub mod cache;
mod env;
pub mod limits;
mod loader;
pub mod rate_limit;
pub mod retry;
pub mod timeout;

use std::time::Duration;

use serde::Deserialize;

pub use backend::*;
pub use cache::*;
pub use env::ExpandError;
pub use limits::*;
pub use rate_limit::*;
pub use retry::*;
pub use timeout::*;

/// Top-level cadence configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Model backend
    #[serde(default)]
    pub backend: BackendConfig,
    /// Retry policy for request issuance
    #[serde(default)]
    pub retry: RetryConfig,
    /// Connect and read deadlines
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Outbound admission control
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Response memoization
    #[serde(default)]
    pub cache: CacheConfig,
    /// Tool execution loop
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Request size limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Parse a human duration string such as `"1s"` or `"2m"`
///
/// # Errors
///
/// Returns an error naming `field` when the string is not a valid duration
pub fn parse_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration for {field} '{value}': {e}"))
}
