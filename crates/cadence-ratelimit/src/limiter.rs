use std::{num::NonZeroU32, sync::Arc, time::Duration};

use cadence_config::RateLimitConfig;
use governor::{
    DefaultDirectRateLimiter, Quota,
    clock::{Clock, DefaultClock},
};

use crate::error::RateLimitError;

/// Token-bucket rate limiter backed by governor
///
/// Capacity is the burst size; one token is replenished every
/// `window / max_requests`. Refill is computed lazily from elapsed time on
/// each admission check. Cloning shares the same bucket.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Option<Arc<Bucket>>,
}

struct Bucket {
    limiter: DefaultDirectRateLimiter,
    clock: DefaultClock,
    burst: u32,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Some(bucket) => f.debug_struct("RateLimiter").field("burst", &bucket.burst).finish_non_exhaustive(),
            None => f.debug_struct("RateLimiter").field("enabled", &false).finish(),
        }
    }
}

impl RateLimiter {
    /// Create a rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Requests replenished per window, zero disables limiting
    /// * `window` - Time window duration
    /// * `burst` - Bucket capacity, defaults to `max_requests`
    pub fn new(max_requests: u32, window: Duration, burst: Option<u32>) -> Result<Self, RateLimitError> {
        if max_requests == 0 {
            return Ok(Self::disabled());
        }

        if window.is_zero() {
            return Err(RateLimitError::Config("rate limit window must be > 0".to_string()));
        }

        let replenish_interval = window
            .checked_div(max_requests)
            .filter(|interval| !interval.is_zero())
            .ok_or_else(|| RateLimitError::Config("rate limit window too small for max_requests".to_string()))?;

        let burst = burst.unwrap_or(max_requests);
        let burst_size =
            NonZeroU32::new(burst).ok_or_else(|| RateLimitError::Config("burst must be > 0".to_string()))?;

        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| RateLimitError::Config("invalid rate limit period".to_string()))?
            .allow_burst(burst_size);

        tracing::debug!(max_requests, ?window, burst, "rate limiter enabled");

        Ok(Self {
            inner: Some(Arc::new(Bucket {
                limiter: governor::RateLimiter::direct(quota),
                clock: DefaultClock::default(),
                burst,
            })),
        })
    }

    /// Create from configuration
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let window = parse_duration(&config.window)?;
        Self::new(config.max_requests, window, config.burst)
    }

    /// A limiter that admits every request immediately
    pub const fn disabled() -> Self {
        Self { inner: None }
    }

    /// Whether this limiter ever suspends callers
    pub const fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Bucket capacity, `None` when disabled
    pub fn burst(&self) -> Option<u32> {
        self.inner.as_ref().map(|bucket| bucket.burst)
    }

    /// Wait until a token is available and take it
    pub async fn acquire(&self) {
        let Some(bucket) = &self.inner else {
            return;
        };

        if bucket.limiter.check().is_ok() {
            return;
        }

        tracing::debug!("rate limit reached, waiting for token");
        bucket.limiter.until_ready().await;
    }

    /// Take a token without waiting
    pub fn try_acquire(&self) -> Result<(), RateLimitError> {
        let Some(bucket) = &self.inner else {
            return Ok(());
        };

        bucket.limiter.check().map_err(|not_until| RateLimitError::Exceeded {
            retry_after: not_until.wait_time_from(bucket.clock.now()),
        })
    }
}

fn parse_duration(s: &str) -> Result<Duration, RateLimitError> {
    duration_str::parse(s).map_err(|e| RateLimitError::Config(format!("invalid duration '{s}': {e}")))
}
