//! Retry policy engine
//!
//! Failed request issuance is classified with [`LlmError::is_retryable`] and
//! re-attempted after an exponential, capped delay.

use std::{future::Future, time::Duration};

use crate::error::LlmError;

/// Retry budget and backoff curve
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            retryable_status_codes: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Issue once and never retry
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Backoff before retry number `attempt` (zero based)
    ///
    /// `min(initial_delay * multiplier^attempt, max_delay)`, saturating at
    /// `max_delay` when the exponential term overflows.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        // NaN and sub-unit multipliers would break monotonicity
        let multiplier = self.multiplier.max(1.0);
        let secs = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl TryFrom<&cadence_config::RetryConfig> for RetryConfig {
    type Error = anyhow::Error;

    fn try_from(config: &cadence_config::RetryConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            max_attempts: config.max_attempts,
            initial_delay: cadence_config::parse_duration("retry.initial_delay", &config.initial_delay)?,
            max_delay: cadence_config::parse_duration("retry.max_delay", &config.max_delay)?,
            multiplier: config.multiplier,
            retryable_status_codes: config.retryable_status_codes.clone(),
        })
    }
}

/// Run `operation` until it succeeds, fails fatally, or the budget runs out
///
/// The operation receives the zero-based attempt number. Exhaustion returns
/// the last error unchanged.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation_name: &str, mut operation: F) -> Result<T, LlmError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(operation = operation_name, attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < config.max_attempts && e.is_retryable(config) => {
                let delay = config.delay(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts,
                    ?delay,
                    error = %e,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::error!(operation = operation_name, attempts = attempt + 1, error = %e, "giving up");
                }
                return Err(e);
            }
        }
    }
}
