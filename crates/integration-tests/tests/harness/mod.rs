//! Shared test infrastructure

#![allow(dead_code)]

pub mod mock_llm;
pub mod tools;

use std::time::Duration;

use cadence_llm::{RetryConfig, TimeoutConfig};

/// Retry policy with delays short enough for tests
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
        retryable_status_codes: vec![500, 502, 503],
    }
}

/// Timeouts with a short read deadline
pub fn short_timeouts(read: Duration) -> TimeoutConfig {
    TimeoutConfig {
        connect: Duration::from_secs(2),
        read,
        read_large: read,
        large_payload_threshold: 1024 * 1024,
    }
}
