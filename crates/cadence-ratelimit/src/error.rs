use std::time::Duration;

use thiserror::Error;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Configuration error
    #[error("rate limit configuration error: {0}")]
    Config(String),

    /// No token is available right now
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    Exceeded {
        /// Time until the next token is replenished
        retry_after: Duration,
    },
}
