#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! Token-bucket admission control for outbound LLM requests
//!
//! A [`RateLimiter`] is constructed once per client and shared by every
//! conversation turn issued through it.

mod error;
mod limiter;

pub use error::RateLimitError;
pub use limiter::RateLimiter;
