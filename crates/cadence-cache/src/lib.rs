#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! In-memory LRU + TTL response cache for complete chat responses
//!
//! Entries are keyed by a SHA-256 hash of the canonical request (model +
//! messages + resolved options + tool names). Only deterministic requests
//! (temperature 0 or unset) are cached by default.

mod lru;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use lru::{CacheStats, ResponseCache};

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid cache configuration
    #[error("cache config: {0}")]
    Config(String),
}

/// Compute a SHA-256 cache key from a serializable request
///
/// Hashes the canonical JSON representation of the request fields that
/// determine the response. Callers exclude per-call state that does not
/// affect output content, such as the opaque tool context.
pub fn compute_cache_key<T: serde::Serialize>(request: &T) -> String {
    let json = serde_json::to_string(request).unwrap_or_default();
    let hash = Sha256::digest(json.as_bytes());
    format!("{hash:x}")
}

/// Check whether a request is cacheable
///
/// Only deterministic requests (temperature 0 or unset) are eligible.
#[must_use]
pub fn is_cacheable(temperature: Option<f64>) -> bool {
    temperature.is_none_or(|t| t == 0.0)
}
