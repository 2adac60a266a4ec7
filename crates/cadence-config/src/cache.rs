use serde::Deserialize;

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Whether caching is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Maximum number of cached responses
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Default entry lifetime (e.g. "10m")
    #[serde(default = "default_ttl")]
    pub ttl: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: default_capacity(),
            ttl: default_ttl(),
        }
    }
}

const fn default_capacity() -> usize {
    256
}

fn default_ttl() -> String {
    "1h".to_owned()
}
