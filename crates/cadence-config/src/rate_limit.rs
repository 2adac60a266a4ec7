use serde::Deserialize;

/// Token-bucket admission control for outbound requests
///
/// `max_requests = 0` disables limiting.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests replenished per window
    #[serde(default)]
    pub max_requests: u32,
    /// Window duration (e.g. "1m", "1h")
    #[serde(default = "default_window")]
    pub window: String,
    /// Bucket capacity, defaults to `max_requests`
    #[serde(default)]
    pub burst: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 0,
            window: default_window(),
            burst: None,
        }
    }
}

impl RateLimitConfig {
    pub const fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }
}

fn default_window() -> String {
    "1m".to_owned()
}
