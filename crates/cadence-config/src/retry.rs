use serde::Deserialize;

/// Retry policy for request issuance
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry (e.g. "1s")
    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,
    /// Upper bound on any single delay
    #[serde(default = "default_max_delay")]
    pub max_delay: String,
    /// Exponential growth factor, at least 1.0
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// HTTP statuses worth retrying
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            retryable_status_codes: default_retryable_status_codes(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> String {
    "1s".to_owned()
}

fn default_max_delay() -> String {
    "30s".to_owned()
}

const fn default_multiplier() -> f64 {
    2.0
}

fn default_retryable_status_codes() -> Vec<u16> {
    vec![408, 429, 500, 502, 503, 504]
}
