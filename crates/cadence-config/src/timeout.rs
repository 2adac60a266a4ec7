use serde::Deserialize;

/// Connect and read deadlines
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// TCP/TLS connect deadline
    #[serde(default = "default_connect")]
    pub connect: String,
    /// Read deadline for ordinary payloads
    #[serde(default = "default_read")]
    pub read: String,
    /// Read deadline once the request body exceeds `large_payload_threshold`
    #[serde(default = "default_read_large")]
    pub read_large: String,
    /// Request body size in bytes above which `read_large` applies
    #[serde(default = "default_large_payload_threshold")]
    pub large_payload_threshold: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: default_connect(),
            read: default_read(),
            read_large: default_read_large(),
            large_payload_threshold: default_large_payload_threshold(),
        }
    }
}

fn default_connect() -> String {
    "10s".to_owned()
}

fn default_read() -> String {
    "2m".to_owned()
}

fn default_read_large() -> String {
    "5m".to_owned()
}

const fn default_large_payload_threshold() -> usize {
    1024 * 1024
}
