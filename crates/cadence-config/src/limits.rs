use serde::Deserialize;

/// Tool execution loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Tool rounds allowed per conversation turn before the loop stops
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
        }
    }
}

/// Request size limits enforced before issuing
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted message history
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

const fn default_attempts() -> u32 {
    5
}

const fn default_max_messages() -> usize {
    1024
}
