use std::time::Duration;

use serde::Serialize;

use super::{Message, ToolContext, ToolDefinition};
use crate::{retry::RetryConfig, timeout::TimeoutConfig};

/// Per-call options, each overriding the client default when set
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Ask the model to emit its reasoning separately
    pub think: Option<bool>,
    /// Tool rounds allowed before the loop stops
    pub tool_attempts: Option<u32>,
    /// Opaque state handed to tool executions
    pub context: Option<ToolContext>,
    pub retry: Option<RetryConfig>,
    pub timeout: Option<TimeoutConfig>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
}

impl ChatOptions {
    #[must_use]
    pub fn think(mut self, think: bool) -> Self {
        self.think = Some(think);
        self
    }

    #[must_use]
    pub fn tool_attempts(mut self, attempts: u32) -> Self {
        self.tool_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn context(mut self, context: ToolContext) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Merge over client defaults
    pub fn resolve(self, defaults: &ResolvedOptions) -> ResolvedOptions {
        ResolvedOptions {
            think: self.think.unwrap_or(defaults.think),
            tool_attempts: self.tool_attempts.unwrap_or(defaults.tool_attempts),
            context: self.context.unwrap_or_else(|| defaults.context.clone()),
            retry: self.retry.unwrap_or_else(|| defaults.retry.clone()),
            timeout: self.timeout.unwrap_or_else(|| defaults.timeout.clone()),
            params: GenerationParams {
                temperature: self.temperature.or(defaults.params.temperature),
                max_tokens: self.max_tokens.or(defaults.params.max_tokens),
                stop: self.stop.or_else(|| defaults.params.stop.clone()),
            },
        }
    }
}

/// Fully merged options driving one conversation turn
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub think: bool,
    pub tool_attempts: u32,
    pub context: ToolContext,
    pub retry: RetryConfig,
    pub timeout: TimeoutConfig,
    pub params: GenerationParams,
}

impl Default for ResolvedOptions {
    fn default() -> Self {
        Self {
            think: false,
            tool_attempts: 5,
            context: ToolContext::empty(),
            retry: RetryConfig::default(),
            timeout: TimeoutConfig::default(),
            params: GenerationParams::default(),
        }
    }
}

/// Sampling parameters forwarded to the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Backend-facing request for one streamed round
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    pub think: bool,
    pub params: GenerationParams,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            think: false,
            params: GenerationParams::default(),
        }
    }

    /// Serialized size in bytes, used to pick the read deadline
    pub fn payload_size(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |body| body.len())
    }

    pub fn has_images(&self) -> bool {
        self.messages.iter().any(|message| !message.images.is_empty())
    }
}

/// Options for `embed`
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    /// Truncate inputs that exceed the model context instead of failing
    pub truncate: Option<bool>,
    /// Requested output dimensionality
    pub dimensions: Option<u32>,
    /// Overall deadline, defaults to the client read timeout
    pub timeout: Option<Duration>,
}
