use std::fmt;

use thiserror::Error;

use crate::retry::RetryConfig;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Request rejected before anything was sent
    #[error("invalid request: {0}")]
    Validation(String),

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Connect, header or stream read deadline expired
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection or network failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Model or backend lacks a capability the request needs
    #[error("{feature} not supported: {message}")]
    FeatureNotSupported { feature: Feature, message: String },

    /// Model asked for a tool the caller did not supply
    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    /// A tool failed while executing
    #[error("tool '{name}' failed: {source}")]
    ToolExecution {
        name: String,
        #[source]
        source: ToolError,
    },

    /// Stream broke after it was established
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether the retry engine should issue the request again
    ///
    /// API errors are retried only for statuses in the configured set;
    /// timeouts and transport failures always are.
    pub fn is_retryable(&self, config: &RetryConfig) -> bool {
        match self {
            Self::Api { status, .. } => config.is_retryable_status(*status),
            Self::Timeout(_) | Self::Transport(_) => true,
            _ => false,
        }
    }

    /// Classify a non-success backend response
    ///
    /// Bodies that say the model cannot handle tools, thinking or images
    /// become [`LlmError::FeatureNotSupported`] so callers can degrade.
    pub fn from_api_response(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let lowered = body.to_lowercase();

        let feature = if lowered.contains("does not support tools") || lowered.contains("tools are not supported") {
            Some(Feature::Tools)
        } else if lowered.contains("does not support thinking") || lowered.contains("thinking is not supported") {
            Some(Feature::Thinking)
        } else if lowered.contains("does not support images")
            || lowered.contains("does not support vision")
            || lowered.contains("image input is not supported")
        {
            Some(Feature::Vision)
        } else if lowered.contains("does not support embeddings") {
            Some(Feature::Embeddings)
        } else {
            None
        };

        match feature {
            Some(feature) => Self::FeatureNotSupported { feature, message: body },
            None => Self::Api { status, body },
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            Self::Transport(e.to_string())
        } else if e.is_decode() || e.is_body() {
            Self::Streaming(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Optional model capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Thinking,
    Tools,
    Vision,
    Embeddings,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Thinking => "thinking",
            Self::Tools => "tools",
            Self::Vision => "vision",
            Self::Embeddings => "embeddings",
        })
    }
}

/// Failure reported by a tool implementation
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments did not match the tool's schema
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}
