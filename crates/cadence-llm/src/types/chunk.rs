use serde::{Deserialize, Serialize};

use super::message::Role;

/// One incremental unit of a streamed response, identical across backends
///
/// Once a chunk with `done = true` has been produced for a stream, no further
/// chunks follow it. Token counts and the finish reason only appear on that
/// terminal chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Model that produced the chunk
    pub model: String,
    /// Unix seconds
    pub created_at: i64,
    /// Terminal flag
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChunkMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Chunk {
    /// Non-terminal chunk carrying a message fragment
    pub fn delta(model: impl Into<String>, message: ChunkMessage) -> Self {
        Self {
            model: model.into(),
            created_at: super::unix_now(),
            done: false,
            message: Some(message),
            finish_reason: None,
            usage: None,
        }
    }

    /// Terminal chunk
    pub fn terminal(model: impl Into<String>, finish_reason: FinishReason, usage: Option<Usage>) -> Self {
        Self {
            model: model.into(),
            created_at: super::unix_now(),
            done: true,
            message: None,
            finish_reason: Some(finish_reason),
            usage,
        }
    }

    /// Content delta, if any
    pub fn content(&self) -> Option<&str> {
        self.message.as_ref()?.content.as_deref()
    }

    /// Thinking delta, if any
    pub fn thinking(&self) -> Option<&str> {
        self.message.as_ref()?.thinking.as_deref()
    }

    /// Tool-call fragments carried by this chunk
    pub fn tool_call_deltas(&self) -> &[ToolCallDelta] {
        self.message.as_ref().map(|message| message.tool_calls.as_slice()).unwrap_or_default()
    }
}

/// Message fragment embedded in a chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Content delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

impl ChunkMessage {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Assistant),
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Assistant),
            thinking: Some(text.into()),
            ..Self::default()
        }
    }

    /// Whether the fragment carries nothing a caller could observe
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
            && self.thinking.as_deref().is_none_or(str::is_empty)
            && self.tool_calls.is_empty()
    }
}

/// Streaming form of a tool call
///
/// An absent `id` marks a continuation of the most recently opened call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name, last write wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument fragment, concatenated in arrival order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Reason the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the token limit
    Length,
    /// Model requested tool calls
    ToolCalls,
    /// Content was filtered by safety systems
    ContentFilter,
    /// Vendor-specific reason
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
            Self::Other(reason) => reason,
        }
    }
}

impl From<&str> for FinishReason {
    fn from(s: &str) -> Self {
        match s {
            "stop" | "end_turn" | "eos" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for FinishReason {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<FinishReason> for String {
    fn from(reason: FinishReason) -> Self {
        match reason {
            FinishReason::Other(reason) => reason,
            known => known.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
}

impl Usage {
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub const fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    /// Add another round's counts
    pub const fn accumulate(&mut self, other: &Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
    }
}
