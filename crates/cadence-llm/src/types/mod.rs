//! Canonical types shared by every backend
//!
//! Wire formats convert to and from these; the orchestration core never sees
//! a vendor shape.

pub mod chunk;
pub mod message;
pub mod options;
pub mod response;
pub mod tool;

pub use chunk::{Chunk, ChunkMessage, FinishReason, ToolCallDelta, Usage};
pub use message::{FunctionCall, Message, Role, ToolCall};
pub use options::{ChatOptions, ChatRequest, EmbedOptions, GenerationParams, ResolvedOptions};
pub use response::ChatResponse;
pub use tool::{ParameterKind, Tool, ToolContext, ToolDefinition, ToolParameter};

/// Current time as unix seconds
pub(crate) fn unix_now() -> i64 {
    jiff::Timestamp::now().as_second()
}
