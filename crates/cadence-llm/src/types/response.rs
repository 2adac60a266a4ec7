use serde::{Deserialize, Serialize};

use super::{FinishReason, Message, ToolCall, Usage};

/// Aggregate of one drained conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    /// Concatenated content across every round
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Tool calls the model requested during the turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    /// Token counts summed across rounds
    pub usage: Usage,
    /// Requests issued to the backend for this turn
    pub rounds: u32,
}

impl ChatResponse {
    /// Assistant message to append to the history for the next turn
    ///
    /// `None` when the turn produced no content, since an empty assistant
    /// message would fail validation on the next request.
    pub fn to_message(&self) -> Option<Message> {
        (!self.content.is_empty()).then(|| Message::assistant(self.content.clone()))
    }
}
