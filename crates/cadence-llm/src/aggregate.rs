//! Folds a chunk stream into one [`ChatResponse`]
//!
//! Tool calls are not rebuilt from deltas here: rounds may reuse call ids,
//! so the turn that executed them hands them over at the end.

use crate::{
    controller::TurnStream,
    types::{ChatResponse, Chunk, FinishReason, ToolCall, Usage},
};

#[derive(Debug, Default)]
pub struct ResponseAggregator {
    model: String,
    content: String,
    thinking: String,
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &Chunk) {
        if self.model.is_empty() || chunk.done {
            chunk.model.clone_into(&mut self.model);
        }
        if let Some(content) = chunk.content() {
            self.content.push_str(content);
        }
        if let Some(thinking) = chunk.thinking() {
            self.thinking.push_str(thinking);
        }

        if chunk.done {
            self.finish_reason.clone_from(&chunk.finish_reason);
            if let Some(usage) = chunk.usage {
                self.usage = usage;
            }
        }
    }

    /// Complete the response of a drained turn
    pub fn finish_turn(self, turn: &TurnStream) -> ChatResponse {
        self.finish(turn.rounds(), turn.tool_calls())
    }

    pub fn finish(self, rounds: u32, tool_calls: Vec<ToolCall>) -> ChatResponse {
        ChatResponse {
            model: self.model,
            content: self.content,
            thinking: (!self.thinking.is_empty()).then_some(self.thinking),
            tool_calls,
            finish_reason: self.finish_reason,
            usage: self.usage,
            rounds,
        }
    }
}
