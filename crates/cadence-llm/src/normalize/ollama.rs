use super::{NormalizeError, Normalizer, RawUnit};
use crate::{
    protocol::ollama::OllamaChatChunk,
    types::{Chunk, ChunkMessage, FinishReason, Role, ToolCallDelta, Usage},
};

/// Normalizer for `/api/chat` NDJSON lines
///
/// Tool calls arrive whole, with object arguments and usually no id, so each
/// one is re-encoded as a single opening fragment with a fresh `call_` id.
#[derive(Debug)]
pub struct OllamaNormalizer {
    model: String,
    saw_tool_calls: bool,
    done: bool,
}

impl OllamaNormalizer {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            saw_tool_calls: false,
            done: false,
        }
    }

    fn finish_reason(&self, done_reason: Option<&str>) -> FinishReason {
        match done_reason.map(FinishReason::from) {
            // The server reports "stop" even when the turn ended in tool calls
            Some(FinishReason::Stop) | None if self.saw_tool_calls => FinishReason::ToolCalls,
            Some(reason) => reason,
            None => FinishReason::Stop,
        }
    }
}

impl Normalizer for OllamaNormalizer {
    fn normalize(&mut self, unit: RawUnit) -> Result<Option<Chunk>, NormalizeError> {
        if self.done {
            return Ok(None);
        }

        let RawUnit::Text(line) = unit else {
            return Err(NormalizeError::UnexpectedUnit("engine"));
        };

        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let raw: OllamaChatChunk = serde_json::from_str(line).map_err(|e| NormalizeError::Malformed(e.to_string()))?;

        if let Some(error) = raw.error {
            return Err(NormalizeError::Backend(error));
        }

        if let Some(model) = raw.model.filter(|model| !model.is_empty()) {
            self.model = model;
        }

        let message = raw.message.unwrap_or_default();
        let tool_calls: Vec<ToolCallDelta> = message
            .tool_calls
            .into_iter()
            .map(|call| ToolCallDelta {
                id: Some(
                    call.id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                ),
                name: Some(call.function.name),
                arguments: Some(match call.function.arguments {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(encoded) => encoded,
                    arguments => arguments.to_string(),
                }),
            })
            .collect();
        self.saw_tool_calls |= !tool_calls.is_empty();

        let fragment = ChunkMessage {
            role: Some(Role::Assistant),
            content: Some(message.content).filter(|content| !content.is_empty()),
            thinking: message.thinking.filter(|thinking| !thinking.is_empty()),
            tool_calls,
        };

        let mut chunk = if raw.done {
            self.done = true;
            let usage = match (raw.prompt_eval_count, raw.eval_count) {
                (None, None) => None,
                (prompt, eval) => Some(Usage::new(prompt.unwrap_or(0), eval.unwrap_or(0))),
            };
            let mut terminal = Chunk::terminal(self.model.clone(), self.finish_reason(raw.done_reason.as_deref()), usage);
            terminal.message = (!fragment.is_empty()).then_some(fragment);
            terminal
        } else if fragment.is_empty() {
            return Ok(None);
        } else {
            Chunk::delta(self.model.clone(), fragment)
        };

        if let Some(created) = raw
            .created_at
            .as_deref()
            .and_then(|ts| ts.parse::<jiff::Timestamp>().ok())
        {
            chunk.created_at = created.as_second();
        }

        Ok(Some(chunk))
    }

    fn finish(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(Chunk::terminal(self.model.clone(), self.finish_reason(None), None))
    }
}
