use super::{NormalizeError, Normalizer, RawUnit};
use crate::{
    protocol::openai::OpenAiStreamChunk,
    types::{Chunk, ChunkMessage, FinishReason, Role, ToolCallDelta, Usage},
};

/// Normalizer for `chat.completion.chunk` SSE payloads
///
/// The finish reason and usage arrive on separate chunks before `[DONE]`,
/// so both are held until the terminal chunk is emitted.
#[derive(Debug)]
pub struct OpenAiNormalizer {
    model: String,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    done: bool,
}

impl OpenAiNormalizer {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            finish_reason: None,
            usage: None,
            done: false,
        }
    }

    fn terminal(&mut self) -> Chunk {
        self.done = true;
        Chunk::terminal(
            self.model.clone(),
            self.finish_reason.take().unwrap_or(FinishReason::Stop),
            self.usage.take(),
        )
    }
}

impl Normalizer for OpenAiNormalizer {
    fn normalize(&mut self, unit: RawUnit) -> Result<Option<Chunk>, NormalizeError> {
        if self.done {
            return Ok(None);
        }

        let RawUnit::Text(data) = unit else {
            return Err(NormalizeError::UnexpectedUnit("engine"));
        };

        let data = data.trim();
        if data.is_empty() {
            return Ok(None);
        }
        if data == "[DONE]" {
            return Ok(Some(self.terminal()));
        }

        let chunk: OpenAiStreamChunk =
            serde_json::from_str(data).map_err(|e| NormalizeError::Malformed(e.to_string()))?;

        if let Some(error) = chunk.error {
            let message = error.get("message").and_then(|m| m.as_str()).map_or_else(|| error.to_string(), str::to_owned);
            return Err(NormalizeError::Backend(message));
        }

        if let Some(model) = chunk.model.filter(|model| !model.is_empty()) {
            self.model = model;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        let created = chunk.created.filter(|created| *created > 0);

        // Only the first choice is surfaced
        let Some(choice) = chunk.choices.into_iter().find(|choice| choice.index == 0) else {
            return Ok(None);
        };

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(FinishReason::from(reason));
        }

        let delta = choice.delta;
        let message = ChunkMessage {
            role: Some(Role::Assistant),
            content: delta.content,
            thinking: delta.reasoning_content.or(delta.reasoning),
            tool_calls: delta
                .tool_calls
                .into_iter()
                .map(|call| {
                    let (name, arguments) = call
                        .function
                        .map(|function| (function.name, function.arguments))
                        .unwrap_or_default();
                    ToolCallDelta {
                        id: call.id.filter(|id| !id.is_empty()),
                        name,
                        arguments,
                    }
                })
                .collect(),
        };

        if message.is_empty() {
            return Ok(None);
        }

        let mut chunk = Chunk::delta(self.model.clone(), message);
        if let Some(created) = created {
            chunk.created_at = created;
        }
        Ok(Some(chunk))
    }

    fn finish(&mut self) -> Option<Chunk> {
        (!self.done).then(|| self.terminal())
    }
}
