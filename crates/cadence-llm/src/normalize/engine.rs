use super::{NormalizeError, Normalizer, RawUnit};
use crate::types::{Chunk, ChunkMessage, FinishReason, Role, ToolCallDelta, Usage};

/// One step of in-process generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    /// Decoded content text
    Token(String),
    /// Decoded reasoning text
    Thinking(String),
    /// A complete tool call parsed by the engine's chat template
    ToolCall { name: String, arguments: String },
    /// Generation ended
    Finished { finish_reason: FinishReason, usage: Usage },
}

/// Normalizer for [`EngineOutput`] units
#[derive(Debug)]
pub struct EngineNormalizer {
    model: String,
    called_tools: bool,
    done: bool,
}

impl EngineNormalizer {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            called_tools: false,
            done: false,
        }
    }
}

impl Normalizer for EngineNormalizer {
    fn normalize(&mut self, unit: RawUnit) -> Result<Option<Chunk>, NormalizeError> {
        if self.done {
            return Ok(None);
        }

        let RawUnit::Engine(output) = unit else {
            return Err(NormalizeError::UnexpectedUnit("text"));
        };

        let chunk = match output {
            EngineOutput::Token(text) if text.is_empty() => return Ok(None),
            EngineOutput::Thinking(text) if text.is_empty() => return Ok(None),
            EngineOutput::Token(text) => Chunk::delta(self.model.clone(), ChunkMessage::content(text)),
            EngineOutput::Thinking(text) => Chunk::delta(self.model.clone(), ChunkMessage::thinking(text)),
            EngineOutput::ToolCall { name, arguments } => {
                self.called_tools = true;
                // Ids must stay unique across every round of a conversation
                let delta = ToolCallDelta {
                    id: Some(format!("call_{}", uuid::Uuid::new_v4().simple())),
                    name: Some(name),
                    arguments: Some(arguments),
                };
                Chunk::delta(
                    self.model.clone(),
                    ChunkMessage {
                        role: Some(Role::Assistant),
                        tool_calls: vec![delta],
                        ..ChunkMessage::default()
                    },
                )
            }
            EngineOutput::Finished { finish_reason, usage } => {
                self.done = true;
                let finish_reason = match finish_reason {
                    FinishReason::Stop if self.called_tools => FinishReason::ToolCalls,
                    other => other,
                };
                Chunk::terminal(self.model.clone(), finish_reason, Some(usage))
            }
        };

        Ok(Some(chunk))
    }

    fn finish(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(Chunk::terminal(self.model.clone(), FinishReason::Stop, None))
    }
}
