//! Chunk normalizers
//!
//! Each backend's decoded transport units (SSE `data:` payloads, NDJSON
//! lines, engine outputs) become canonical [`Chunk`]s here. Malformed units
//! are dropped with a warning instead of ending the stream.

mod engine;
mod ollama;
mod openai;

use std::pin::Pin;

use futures_util::{Stream, StreamExt, stream};
use thiserror::Error;

pub use engine::{EngineNormalizer, EngineOutput};
pub use ollama::OllamaNormalizer;
pub use openai::OpenAiNormalizer;

use crate::{backend::RawStream, error::LlmError, types::Chunk};

/// Stream of canonical chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk, LlmError>> + Send>>;

/// One decoded unit from a backend transport, framing already stripped
#[derive(Debug, Clone, PartialEq)]
pub enum RawUnit {
    /// SSE `data:` payload or one NDJSON line
    Text(String),
    /// Output of the in-process engine
    Engine(EngineOutput),
}

/// Why a unit produced no chunk
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Unit could not be parsed; skipped
    #[error("malformed unit: {0}")]
    Malformed(String),

    /// Unit kind this normalizer does not handle; skipped
    #[error("unexpected {0} unit")]
    UnexpectedUnit(&'static str),

    /// Backend reported an error inside the stream; ends it
    #[error("{0}")]
    Backend(String),
}

/// Per-stream translation from raw units to canonical chunks
///
/// Normalizers are stateful. After emitting a terminal chunk they return
/// `Ok(None)` for every further unit.
pub trait Normalizer: Send {
    fn normalize(&mut self, unit: RawUnit) -> Result<Option<Chunk>, NormalizeError>;

    /// Called when the transport ends; synthesizes the terminal chunk if none was emitted
    fn finish(&mut self) -> Option<Chunk>;
}

struct NormalizeState {
    backend: String,
    raw: RawStream,
    normalizer: Box<dyn Normalizer>,
    dropped: u64,
    done: bool,
}

/// Adapt a raw unit stream into a canonical chunk stream
///
/// Ends right after the first terminal chunk; transport errors are
/// forwarded once and end the stream too.
pub fn normalize_stream(backend: &str, raw: RawStream, normalizer: Box<dyn Normalizer>) -> ChunkStream {
    let state = NormalizeState {
        backend: backend.to_owned(),
        raw,
        normalizer,
        dropped: 0,
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        loop {
            let Some(item) = state.raw.next().await else {
                state.done = true;
                let terminal = state.normalizer.finish()?;
                return Some((Ok(terminal), state));
            };

            let unit = match item {
                Ok(unit) => unit,
                Err(e) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
            };

            match state.normalizer.normalize(unit) {
                Ok(Some(chunk)) => {
                    state.done = chunk.done;
                    return Some((Ok(chunk), state));
                }
                Ok(None) => {}
                Err(NormalizeError::Backend(message)) => {
                    tracing::error!(backend = %state.backend, error = %message, "backend reported stream error");
                    state.done = true;
                    return Some((Err(LlmError::Streaming(message)), state));
                }
                Err(e) => {
                    state.dropped += 1;
                    tracing::warn!(
                        backend = %state.backend,
                        dropped = state.dropped,
                        error = %e,
                        "dropping unparseable stream unit"
                    );
                }
            }
        }
    }))
}
