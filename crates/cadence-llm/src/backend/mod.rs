//! Model backends
//!
//! A backend opens one streamed request and hands back raw transport units;
//! the matching [`Normalizer`] turns them into canonical chunks.

mod native;
mod ollama;
mod openai;

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use cadence_config::BackendConfig;
use futures_util::{Stream, StreamExt, stream};
use reqwest::{Client, Response};

pub use native::{EngineSession, InferenceEngine, NativeBackend};
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::{
    error::{Feature, LlmError},
    normalize::{Normalizer, RawUnit},
    timeout::TimeoutConfig,
    types::{ChatRequest, EmbedOptions},
};

/// Stream of raw transport units
pub type RawStream = Pin<Box<dyn Stream<Item = Result<RawUnit, LlmError>> + Send>>;

/// Optional features a backend can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct BackendCapabilities {
    pub thinking: bool,
    pub tools: bool,
    pub vision: bool,
    pub embeddings: bool,
}

impl BackendCapabilities {
    pub const fn all() -> Self {
        Self {
            thinking: true,
            tools: true,
            vision: true,
            embeddings: true,
        }
    }

    /// Reject a request that needs something this backend cannot do
    pub fn check(&self, request: &ChatRequest) -> Result<(), LlmError> {
        if request.think && !self.thinking {
            return Err(unsupported(Feature::Thinking, &request.model));
        }
        if !request.tools.is_empty() && !self.tools {
            return Err(unsupported(Feature::Tools, &request.model));
        }
        if request.has_images() && !self.vision {
            return Err(unsupported(Feature::Vision, &request.model));
        }
        Ok(())
    }
}

fn unsupported(feature: Feature, model: &str) -> LlmError {
    LlmError::FeatureNotSupported {
        feature,
        message: format!("backend cannot serve {feature} for model '{model}'"),
    }
}

/// Trait implemented by each model backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Issue one streamed request
    ///
    /// Resolves once the backend has accepted the request; units then
    /// arrive on the returned stream.
    async fn open_stream(&self, request: &ChatRequest) -> Result<RawStream, LlmError>;

    /// Fresh normalizer for one stream opened with `request`
    fn normalizer(&self, request: &ChatRequest) -> Box<dyn Normalizer>;

    /// Embed `texts`, one vector per input in input order
    async fn embed(&self, model: &str, texts: &[String], options: &EmbedOptions) -> Result<Vec<Vec<f32>>, LlmError>;
}

/// Build the configured backend
///
/// The native backend needs an engine; the HTTP backends ignore it.
pub fn from_config(
    config: &BackendConfig,
    timeout: &TimeoutConfig,
    engine: Option<Arc<dyn InferenceEngine>>,
) -> Result<Arc<dyn Backend>, LlmError> {
    let backend: Arc<dyn Backend> = match config {
        BackendConfig::Openai(config) => Arc::new(OpenAiBackend::new(config, timeout)?),
        BackendConfig::Ollama(config) => Arc::new(OllamaBackend::new(config, timeout)?),
        BackendConfig::Native(config) => {
            let engine = engine.ok_or_else(|| {
                LlmError::Validation("native backend configured but no inference engine supplied".to_owned())
            })?;
            Arc::new(NativeBackend::new(engine, config.channel_capacity))
        }
    };

    tracing::info!(backend = backend.name(), "backend initialised");
    Ok(backend)
}

// -- HTTP helpers --

/// Client shared by every request of one HTTP backend
fn http_client(timeout: &TimeoutConfig) -> Result<Client, LlmError> {
    Client::builder()
        .connect_timeout(timeout.connect)
        .build()
        .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))
}

/// Pass a success response through, classify anything else
async fn check_status(backend: &str, response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(backend, status = %status, error = %e, "failed to read error body");
            String::new()
        }
    };
    tracing::warn!(backend, status = %status, "backend returned error");
    Err(LlmError::from_api_response(status.as_u16(), body))
}

struct LineState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    ended: bool,
}

/// Split a byte stream into newline-delimited text units
///
/// Blank lines are skipped; a trailing line without a newline is still
/// emitted when the body ends.
fn ndjson_units<S, B>(bytes: S) -> RawStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]>,
{
    let state = LineState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        ended: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line).trim().to_owned();
                if text.is_empty() {
                    continue;
                }
                return Some((Ok(RawUnit::Text(text)), state));
            }

            if state.ended {
                let text = String::from_utf8_lossy(&state.buffer).trim().to_owned();
                state.buffer.clear();
                return (!text.is_empty()).then(|| (Ok(RawUnit::Text(text)), state));
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    state.ended = true;
                    state.buffer.clear();
                    return Some((Err(e.into()), state));
                }
                None => state.ended = true,
            }
        }
    }))
}
