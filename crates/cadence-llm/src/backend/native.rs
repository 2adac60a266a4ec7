//! In-process inference backend
//!
//! The engine is synchronous. Each stream runs its generation loop on the
//! blocking pool and hands outputs over a bounded channel, so a slow reader
//! holds the engine back instead of buffering without limit.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};

use super::{Backend, BackendCapabilities, RawStream};
use crate::{
    error::{Feature, LlmError},
    normalize::{EngineNormalizer, EngineOutput, Normalizer, RawUnit},
    types::{ChatRequest, EmbedOptions},
};

/// A loaded model that can run generations
pub trait InferenceEngine: Send + Sync {
    fn capabilities(&self) -> BackendCapabilities;

    /// Prepare a generation for `request`; may block while the prompt is processed
    fn start(&self, request: &ChatRequest) -> Result<Box<dyn EngineSession>, LlmError>;

    fn embed(&self, model: &str, _texts: &[String], _options: &EmbedOptions) -> Result<Vec<Vec<f32>>, LlmError> {
        Err(LlmError::FeatureNotSupported {
            feature: Feature::Embeddings,
            message: format!("engine for '{model}' has no embedding head"),
        })
    }
}

/// One running generation
pub trait EngineSession: Send {
    /// Block until the next output; `Ok(None)` once generation is over
    fn next_output(&mut self) -> Result<Option<EngineOutput>, LlmError>;
}

/// Backend driving an [`InferenceEngine`] on the blocking thread pool
pub struct NativeBackend {
    engine: Arc<dyn InferenceEngine>,
    channel_capacity: usize,
}

impl NativeBackend {
    pub fn new(engine: Arc<dyn InferenceEngine>, channel_capacity: usize) -> Self {
        Self {
            engine,
            channel_capacity: channel_capacity.max(1),
        }
    }
}

#[async_trait]
impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.engine.capabilities()
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<RawStream, LlmError> {
        let (started_tx, started_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let engine = Arc::clone(&self.engine);
        let request = request.clone();

        tokio::task::spawn_blocking(move || {
            let mut session = match engine.start(&request) {
                Ok(session) => session,
                Err(e) => {
                    let _ = started_tx.send(Err(e));
                    return;
                }
            };

            // Caller gave up while the prompt was processed
            if started_tx.send(Ok(())).is_err() {
                return;
            }

            loop {
                let item = match session.next_output() {
                    Ok(Some(output)) => Ok(RawUnit::Engine(output)),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = item.is_err();

                if tx.blocking_send(item).is_err() {
                    tracing::debug!(model = %request.model, "stream dropped, stopping generation");
                    break;
                }
                if failed {
                    break;
                }
            }
        });

        started_rx
            .await
            .map_err(|_| LlmError::Internal(anyhow::anyhow!("inference worker exited before starting")))??;

        let units = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });

        Ok(Box::pin(units))
    }

    fn normalizer(&self, request: &ChatRequest) -> Box<dyn Normalizer> {
        Box::new(EngineNormalizer::new(request.model.clone()))
    }

    async fn embed(&self, model: &str, texts: &[String], options: &EmbedOptions) -> Result<Vec<Vec<f32>>, LlmError> {
        let engine = Arc::clone(&self.engine);
        let model = model.to_owned();
        let texts = texts.to_vec();
        let options = options.clone();

        tokio::task::spawn_blocking(move || engine.embed(&model, &texts, &options))
            .await
            .map_err(|e| LlmError::Internal(anyhow::anyhow!("embedding worker failed: {e}")))?
    }
}
