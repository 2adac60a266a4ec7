//! Request issuance
//!
//! One streamed request passes admission control, then the retry engine,
//! with the connect and read deadlines applied to every attempt.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_ratelimit::RateLimiter;

use crate::{
    backend::Backend,
    error::LlmError,
    normalize::{ChunkStream, normalize_stream},
    retry::with_retry,
    timeout::{with_deadline, with_read_deadline},
    types::{ChatRequest, ResolvedOptions},
};

/// Issues one streamed request and yields canonical chunks
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn open(&self, request: &ChatRequest, options: &ResolvedOptions) -> Result<ChunkStream, LlmError>;
}

/// [`StreamSource`] backed by a [`Backend`]
pub struct RequestPipeline {
    backend: Arc<dyn Backend>,
    rate_limiter: RateLimiter,
}

impl RequestPipeline {
    pub const fn new(backend: Arc<dyn Backend>, rate_limiter: RateLimiter) -> Self {
        Self { backend, rate_limiter }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub const fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

#[async_trait]
impl StreamSource for RequestPipeline {
    async fn open(&self, request: &ChatRequest, options: &ResolvedOptions) -> Result<ChunkStream, LlmError> {
        let backend = &self.backend;
        backend.capabilities().check(request)?;

        // One token per issued request; retries of it do not take another
        self.rate_limiter.acquire().await;

        let deadline = options.timeout.timeout_for(request.payload_size());

        let raw = with_retry(&options.retry, "stream_chat", |attempt| async move {
            tracing::debug!(
                backend = backend.name(),
                model = %request.model,
                attempt,
                messages = request.messages.len(),
                "issuing streamed request"
            );
            with_deadline(deadline, backend.open_stream(request)).await
        })
        .await?;

        let raw = with_read_deadline(raw, deadline);
        Ok(normalize_stream(backend.name(), raw, backend.normalizer(request)))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use futures_util::{StreamExt, stream};

    use super::*;
    use crate::{
        backend::{BackendCapabilities, RawStream},
        error::Feature,
        normalize::{Normalizer, OllamaNormalizer, RawUnit},
        retry::RetryConfig,
        types::{EmbedOptions, Message},
    };

    /// Fails `failures` times with a 500, then streams one NDJSON reply
    struct FlakyBackend {
        failures: u32,
        calls: AtomicU32,
        stall: bool,
    }

    impl FlakyBackend {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                stall: false,
            }
        }
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities {
                thinking: false,
                ..BackendCapabilities::all()
            }
        }

        async fn open_stream(&self, _request: &ChatRequest) -> Result<RawStream, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(LlmError::Api {
                    status: 500,
                    body: "boom".to_owned(),
                });
            }

            if self.stall {
                return Ok(Box::pin(stream::pending::<Result<RawUnit, LlmError>>()));
            }

            let lines = [
                r#"{"model":"m","message":{"role":"assistant","content":"hi"},"done":false}"#,
                r#"{"model":"m","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","prompt_eval_count":1,"eval_count":1}"#,
            ];
            Ok(Box::pin(stream::iter(
                lines.map(|line| Ok(RawUnit::Text(line.to_owned()))),
            )))
        }

        fn normalizer(&self, request: &ChatRequest) -> Box<dyn Normalizer> {
            Box::new(OllamaNormalizer::new(request.model.clone()))
        }

        async fn embed(&self, _model: &str, _texts: &[String], _options: &EmbedOptions) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(Vec::new())
        }
    }

    fn options(max_attempts: u32) -> ResolvedOptions {
        ResolvedOptions {
            retry: RetryConfig {
                max_attempts,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
                retryable_status_codes: vec![500],
                ..RetryConfig::default()
            },
            ..ResolvedOptions::default()
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::new("m", vec![Message::user("hi")])
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_streams() {
        let backend = Arc::new(FlakyBackend::new(2));
        let pipeline = RequestPipeline::new(backend.clone(), RateLimiter::disabled());

        let chunks: Vec<_> = pipeline.open(&request(), &options(3)).await.unwrap().collect().await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].as_ref().unwrap().done);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_last_error() {
        let backend = Arc::new(FlakyBackend::new(u32::MAX));
        let pipeline = RequestPipeline::new(backend.clone(), RateLimiter::disabled());

        let err = pipeline.open(&request(), &options(2)).await.err().unwrap();

        assert!(matches!(err, LlmError::Api { status: 500, .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unsupported_feature_fails_before_issuing() {
        let backend = Arc::new(FlakyBackend::new(0));
        let pipeline = RequestPipeline::new(backend.clone(), RateLimiter::disabled());

        let mut request = request();
        request.think = true;
        let err = pipeline.open(&request, &options(3)).await.err().unwrap();

        assert!(matches!(err, LlmError::FeatureNotSupported { feature: Feature::Thinking, .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let backend = Arc::new(FlakyBackend {
            stall: true,
            ..FlakyBackend::new(0)
        });
        let pipeline = RequestPipeline::new(backend, RateLimiter::disabled());

        let mut stream = pipeline.open(&request(), &options(0)).await.unwrap();
        let err = stream.next().await.unwrap().unwrap_err();

        assert!(matches!(err, LlmError::Timeout(_)));
        assert!(stream.next().await.is_none());
    }
}
