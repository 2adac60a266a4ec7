//! Client facade: `stream_chat`, `chat_response`, `embed`

use std::sync::Arc;

use cadence_cache::{ResponseCache, compute_cache_key, is_cacheable};
use cadence_config::Config;
use cadence_ratelimit::RateLimiter;
use futures_util::StreamExt;
use serde::Serialize;

use crate::{
    aggregate::ResponseAggregator,
    backend::{self, Backend, InferenceEngine},
    controller::{ToolSet, TurnStream, run_turn},
    error::{Feature, LlmError},
    pipeline::RequestPipeline,
    retry::{RetryConfig, with_retry},
    timeout::{TimeoutConfig, with_deadline},
    types::{ChatOptions, ChatRequest, ChatResponse, EmbedOptions, GenerationParams, Message, ResolvedOptions, Tool},
};

/// Default bound on the message history of one call
pub const DEFAULT_MAX_MESSAGES: usize = 1024;

/// Entry point for conversation turns and embeddings
///
/// Cheap to clone; clones share the backend, rate limiter and cache.
#[derive(Clone)]
pub struct LlmClient {
    pipeline: Arc<RequestPipeline>,
    cache: Option<Arc<ResponseCache<ChatResponse>>>,
    defaults: ResolvedOptions,
    max_messages: usize,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("backend", &self.pipeline.backend().name())
            .field("rate_limited", &self.pipeline.rate_limiter().is_enabled())
            .field("cached", &self.cache.is_some())
            .field("max_messages", &self.max_messages)
            .finish_non_exhaustive()
    }
}

/// Builder for [`LlmClient`]
pub struct LlmClientBuilder {
    backend: Arc<dyn Backend>,
    rate_limiter: RateLimiter,
    cache: Option<Arc<ResponseCache<ChatResponse>>>,
    defaults: ResolvedOptions,
    max_messages: usize,
}

impl LlmClientBuilder {
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.defaults.retry = retry;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.defaults.timeout = timeout;
        self
    }

    #[must_use]
    pub fn rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<ResponseCache<ChatResponse>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Tool rounds allowed per turn unless a call overrides it
    #[must_use]
    pub const fn tool_attempts(mut self, attempts: u32) -> Self {
        self.defaults.tool_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Generation parameters used when a call sets none
    #[must_use]
    pub fn params(mut self, params: GenerationParams) -> Self {
        self.defaults.params = params;
        self
    }

    pub fn build(self) -> LlmClient {
        LlmClient {
            pipeline: Arc::new(RequestPipeline::new(self.backend, self.rate_limiter)),
            cache: self.cache,
            defaults: self.defaults,
            max_messages: self.max_messages,
        }
    }
}

/// Fields that determine a cached response
#[derive(Serialize)]
struct CacheKey<'a> {
    model: &'a str,
    messages: &'a [Message],
    think: bool,
    params: &'a GenerationParams,
    tools: Vec<&'a str>,
    tool_attempts: u32,
}

impl LlmClient {
    pub fn builder(backend: Arc<dyn Backend>) -> LlmClientBuilder {
        LlmClientBuilder {
            backend,
            rate_limiter: RateLimiter::disabled(),
            cache: None,
            defaults: ResolvedOptions::default(),
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }

    /// Build a client for one of the HTTP backends
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::build_from_config(config, None)
    }

    /// Build a client, handing `engine` to a native backend
    pub fn from_config_with_engine(config: &Config, engine: Arc<dyn InferenceEngine>) -> anyhow::Result<Self> {
        Self::build_from_config(config, Some(engine))
    }

    fn build_from_config(config: &Config, engine: Option<Arc<dyn InferenceEngine>>) -> anyhow::Result<Self> {
        let retry = RetryConfig::try_from(&config.retry)?;
        let timeout = TimeoutConfig::try_from(&config.timeout)?;
        let backend = backend::from_config(&config.backend, &timeout, engine)?;
        let rate_limiter = RateLimiter::from_config(&config.rate_limit)?;

        let mut builder = Self::builder(backend)
            .retry(retry)
            .timeout(timeout)
            .rate_limiter(rate_limiter)
            .tool_attempts(config.tools.attempts)
            .max_messages(config.limits.max_messages);

        if let Some(cache) = ResponseCache::from_config(&config.cache)? {
            builder = builder.cache(Arc::new(cache));
        }

        Ok(builder.build())
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        self.pipeline.backend()
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache<ChatResponse>>> {
        self.cache.as_ref()
    }

    /// Stream one conversation turn
    ///
    /// Validation happens here, before anything is sent. Tool calls the
    /// model makes are executed and fed back until it answers or the
    /// attempt budget runs out; the stream ends with one terminal chunk or
    /// one error.
    pub fn stream_chat(
        &self,
        model: &str,
        messages: Vec<Message>,
        tools: Vec<Arc<dyn Tool>>,
        options: ChatOptions,
    ) -> Result<TurnStream, LlmError> {
        let (request, tools, options) = self.prepare(model, messages, tools, options)?;
        Ok(run_turn(self.pipeline.clone(), request, tools, options))
    }

    /// Run one conversation turn to completion
    pub async fn chat_response(
        &self,
        model: &str,
        messages: Vec<Message>,
        tools: Vec<Arc<dyn Tool>>,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let (request, tools, options) = self.prepare(model, messages, tools, options)?;

        let cache = self.cache.as_ref().filter(|_| is_cacheable(options.params.temperature));
        let key = cache.map(|_| {
            compute_cache_key(&CacheKey {
                model: &request.model,
                messages: &request.messages,
                think: request.think,
                params: &request.params,
                tools: tools.names().collect(),
                tool_attempts: options.tool_attempts,
            })
        });

        if let (Some(cache), Some(key)) = (cache, &key)
            && let Some(response) = cache.get(key)
        {
            tracing::debug!(model = %request.model, "response cache hit");
            return Ok(response);
        }

        let mut turn = run_turn(self.pipeline.clone(), request, tools, options);
        let mut aggregator = ResponseAggregator::new();
        while let Some(chunk) = turn.next().await {
            aggregator.push(&chunk?);
        }
        let response = aggregator.finish_turn(&turn);

        // Only answers that did not depend on tool output are reusable
        if let (Some(cache), Some(key)) = (cache, key)
            && response.rounds == 1
            && response.tool_calls.is_empty()
        {
            cache.put_default(key, response.clone());
        }

        Ok(response)
    }

    /// Embed `texts` with `model`, one vector per input
    pub async fn embed(&self, model: &str, texts: &[String], options: EmbedOptions) -> Result<Vec<Vec<f32>>, LlmError> {
        if model.trim().is_empty() {
            return Err(LlmError::Validation("model name must not be empty".to_owned()));
        }
        if texts.is_empty() {
            return Err(LlmError::Validation("at least one text is required".to_owned()));
        }

        let backend = self.pipeline.backend();
        if !backend.capabilities().embeddings {
            return Err(LlmError::FeatureNotSupported {
                feature: Feature::Embeddings,
                message: format!("backend '{}' cannot embed", backend.name()),
            });
        }

        self.pipeline.rate_limiter().acquire().await;

        let deadline = options.timeout.unwrap_or(self.defaults.timeout.read);
        let options = &options;
        with_retry(&self.defaults.retry, "embed", |attempt| async move {
            tracing::debug!(backend = backend.name(), model, attempt, inputs = texts.len(), "issuing embed request");
            with_deadline(deadline, backend.embed(model, texts, options)).await
        })
        .await
    }

    fn prepare(
        &self,
        model: &str,
        messages: Vec<Message>,
        tools: Vec<Arc<dyn Tool>>,
        options: ChatOptions,
    ) -> Result<(ChatRequest, ToolSet, ResolvedOptions), LlmError> {
        if model.trim().is_empty() {
            return Err(LlmError::Validation("model name must not be empty".to_owned()));
        }
        if messages.is_empty() {
            return Err(LlmError::Validation("at least one message is required".to_owned()));
        }
        if messages.len() > self.max_messages {
            return Err(LlmError::Validation(format!(
                "{} messages exceed the limit of {}",
                messages.len(),
                self.max_messages
            )));
        }
        for message in &messages {
            message.validate()?;
        }

        let tools = ToolSet::new(tools)?;
        let options = options.resolve(&self.defaults);

        let request = ChatRequest {
            model: model.to_owned(),
            messages,
            tools: tools.definitions(),
            think: options.think,
            params: options.params.clone(),
        };

        Ok((request, tools, options))
    }
}
