//! OpenAI-compatible chat-completions backend

use async_trait::async_trait;
use cadence_config::{DEFAULT_OPENAI_URL, OpenAiBackendConfig};
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{Backend, BackendCapabilities, RawStream, check_status, http_client};
use crate::{
    error::LlmError,
    normalize::{Normalizer, OpenAiNormalizer, RawUnit},
    protocol::openai::{OpenAiEmbeddingRequest, OpenAiEmbeddingResponse, OpenAiRequest},
    timeout::TimeoutConfig,
    types::{ChatRequest, EmbedOptions},
};

/// Cloud backend speaking the chat-completions SSE protocol
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OpenAiBackend {
    pub fn new(config: &OpenAiBackendConfig, timeout: &TimeoutConfig) -> Result<Self, LlmError> {
        let base_url = match &config.base_url {
            Some(url) => url.as_str().trim_end_matches('/').to_owned(),
            None => DEFAULT_OPENAI_URL.to_owned(),
        };

        Ok(Self {
            client: http_client(timeout)?,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Point at an explicit base URL, used by tests and embedders
    pub fn with_base_url(base_url: &Url, api_key: Option<SecretString>, timeout: &TimeoutConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            api_key,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let builder = self.client.post(format!("{}/{path}", self.base_url));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            thinking: false,
            ..BackendCapabilities::all()
        }
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<RawStream, LlmError> {
        let wire_request = OpenAiRequest::from(request);

        let response = self.post("chat/completions").json(&wire_request).send().await.map_err(|e| {
            tracing::error!(backend = "openai", error = %e, "stream request failed");
            LlmError::from(e)
        })?;
        let response = check_status("openai", response).await?;

        let units = response.bytes_stream().eventsource().map(|result| match result {
            Ok(event) => Ok(RawUnit::Text(event.data)),
            Err(EventStreamError::Transport(e)) => Err(LlmError::from(e)),
            Err(e) => Err(LlmError::Streaming(e.to_string())),
        });

        Ok(Box::pin(units))
    }

    fn normalizer(&self, request: &ChatRequest) -> Box<dyn Normalizer> {
        Box::new(OpenAiNormalizer::new(request.model.clone()))
    }

    async fn embed(&self, model: &str, texts: &[String], options: &EmbedOptions) -> Result<Vec<Vec<f32>>, LlmError> {
        let wire_request = OpenAiEmbeddingRequest {
            model,
            input: texts,
            dimensions: options.dimensions,
        };

        let response = self.post("embeddings").json(&wire_request).send().await?;
        let response = check_status("openai", response).await?;

        let mut body: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Streaming(format!("failed to parse embeddings response: {e}")))?;

        body.data.sort_by_key(|embedding| embedding.index);
        if body.data.len() != texts.len() {
            return Err(LlmError::Streaming(format!(
                "expected {} embeddings, backend returned {}",
                texts.len(),
                body.data.len()
            )));
        }

        Ok(body.data.into_iter().map(|embedding| embedding.embedding).collect())
    }
}
