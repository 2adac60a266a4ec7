//! Local model server backend (`/api/chat`, `/api/embed`)

use async_trait::async_trait;
use cadence_config::{DEFAULT_OLLAMA_URL, OllamaBackendConfig};
use reqwest::Client;
use url::Url;

use super::{Backend, BackendCapabilities, RawStream, check_status, http_client, ndjson_units};
use crate::{
    error::LlmError,
    normalize::{Normalizer, OllamaNormalizer},
    protocol::ollama::{OllamaChatRequest, OllamaEmbedRequest, OllamaEmbedResponse},
    timeout::TimeoutConfig,
    types::{ChatRequest, EmbedOptions},
};

/// Backend for a local model server streaming newline-delimited JSON
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    keep_alive: Option<String>,
}

impl OllamaBackend {
    pub fn new(config: &OllamaBackendConfig, timeout: &TimeoutConfig) -> Result<Self, LlmError> {
        let base_url = match &config.base_url {
            Some(url) => url.as_str().trim_end_matches('/').to_owned(),
            None => DEFAULT_OLLAMA_URL.to_owned(),
        };

        Ok(Self {
            client: http_client(timeout)?,
            base_url,
            keep_alive: config.keep_alive.clone(),
        })
    }

    /// Point at an explicit server URL
    pub fn with_base_url(base_url: &Url, timeout: &TimeoutConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            keep_alive: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::all()
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<RawStream, LlmError> {
        let wire_request = OllamaChatRequest::new(request, self.keep_alive.as_deref());

        let response = self.client.post(self.url("chat")).json(&wire_request).send().await.map_err(|e| {
            tracing::error!(backend = "ollama", error = %e, "stream request failed");
            LlmError::from(e)
        })?;
        let response = check_status("ollama", response).await?;

        Ok(ndjson_units(response.bytes_stream()))
    }

    fn normalizer(&self, request: &ChatRequest) -> Box<dyn Normalizer> {
        Box::new(OllamaNormalizer::new(request.model.clone()))
    }

    async fn embed(&self, model: &str, texts: &[String], options: &EmbedOptions) -> Result<Vec<Vec<f32>>, LlmError> {
        let wire_request = OllamaEmbedRequest {
            model,
            input: texts,
            truncate: options.truncate,
            dimensions: options.dimensions,
            keep_alive: self.keep_alive.as_deref(),
        };

        let response = self.client.post(self.url("embed")).json(&wire_request).send().await?;
        let response = check_status("ollama", response).await?;

        let body: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Streaming(format!("failed to parse embeddings response: {e}")))?;

        if body.embeddings.len() != texts.len() {
            return Err(LlmError::Streaming(format!(
                "expected {} embeddings, backend returned {}",
                texts.len(),
                body.embeddings.len()
            )));
        }

        Ok(body.embeddings)
    }
}
