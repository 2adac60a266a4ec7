use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Model backend selection
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// OpenAI-compatible chat-completions API (SSE streaming)
    Openai(OpenAiBackendConfig),
    /// Local model server (`/api/chat` NDJSON streaming)
    Ollama(OllamaBackendConfig),
    /// In-process inference engine
    Native(NativeBackendConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Ollama(OllamaBackendConfig::default())
    }
}

impl BackendConfig {
    /// Short backend name used in logs
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Openai(_) => "openai",
            Self::Ollama(_) => "ollama",
            Self::Native(_) => "native",
        }
    }

    /// Model used when a call does not name one
    pub fn default_model(&self) -> Option<&str> {
        match self {
            Self::Openai(config) => config.default_model.as_deref(),
            Self::Ollama(config) => config.default_model.as_deref(),
            Self::Native(config) => Some(config.model.as_str()),
        }
    }
}

/// Cloud chat-completions backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiBackendConfig {
    /// API base URL including the version segment, defaults to [`DEFAULT_OPENAI_URL`]
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Bearer token
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub default_model: Option<String>,
}

/// Local model server backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OllamaBackendConfig {
    /// Server URL, defaults to [`DEFAULT_OLLAMA_URL`]
    #[serde(default)]
    pub base_url: Option<Url>,
    #[serde(default)]
    pub default_model: Option<String>,
    /// How long the server keeps the model loaded (e.g. "5m")
    #[serde(default)]
    pub keep_alive: Option<String>,
}

/// In-process engine backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NativeBackendConfig {
    /// Model identifier reported on every chunk
    pub model: String,
    /// Bound on buffered engine outputs between the worker thread and the stream
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_channel_capacity() -> usize {
    32
}
