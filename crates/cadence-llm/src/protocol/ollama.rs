//! Local model server (`/api/chat`, `/api/embed`) wire format types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ChatRequest, Message, ToolDefinition};

// -- Request types --

#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<OllamaTool>,
    pub stream: bool,
    /// Only sent when thinking was requested; older servers reject the field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub think: Option<bool>,
    #[serde(skip_serializing_if = "OllamaOptions::is_empty")]
    pub options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaMessage {
    pub role: &'static str,
    pub content: String,
    /// Base64 payloads
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OllamaToolCallOut>,
    /// Name of the tool whose result this message carries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaToolCallOut {
    pub function: OllamaFunctionOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaFunctionOut {
    pub name: String,
    /// Arguments as a JSON object, not a string
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaTool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: OllamaToolFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl OllamaOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none() && self.stop.is_none()
    }
}

// -- Streaming types --

/// One NDJSON line of a streamed `/api/chat` response
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatChunk {
    #[serde(default)]
    pub model: Option<String>,
    /// RFC 3339 timestamp
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub message: Option<OllamaChunkMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
    /// Set instead of everything else when the server fails mid-stream
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaChunkMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<OllamaToolCallIn>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaToolCallIn {
    #[serde(default)]
    pub id: Option<String>,
    pub function: OllamaFunctionIn,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaFunctionIn {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

// -- Embedding types --

#[derive(Debug, Clone, Serialize)]
pub struct OllamaEmbedRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaEmbedResponse {
    pub embeddings: Vec<Vec<f32>>,
}

// -- Conversions --

impl OllamaChatRequest {
    pub fn new(request: &ChatRequest, keep_alive: Option<&str>) -> Self {
        // Tool results are matched to the call by name on this wire format
        let tool_names: HashMap<&str, &str> = request
            .messages
            .iter()
            .flat_map(|message| &message.tool_calls)
            .map(|call| (call.id.as_str(), call.function.name.as_str()))
            .collect();

        Self {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|message| OllamaMessage::new(message, &tool_names))
                .collect(),
            tools: request.tools.iter().map(Into::into).collect(),
            stream: true,
            think: request.think.then_some(true),
            options: OllamaOptions {
                temperature: request.params.temperature,
                num_predict: request.params.max_tokens,
                stop: request.params.stop.clone(),
            },
            keep_alive: keep_alive.map(str::to_owned),
        }
    }
}

impl OllamaMessage {
    fn new(message: &Message, tool_names: &HashMap<&str, &str>) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.text().to_owned(),
            images: message.images.iter().map(|image| strip_data_uri(image).to_owned()).collect(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| OllamaToolCallOut {
                    function: OllamaFunctionOut {
                        name: call.function.name.clone(),
                        arguments: call.function.parsed_arguments().unwrap_or_default(),
                    },
                })
                .collect(),
            tool_name: message
                .tool_call_id
                .as_deref()
                .and_then(|id| tool_names.get(id))
                .map(|name| (*name).to_owned()),
        }
    }
}

impl From<&ToolDefinition> for OllamaTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: OllamaToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.json_schema(),
            },
        }
    }
}

/// The server takes raw base64, so drop any `data:...;base64,` prefix
fn strip_data_uri(image: &str) -> &str {
    match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image,
    }
}
