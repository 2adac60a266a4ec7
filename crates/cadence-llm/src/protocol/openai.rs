//! `OpenAI` chat completion API wire format types

use serde::{Deserialize, Serialize};

use crate::types::{ChatRequest, Message, Role, ToolCall, ToolDefinition};

// -- Request types --

/// `OpenAI` chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub stream: bool,
    /// Ask for a trailing usage chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<OpenAiStreamOptions>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<OpenAiTool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiStreamOptions {
    pub include_usage: bool,
}

/// `OpenAI` message within a request
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<OpenAiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OpenAiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Plain string, or parts when images are attached
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiImageUrl {
    /// Image URL or base64 data URI
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiTool {
    /// Always "function"
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: OpenAiFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiFunction {
    pub name: String,
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

// -- Streaming types --

/// `OpenAI` streaming chunk
///
/// Compatible servers omit fields freely, so everything but `choices` is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamChunk {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
    /// Present on the trailing chunk when `stream_options.include_usage` is set
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
    /// Mid-stream failure reported by the server
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: OpenAiStreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning text (DeepSeek, vLLM)
    #[serde(default)]
    pub reasoning_content: Option<String>,
    /// Reasoning text (OpenRouter and others)
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<OpenAiStreamToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamToolCall {
    #[serde(default)]
    pub index: u32,
    /// First fragment only
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAiStreamFunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamFunctionCall {
    #[serde(default)]
    pub name: Option<String>,
    /// Incremental arguments fragment
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// -- Embedding types --

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiEmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEmbeddingResponse {
    pub data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEmbedding {
    pub index: usize,
    pub embedding: Vec<f32>,
}

// -- Conversions --

impl From<&ChatRequest> for OpenAiRequest {
    fn from(req: &ChatRequest) -> Self {
        Self {
            model: req.model.clone(),
            messages: req.messages.iter().map(Into::into).collect(),
            temperature: req.params.temperature,
            max_tokens: req.params.max_tokens,
            stop: req.params.stop.clone(),
            stream: true,
            stream_options: Some(OpenAiStreamOptions { include_usage: true }),
            tools: req.tools.iter().map(Into::into).collect(),
        }
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let content = if msg.images.is_empty() {
            msg.content.clone().map(OpenAiContent::Text)
        } else {
            let text = msg.content.iter().map(|text| OpenAiContentPart::Text { text: text.clone() });
            let images = msg.images.iter().map(|image| OpenAiContentPart::ImageUrl {
                image_url: OpenAiImageUrl { url: image_url(image) },
            });
            Some(OpenAiContent::Parts(text.chain(images).collect()))
        };

        Self {
            role: msg.role.as_str(),
            // Assistant turns that only carry tool calls send null content
            content: content.filter(|_| !(msg.role == Role::Assistant && msg.text().is_empty())),
            tool_calls: msg.tool_calls.iter().map(Into::into).collect(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<&ToolCall> for OpenAiToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            tool_type: "function",
            function: OpenAiFunctionCall {
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            },
        }
    }
}

impl From<&ToolDefinition> for OpenAiTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: OpenAiFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.json_schema(),
            },
        }
    }
}

/// URLs and data URIs pass through, bare base64 becomes a data URI
fn image_url(image: &str) -> String {
    if image.starts_with("http://") || image.starts_with("https://") || image.starts_with("data:") {
        image.to_owned()
    } else {
        format!("data:image/png;base64,{image}")
    }
}
