//! Mock model server for integration tests
//!
//! Speaks both the chat-completions SSE format (`/v1/...`) and the local
//! server NDJSON format (`/api/...`) with predictable replies

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const DEFAULT_REPLY: &str = "Hello from mock LLM";
const CREATED: u64 = 1_700_000_000;

/// Tool call the mock asks for when the request offers tools
#[derive(Debug, Clone)]
pub struct ScriptedToolCall {
    pub name: String,
    pub arguments: String,
}

/// Mock backend with predictable responses
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    chat_count: AtomicU32,
    embedding_count: AtomicU32,
    /// Requests to fail before succeeding
    fail_count: AtomicU32,
    fail_status: StatusCode,
    /// Custom reply content
    response_content: Option<String>,
    tool_call: Option<ScriptedToolCall>,
    /// Ask for the tool again even after a tool result
    always_call_tools: bool,
    /// Delay before the first body frame, headers go out immediately
    first_chunk_delay: Option<Duration>,
    /// Chat request bodies in arrival order
    requests: Mutex<Vec<Value>>,
}

/// Configures a [`MockLlm`] before starting it
#[derive(Default)]
pub struct MockLlmBuilder {
    fail_count: u32,
    fail_status: Option<StatusCode>,
    response_content: Option<String>,
    tool_call: Option<ScriptedToolCall>,
    always_call_tools: bool,
    first_chunk_delay: Option<Duration>,
}

impl MockLlmBuilder {
    /// Fail the first `n` requests with `status`
    pub fn fail_first(mut self, n: u32, status: StatusCode) -> Self {
        self.fail_count = n;
        self.fail_status = Some(status);
        self
    }

    pub fn respond_with(mut self, content: &str) -> Self {
        self.response_content = Some(content.to_owned());
        self
    }

    pub fn tool_call(mut self, name: &str, arguments: &str) -> Self {
        self.tool_call = Some(ScriptedToolCall {
            name: name.to_owned(),
            arguments: arguments.to_owned(),
        });
        self
    }

    pub fn always_call_tools(mut self) -> Self {
        self.always_call_tools = true;
        self
    }

    pub fn first_chunk_delay(mut self, delay: Duration) -> Self {
        self.first_chunk_delay = Some(delay);
        self
    }

    pub async fn start(self) -> anyhow::Result<MockLlm> {
        let state = Arc::new(MockLlmState {
            chat_count: AtomicU32::new(0),
            embedding_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(self.fail_count),
            fail_status: self.fail_status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            response_content: self.response_content,
            tool_call: self.tool_call,
            always_call_tools: self.always_call_tools,
            first_chunk_delay: self.first_chunk_delay,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/embeddings", routing::post(handle_embeddings))
            .route("/api/chat", routing::post(handle_local_chat))
            .route("/api/embed", routing::post(handle_local_embed))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(MockLlm { addr, shutdown, state })
    }
}

impl MockLlm {
    pub fn builder() -> MockLlmBuilder {
        MockLlmBuilder::default()
    }

    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    /// Start a mock server that fails the first `n` requests with 500
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::builder().fail_first(n, StatusCode::INTERNAL_SERVER_ERROR).start().await
    }

    /// Start a mock server with a custom response content
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::builder().respond_with(content).start().await
    }

    /// Base URL for the chat-completions backend, including `/v1`
    pub fn openai_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for the local server backend
    pub fn ollama_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Chat requests received, failed ones included
    pub fn chat_count(&self) -> u32 {
        self.state.chat_count.load(Ordering::Relaxed)
    }

    pub fn embedding_count(&self) -> u32 {
        self.state.embedding_count.load(Ordering::Relaxed)
    }

    /// Bodies of the chat requests that were answered
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Request types --

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    tools: Vec<Value>,
    #[serde(default)]
    think: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

// -- Stream chunk types (chat-completions format) --

#[derive(Debug, Serialize)]
struct StreamChunk {
    id: &'static str,
    object: &'static str,
    created: u64,
    model: String,
    choices: Vec<StreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
}

#[derive(Debug, Serialize)]
struct StreamChoice {
    index: u32,
    delta: StreamDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Default, Serialize)]
struct StreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Serialize)]
struct StreamToolCall {
    index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "type")]
    tool_type: Option<&'static str>,
    function: StreamFunctionCall,
}

#[derive(Debug, Serialize)]
struct StreamFunctionCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    arguments: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

const USAGE: Usage = Usage {
    prompt_tokens: 10,
    completion_tokens: 5,
    total_tokens: 15,
};

// -- Reply selection --

enum Reply {
    Text(String),
    Tool(ScriptedToolCall),
}

impl MockLlmState {
    /// Count the request and decide whether it fails
    fn admit(&self) -> Option<Response> {
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining == 0 {
            return None;
        }
        self.fail_count.fetch_sub(1, Ordering::Relaxed);

        let body = Json(json!({
            "error": {
                "message": "mock server intentional failure",
                "type": "server_error"
            }
        }));
        Some((self.fail_status, body).into_response())
    }

    fn reply(&self, req: &ChatRequest) -> Reply {
        let last = req.messages.last();
        let last_role = last.and_then(|m| m["role"].as_str()).unwrap_or_default();

        if let Some(call) = &self.tool_call
            && !req.tools.is_empty()
            && (self.always_call_tools || last_role != "tool")
        {
            return Reply::Tool(call.clone());
        }

        if last_role == "tool" {
            let result = last.map(message_text).unwrap_or_default();
            return Reply::Text(format!("The result is {result}."));
        }

        let asked = last.map(message_text).unwrap_or_default();
        if asked.contains("What is my name?") {
            let name = req
                .messages
                .iter()
                .filter(|m| m["role"] == "user")
                .find_map(|m| message_text(m).strip_prefix("My name is ").map(|rest| rest.trim_end_matches('.').to_owned()));
            return Reply::Text(match name {
                Some(name) => format!("Your name is {name}."),
                None => "I do not know your name.".to_owned(),
            });
        }

        Reply::Text(self.response_content.clone().unwrap_or_else(|| DEFAULT_REPLY.to_owned()))
    }

    fn record(&self, body: &Value) {
        self.requests.lock().unwrap().push(body.clone());
    }

    /// Stream `frames`, holding back the first one if configured
    fn streaming_body(&self, content_type: &'static str, frames: Vec<String>) -> Response {
        let delay = self.first_chunk_delay;
        let body = stream::iter(frames.into_iter().enumerate()).then(move |(i, frame)| async move {
            if i == 0
                && let Some(delay) = delay
            {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, Infallible>(frame)
        });

        (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], Body::from_stream(body)).into_response()
    }
}

/// Text content of a wire message, either a string or a list of parts
fn message_text(message: &Value) -> String {
    match &message["content"] {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts.iter().filter_map(|part| part["text"].as_str()).collect(),
        _ => String::new(),
    }
}

// -- Handlers --

async fn handle_chat_completions(State(state): State<Arc<MockLlmState>>, Json(body): Json<Value>) -> Response {
    state.chat_count.fetch_add(1, Ordering::Relaxed);
    if let Some(failure) = state.admit() {
        return failure;
    }

    let Ok(req) = serde_json::from_value::<ChatRequest>(body.clone()) else {
        return (StatusCode::BAD_REQUEST, "malformed request").into_response();
    };
    state.record(&body);

    let frames = match state.reply(&req) {
        Reply::Text(content) => sse_text_frames(&req.model, &content),
        Reply::Tool(call) => sse_tool_frames(&req.model, &call),
    };

    state.streaming_body("text/event-stream", frames)
}

fn sse_frame(chunk: &StreamChunk) -> String {
    format!("data: {}\n\n", serde_json::to_string(chunk).unwrap())
}

fn chunk(model: &str, delta: StreamDelta, finish_reason: Option<&'static str>) -> StreamChunk {
    StreamChunk {
        id: "chatcmpl-test-stream",
        object: "chat.completion.chunk",
        created: CREATED,
        model: model.to_owned(),
        choices: vec![StreamChoice {
            index: 0,
            delta,
            finish_reason,
        }],
        usage: None,
    }
}

fn sse_trailer(model: &str, frames: &mut Vec<String>) {
    // Usage arrives in a trailing choice-less chunk
    frames.push(sse_frame(&StreamChunk {
        id: "chatcmpl-test-stream",
        object: "chat.completion.chunk",
        created: CREATED,
        model: model.to_owned(),
        choices: Vec::new(),
        usage: Some(USAGE),
    }));
    frames.push("data: [DONE]\n\n".to_owned());
}

fn sse_text_frames(model: &str, content: &str) -> Vec<String> {
    let mut frames = vec![sse_frame(&chunk(
        model,
        StreamDelta {
            role: Some("assistant"),
            content: Some(String::new()),
            ..StreamDelta::default()
        },
        None,
    ))];

    for word in content.split_inclusive(' ') {
        frames.push(sse_frame(&chunk(
            model,
            StreamDelta {
                content: Some(word.to_owned()),
                ..StreamDelta::default()
            },
            None,
        )));
    }

    frames.push(sse_frame(&chunk(model, StreamDelta::default(), Some("stop"))));
    sse_trailer(model, &mut frames);
    frames
}

/// Opening fragment carries id and name, the arguments follow in two id-less pieces
fn sse_tool_frames(model: &str, call: &ScriptedToolCall) -> Vec<String> {
    let split = call.arguments.len() / 2;
    let (head, tail) = call.arguments.split_at(split);

    let fragment = |id: Option<String>, name: Option<String>, arguments: &str| StreamDelta {
        role: id.as_ref().map(|_| "assistant"),
        tool_calls: Some(vec![StreamToolCall {
            index: 0,
            tool_type: id.as_ref().map(|_| "function"),
            id,
            function: StreamFunctionCall {
                name,
                arguments: arguments.to_owned(),
            },
        }]),
        ..StreamDelta::default()
    };

    let mut frames = vec![
        sse_frame(&chunk(model, fragment(Some("call_test_stream".to_owned()), Some(call.name.clone()), ""), None)),
        sse_frame(&chunk(model, fragment(None, None, head), None)),
        sse_frame(&chunk(model, fragment(None, None, tail), None)),
        sse_frame(&chunk(model, StreamDelta::default(), Some("tool_calls"))),
    ];
    sse_trailer(model, &mut frames);
    frames
}

async fn handle_local_chat(State(state): State<Arc<MockLlmState>>, Json(body): Json<Value>) -> Response {
    state.chat_count.fetch_add(1, Ordering::Relaxed);
    if let Some(failure) = state.admit() {
        return failure;
    }

    let Ok(req) = serde_json::from_value::<ChatRequest>(body.clone()) else {
        return (StatusCode::BAD_REQUEST, "malformed request").into_response();
    };
    state.record(&body);

    let line = |message: Value, done: bool| {
        let mut object = json!({
            "model": req.model,
            "created_at": "2024-07-22T20:33:28.123648Z",
            "message": message,
            "done": done,
        });
        if done {
            object["done_reason"] = json!("stop");
            object["prompt_eval_count"] = json!(USAGE.prompt_tokens);
            object["eval_count"] = json!(USAGE.completion_tokens);
        }
        format!("{object}\n")
    };

    let mut frames = Vec::new();
    if req.think == Some(true) {
        frames.push(line(json!({"role": "assistant", "content": "", "thinking": "Let me think."}), false));
    }

    match state.reply(&req) {
        Reply::Text(content) => {
            for word in content.split_inclusive(' ') {
                frames.push(line(json!({"role": "assistant", "content": word}), false));
            }
        }
        Reply::Tool(call) => {
            let arguments: Value = serde_json::from_str(&call.arguments).unwrap();
            frames.push(line(
                json!({
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{"function": {"name": call.name, "arguments": arguments}}]
                }),
                false,
            ));
        }
    }
    frames.push(line(json!({"role": "assistant", "content": ""}), true));

    state.streaming_body("application/x-ndjson", frames)
}

/// Vector for input `index`: its length, its position, and a constant
fn embedding_for(index: usize, text: &str) -> Vec<f32> {
    #[allow(clippy::cast_precision_loss)]
    vec![text.len() as f32, index as f32, 0.5]
}

async fn handle_embeddings(State(state): State<Arc<MockLlmState>>, Json(req): Json<EmbeddingRequest>) -> Response {
    state.embedding_count.fetch_add(1, Ordering::Relaxed);
    if let Some(failure) = state.admit() {
        return failure;
    }

    // Out of order on purpose; clients sort by index
    let data: Vec<Value> = req
        .input
        .iter()
        .enumerate()
        .rev()
        .map(|(index, text)| json!({"object": "embedding", "index": index, "embedding": embedding_for(index, text)}))
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
        "model": req.model,
        "usage": {"prompt_tokens": 8, "total_tokens": 8}
    }))
    .into_response()
}

async fn handle_local_embed(State(state): State<Arc<MockLlmState>>, Json(req): Json<EmbeddingRequest>) -> Response {
    state.embedding_count.fetch_add(1, Ordering::Relaxed);
    if let Some(failure) = state.admit() {
        return failure;
    }

    let embeddings: Vec<Vec<f32>> = req
        .input
        .iter()
        .enumerate()
        .map(|(index, text)| embedding_for(index, text))
        .collect();

    Json(json!({"model": req.model, "embeddings": embeddings})).into_response()
}
