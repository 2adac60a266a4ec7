//! Tool execution loop
//!
//! Drives one conversation turn as an explicit state machine: stream a
//! round, run the tools it asked for, feed the results back, and repeat
//! until the model stops asking or the attempt budget is spent.

use std::{
    pin::Pin,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
    task::{Context, Poll},
};

use futures_util::{Stream, StreamExt, stream};
use indexmap::IndexMap;

use crate::{
    accumulator::ToolCallAccumulator,
    error::{LlmError, ToolError},
    normalize::ChunkStream,
    pipeline::StreamSource,
    types::{Chunk, ChatRequest, FinishReason, Message, ResolvedOptions, Tool, ToolCall, ToolContext, ToolDefinition, Usage},
};

// -- Tool set --

/// Tools offered to the model for one turn, looked up by name
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

impl ToolSet {
    /// Rejects two tools with the same name
    pub fn new(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self, LlmError> {
        let mut set = IndexMap::new();
        for tool in tools {
            let name = tool.definition().name.clone();
            if name.is_empty() {
                return Err(LlmError::Validation("tool name must not be empty".to_owned()));
            }
            if set.insert(name.clone(), tool).is_some() {
                return Err(LlmError::Validation(format!("duplicate tool name '{name}'")));
            }
        }
        Ok(Self { tools: set })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition().clone()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

// -- Turn stream --

/// Chunk stream of one logical turn, spanning every tool round
pub struct TurnStream {
    inner: ChunkStream,
    rounds: Arc<AtomicU32>,
    tool_calls: Arc<Mutex<Vec<ToolCall>>>,
}

impl TurnStream {
    /// Requests issued so far
    pub fn rounds(&self) -> u32 {
        self.rounds.load(Ordering::Acquire)
    }

    /// Every tool call executed so far, in execution order across rounds
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Stream for TurnStream {
    type Item = Result<Chunk, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

// -- State machine --

enum Phase {
    /// Issue the next request with the current history
    Continuing,
    Streaming(ChunkStream),
    /// Round ended with complete tool calls
    ToolsRequested { calls: Vec<ToolCall>, model: String },
    Done,
}

struct Round {
    accumulator: ToolCallAccumulator,
    content: String,
}

impl Round {
    fn new() -> Self {
        Self {
            accumulator: ToolCallAccumulator::new(),
            content: String::new(),
        }
    }

    fn observe(&mut self, chunk: &Chunk) {
        if let Some(content) = chunk.content() {
            self.content.push_str(content);
        }
        self.accumulator.extend(chunk.tool_call_deltas());
    }
}

struct TurnState {
    source: Arc<dyn StreamSource>,
    tools: ToolSet,
    request: ChatRequest,
    options: ResolvedOptions,
    /// Tool rounds still allowed after the current one
    remaining: u32,
    usage: Usage,
    round: Round,
    rounds: Arc<AtomicU32>,
    executed: Arc<Mutex<Vec<ToolCall>>>,
    phase: Phase,
}

/// Start a turn
///
/// Non-terminal chunks of every round are forwarded as they arrive. The
/// caller sees a single terminal chunk whose usage is summed across rounds.
/// At most `options.tool_attempts + 1` requests are issued.
pub fn run_turn(source: Arc<dyn StreamSource>, request: ChatRequest, tools: ToolSet, options: ResolvedOptions) -> TurnStream {
    let rounds = Arc::new(AtomicU32::new(0));
    let tool_calls = Arc::new(Mutex::new(Vec::new()));

    let state = TurnState {
        source,
        tools,
        request,
        remaining: options.tool_attempts,
        options,
        usage: Usage::default(),
        round: Round::new(),
        rounds: Arc::clone(&rounds),
        executed: Arc::clone(&tool_calls),
        phase: Phase::Continuing,
    };

    TurnStream {
        inner: Box::pin(stream::unfold(state, step)),
        rounds,
        tool_calls,
    }
}

async fn step(mut state: TurnState) -> Option<(Result<Chunk, LlmError>, TurnState)> {
    loop {
        match std::mem::replace(&mut state.phase, Phase::Done) {
            Phase::Done => return None,

            Phase::Continuing => {
                let round = state.rounds.fetch_add(1, Ordering::AcqRel) + 1;
                tracing::debug!(model = %state.request.model, round, remaining = state.remaining, "starting round");

                match state.source.open(&state.request, &state.options).await {
                    Ok(chunks) => state.phase = Phase::Streaming(chunks),
                    Err(e) => return Some((Err(e), state)),
                }
            }

            Phase::Streaming(mut chunks) => match chunks.next().await {
                Some(Ok(chunk)) if !chunk.done => {
                    state.round.observe(&chunk);
                    state.phase = Phase::Streaming(chunks);
                    return Some((Ok(chunk), state));
                }
                Some(Ok(terminal)) => {
                    if let Some(chunk) = state.end_round(terminal) {
                        return Some((Ok(chunk), state));
                    }
                }
                Some(Err(e)) => return Some((Err(e), state)),
                None => {
                    return Some((
                        Err(LlmError::Streaming("stream ended before a terminal chunk".to_owned())),
                        state,
                    ));
                }
            },

            Phase::ToolsRequested { calls, model } => {
                if let Err(e) = state.execute(calls).await {
                    return Some((Err(e), state));
                }

                if state.remaining == 0 {
                    tracing::warn!(model = %model, rounds = state.rounds.load(Ordering::Acquire), "tool attempt budget exhausted");
                    let terminal = Chunk::terminal(model, FinishReason::ToolCalls, Some(state.usage));
                    return Some((Ok(terminal), state));
                }

                state.remaining -= 1;
                state.phase = Phase::Continuing;
            }
        }
    }
}

impl TurnState {
    /// Fold a round's terminal chunk; returns the chunk to forward, if any
    fn end_round(&mut self, mut terminal: Chunk) -> Option<Chunk> {
        self.round.observe(&terminal);
        if let Some(usage) = &terminal.usage {
            self.usage.accumulate(usage);
        }

        let calls = self.round.accumulator.finish();
        if calls.is_empty() {
            terminal.usage = Some(self.usage);
            return Some(terminal);
        }

        if terminal.finish_reason != Some(FinishReason::ToolCalls) {
            tracing::debug!(finish_reason = ?terminal.finish_reason, "tool calls present, treating round as tool round");
        }

        // The terminal may still carry a fragment; hand it over as a delta
        let fragment = terminal.message.take().filter(|message| !message.is_empty());
        self.phase = Phase::ToolsRequested {
            calls,
            model: terminal.model.clone(),
        };

        fragment.map(|message| Chunk::delta(terminal.model, message))
    }

    /// Run each call in opening order, extending the history
    async fn execute(&mut self, calls: Vec<ToolCall>) -> Result<(), LlmError> {
        let content = std::mem::take(&mut self.round.content);
        self.round = Round::new();

        self.request
            .messages
            .push(Message::assistant_with_tool_calls(Some(content), calls.clone()));
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(calls.iter().cloned());

        for call in calls {
            let result = execute_tool(&self.tools, &call, &self.options.context).await?;
            self.request.messages.push(Message::tool(call.id, result));
        }

        Ok(())
    }
}

async fn execute_tool(tools: &ToolSet, call: &ToolCall, context: &ToolContext) -> Result<String, LlmError> {
    let name = &call.function.name;
    let tool = tools.get(name).cloned().ok_or_else(|| {
        tracing::error!(tool = %name, id = %call.id, "model requested unknown tool");
        LlmError::ToolNotFound { name: name.clone() }
    })?;

    let arguments = call.function.parsed_arguments().map_err(|e| LlmError::ToolExecution {
        name: name.clone(),
        source: ToolError::InvalidArguments(e.to_string()),
    })?;

    tracing::info!(tool = %name, id = %call.id, "executing tool");

    // Spawned so an execution that has started finishes even if the caller stops reading
    let context = context.clone();
    let handle = tokio::spawn(async move { tool.execute(arguments, &context).await });

    match handle.await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => {
            tracing::error!(tool = %name, id = %call.id, error = %source, "tool failed");
            Err(LlmError::ToolExecution {
                name: name.clone(),
                source,
            })
        }
        Err(e) => Err(LlmError::ToolExecution {
            name: name.clone(),
            source: ToolError::Failed(format!("tool task aborted: {e}")),
        }),
    }
}
