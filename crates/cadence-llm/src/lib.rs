//! Streaming orchestration core
//!
//! Normalizes the streamed output of several model backends into one chunk
//! shape, rebuilds tool calls from their fragments and runs the tool
//! execution loop. Request issuance goes through retry, timeout and
//! rate-limit policies.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod accumulator;
pub mod aggregate;
pub mod backend;
mod client;
pub mod controller;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod protocol;
pub mod retry;
pub mod timeout;
pub mod types;

pub use accumulator::ToolCallAccumulator;
pub use aggregate::ResponseAggregator;
pub use backend::{
    Backend, BackendCapabilities, EngineSession, InferenceEngine, NativeBackend, OllamaBackend, OpenAiBackend, RawStream,
};
pub use client::{DEFAULT_MAX_MESSAGES, LlmClient, LlmClientBuilder};
pub use controller::{ToolSet, TurnStream, run_turn};
pub use error::{Feature, LlmError, ToolError};
pub use normalize::{ChunkStream, EngineOutput, Normalizer, RawUnit};
pub use pipeline::{RequestPipeline, StreamSource};
pub use retry::{RetryConfig, with_retry};
pub use timeout::TimeoutConfig;
pub use types::*;
