//! Tool-call accumulator
//!
//! Rebuilds complete tool calls from streamed fragments. A fragment with an
//! id opens (or reopens) that call; a fragment without one continues the
//! most recently opened call.

use indexmap::IndexMap;

use crate::types::{ToolCall, ToolCallDelta};

#[derive(Debug, Default)]
struct PendingCall {
    name: String,
    arguments: String,
}

/// Collects [`ToolCallDelta`]s across one streamed round
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: IndexMap<String, PendingCall>,
    last_opened: Option<String>,
    discarded: usize,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment in
    pub fn push(&mut self, delta: &ToolCallDelta) {
        match delta.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => {
                // A repeated id starts that call over
                let call = PendingCall {
                    name: delta.name.clone().unwrap_or_default(),
                    arguments: delta.arguments.clone().unwrap_or_default(),
                };
                self.calls.insert(id.to_owned(), call);
                self.last_opened = Some(id.to_owned());
            }
            None => {
                let Some(call) = self.last_opened.as_ref().and_then(|id| self.calls.get_mut(id)) else {
                    self.discarded += 1;
                    tracing::warn!(discarded = self.discarded, "tool call fragment without an open call, discarding");
                    return;
                };

                if let Some(name) = delta.name.as_deref().filter(|name| !name.is_empty()) {
                    name.clone_into(&mut call.name);
                }
                if let Some(arguments) = &delta.arguments {
                    call.arguments.push_str(arguments);
                }
            }
        }
    }

    pub fn extend<'a>(&mut self, deltas: impl IntoIterator<Item = &'a ToolCallDelta>) {
        for delta in deltas {
            self.push(delta);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls in first-opened order, leaving the accumulator empty
    ///
    /// Empty arguments become `{}`. Calls without a name or with arguments
    /// that are not valid JSON are dropped with a warning.
    pub fn finish(&mut self) -> Vec<ToolCall> {
        self.last_opened = None;

        self.calls
            .drain(..)
            .filter_map(|(id, call)| {
                if call.name.is_empty() {
                    tracing::warn!(id = %id, "dropping tool call without a name");
                    return None;
                }

                let arguments = if call.arguments.trim().is_empty() {
                    "{}".to_owned()
                } else {
                    call.arguments
                };

                if let Err(e) = serde_json::from_str::<serde_json::Value>(&arguments) {
                    tracing::warn!(id = %id, tool = %call.name, error = %e, "dropping tool call with invalid arguments");
                    return None;
                }

                Some(ToolCall::new(id, call.name, arguments))
            })
            .collect()
    }
}
