use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted during LLM streaming (provider-agnostic).
///
/// Both adapters decode their wire format into this alphabet; the
/// orchestrator consumes it without knowing which provider produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A chunk of assistant text.
    #[serde(rename = "content_delta")]
    ContentDelta { text: String },

    /// A tool call has started.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted { id: String, name: String },

    /// Incremental tool call argument JSON.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { id: String, delta: String },

    /// A tool call is complete with fully-assembled arguments.
    #[serde(rename = "tool_call_completed")]
    ToolCallCompleted {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done { reason: Option<String> },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// One update in the stream returned by the service facade / orchestrator.
///
/// Partial updates carry deltas as they arrive; the terminal update has
/// `done = true` and, on failure, `error` populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_delta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<crate::tool::ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<crate::tool::ToolCallOutcome>>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentUpdate {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            content_delta: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            done: true,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}
