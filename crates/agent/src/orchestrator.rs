//! The orchestration loop.
//!
//! One `send_message` call runs up to [`MAX_TURNS`] model turns. Each turn
//! streams provider events to the caller while buffering the assistant text
//! and tool calls; tool calls then fan out with bounded concurrency, and
//! their results are appended to the history in emission order, together
//! with the assistant message, as a single unit. Cancellation mid-turn
//! leaves the history exactly as it was before the turn.

use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use cf_domain::chat::Message;
use cf_domain::stream::{AgentUpdate, BoxStream, StreamEvent};
use cf_domain::tool::{ToolCall, ToolCallOutcome};
use cf_providers::{ChatRequest, LlmProvider};
use cf_tools::ToolRegistry;

use crate::conversation::Conversation;

/// Maximum model turns per user message before the loop force-stops.
const MAX_TURNS: usize = 10;

/// Maximum tool calls executing simultaneously within one turn.
const FAN_OUT_LIMIT: usize = 4;

pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    conversation: Arc<Mutex<Conversation>>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            registry,
            conversation: Arc::new(Mutex::new(Conversation::new(system_prompt))),
        }
    }

    pub fn history(&self) -> Vec<Message> {
        self.conversation.lock().snapshot()
    }

    /// Clear the conversation, keeping the system message.
    pub fn clear(&self) {
        self.conversation.lock().clear();
    }

    /// Run the agent loop for one user message, streaming updates. The
    /// stream always ends with exactly one terminal update (`done = true`).
    pub fn send_message(
        &self,
        text: String,
        cancel: CancellationToken,
    ) -> BoxStream<'static, AgentUpdate> {
        let provider = self.provider.clone();
        let registry = self.registry.clone();
        let conversation = self.conversation.clone();

        let stream = async_stream::stream! {
            conversation.lock().push_user(&text);
            let tools = registry.list();

            for turn in 0..MAX_TURNS {
                tracing::debug!(turn, "agent turn start");
                let req = ChatRequest {
                    messages: conversation.lock().snapshot(),
                    tools: tools.clone(),
                    model: None,
                    max_tokens: None,
                    temperature: None,
                };

                let mut events = match provider.chat_stream(req).await {
                    Ok(s) => s,
                    Err(e) => {
                        yield AgentUpdate::error(e.to_string());
                        return;
                    }
                };

                let mut text_buf = String::new();
                let mut pending_calls: Vec<ToolCall> = Vec::new();

                loop {
                    let event = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            yield AgentUpdate::error("cancelled");
                            return;
                        }
                        event = events.next() => event,
                    };
                    let Some(event) = event else { break };
                    match event {
                        Ok(StreamEvent::ContentDelta { text }) => {
                            text_buf.push_str(&text);
                            yield AgentUpdate::delta(text);
                        }
                        Ok(StreamEvent::ToolCallCompleted { id, name, arguments }) => {
                            pending_calls.push(ToolCall { id, name, arguments });
                        }
                        // Partial tool-call events are assembly details;
                        // the adapters emit a Completed event per call.
                        Ok(StreamEvent::ToolCallStarted { .. })
                        | Ok(StreamEvent::ToolCallDelta { .. }) => {}
                        Ok(StreamEvent::Done { .. }) => break,
                        Ok(StreamEvent::Error { message }) => {
                            yield AgentUpdate::error(message);
                            return;
                        }
                        Err(e) => {
                            yield AgentUpdate::error(e.to_string());
                            return;
                        }
                    }
                }

                // No tool calls: this is the final answer.
                if pending_calls.is_empty() {
                    conversation.lock().push_assistant(&text_buf);
                    debug_assert!(conversation.lock().is_well_formed());
                    yield AgentUpdate::done();
                    return;
                }

                yield AgentUpdate {
                    tool_calls: Some(pending_calls.clone()),
                    ..Default::default()
                };

                // Fan out, bounded; `buffered` yields results in the
                // original emission order regardless of finish order.
                let outcomes: Vec<ToolCallOutcome> =
                    futures_util::stream::iter(pending_calls.clone().into_iter().map(|call| {
                        let registry = registry.clone();
                        let cancel = cancel.clone();
                        async move {
                            let result = registry
                                .execute(&call.name, call.arguments.clone(), cancel)
                                .await;
                            ToolCallOutcome {
                                id: call.id,
                                name: call.name,
                                result,
                            }
                        }
                    }))
                    .buffered(FAN_OUT_LIMIT)
                    .collect()
                    .await;

                if cancel.is_cancelled() {
                    // Discard completed results; the history stays as it
                    // was before this turn.
                    yield AgentUpdate::error("cancelled");
                    return;
                }

                {
                    let mut convo = conversation.lock();
                    convo.push_assistant_turn(&text_buf, &pending_calls, &outcomes);
                    debug_assert!(convo.is_well_formed());
                }

                yield AgentUpdate {
                    tool_results: Some(outcomes),
                    ..Default::default()
                };
            }

            yield AgentUpdate::error(format!(
                "agent loop limit reached ({MAX_TURNS} turns)"
            ));
        };

        Box::pin(stream)
    }
}
