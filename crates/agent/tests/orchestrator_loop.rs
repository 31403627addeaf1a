//! Orchestrator loop behavior against a scripted in-process provider:
//! ordered fan-out, failure reporting, cancellation, and the turn limit.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use cf_agent::Orchestrator;
use cf_domain::chat::Role;
use cf_domain::error::Result;
use cf_domain::stream::{AgentUpdate, BoxStream, StreamEvent};
use cf_domain::tool::{ToolDefinition, ToolResult};
use cf_tools::ToolRegistry;
use cf_providers::{ChatRequest, LlmProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replays pre-scripted event lists, one list per `chat_stream` call.
/// An empty queue yields a never-completing stream (used for the
/// cancellation test).
struct ScriptedProvider {
    turns: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.requests.lock().push(req);
        match self.turns.lock().pop_front() {
            Some(events) => Ok(Box::pin(futures_util::stream::iter(
                events.into_iter().map(Ok),
            ))),
            None => Ok(Box::pin(futures_util::stream::pending())),
        }
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn supports_vision(&self) -> bool {
        false
    }
}

fn tool_call_turn(calls: &[(&str, &str)]) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::ContentDelta {
        text: "working on it".into(),
    }];
    for (id, name) in calls {
        events.push(StreamEvent::ToolCallStarted {
            id: (*id).into(),
            name: (*name).into(),
        });
        events.push(StreamEvent::ToolCallCompleted {
            id: (*id).into(),
            name: (*name).into(),
            arguments: json!({ "id": id }),
        });
    }
    events.push(StreamEvent::Done {
        reason: Some("tool_calls".into()),
    });
    events
}

fn answer_turn(text: &str) -> Vec<StreamEvent> {
    vec![
        StreamEvent::ContentDelta { text: text.into() },
        StreamEvent::Done {
            reason: Some("stop".into()),
        },
    ]
}

/// Registry with one tool whose latency is controlled by its arguments,
/// recording completion order.
fn registry_with_sleepy_tool(completions: Arc<Mutex<Vec<String>>>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolDefinition {
                name: "sleepy".into(),
                description: "sleeps then succeeds".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "sleepMs": { "type": "integer" },
                        "fail": { "type": "boolean" }
                    },
                    "required": ["id"]
                }),
            },
            move |args, _cancel| {
                let completions = completions.clone();
                async move {
                    let id = args["id"].as_str().unwrap_or("?").to_string();
                    let sleep_ms = args["sleepMs"].as_u64().unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                    completions.lock().push(id.clone());
                    if args["fail"].as_bool().unwrap_or(false) {
                        Ok(ToolResult::fail(format!("{id} exploded")))
                    } else {
                        Ok(ToolResult::ok(format!("{id} ok")))
                    }
                }
            },
        )
        .unwrap();
    Arc::new(registry)
}

async fn drain(mut stream: BoxStream<'static, AgentUpdate>) -> Vec<AgentUpdate> {
    let mut updates = Vec::new();
    while let Some(update) = stream.next().await {
        let terminal = update.done;
        updates.push(update);
        if terminal {
            break;
        }
    }
    updates
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tool_results_keep_emission_order_despite_finish_order() {
    let completions = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with_sleepy_tool(completions.clone());

    // First call sleeps much longer than the second.
    let provider = Arc::new(ScriptedProvider::new(vec![
        vec![
            StreamEvent::ContentDelta { text: "two cuts".into() },
            StreamEvent::ToolCallCompleted {
                id: "call_slow".into(),
                name: "sleepy".into(),
                arguments: json!({ "id": "slow", "sleepMs": 150 }),
            },
            StreamEvent::ToolCallCompleted {
                id: "call_fast".into(),
                name: "sleepy".into(),
                arguments: json!({ "id": "fast", "sleepMs": 5 }),
            },
            StreamEvent::Done { reason: Some("tool_calls".into()) },
        ],
        answer_turn("both cuts made"),
    ]));

    let orchestrator = Orchestrator::new(provider, registry, "you edit video");
    let updates = drain(orchestrator.send_message("cut twice".into(), CancellationToken::new())).await;

    // The fast tool finished first...
    assert_eq!(completions.lock().as_slice(), ["fast", "slow"]);

    // ...but results are reported in emission order.
    let results = updates
        .iter()
        .find_map(|u| u.tool_results.as_ref())
        .expect("tool results update");
    assert_eq!(results[0].id, "call_slow");
    assert_eq!(results[1].id, "call_fast");

    // Terminal update is a clean done.
    let last = updates.last().unwrap();
    assert!(last.done && last.error.is_none());

    // History: system, user, assistant(+2 tool calls), tool, tool, assistant.
    let history = orchestrator.history();
    assert_eq!(history.len(), 6);
    assert_eq!(history[2].tool_call_ids(), vec!["call_slow", "call_fast"]);
    assert_eq!(history[3].role, Role::Tool);
    assert_eq!(history[4].role, Role::Tool);
    assert_eq!(history[5].role, Role::Assistant);
}

#[tokio::test]
async fn failed_tool_is_reported_to_the_model_and_loop_continues() {
    let completions = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with_sleepy_tool(completions);

    let provider = Arc::new(ScriptedProvider::new(vec![
        vec![
            StreamEvent::ToolCallCompleted {
                id: "c1".into(),
                name: "sleepy".into(),
                arguments: json!({ "id": "bad", "fail": true }),
            },
            StreamEvent::Done { reason: Some("tool_calls".into()) },
        ],
        answer_turn("that failed, sorry"),
    ]));

    let orchestrator = Orchestrator::new(provider.clone(), registry, "sys");
    let updates = drain(orchestrator.send_message("go".into(), CancellationToken::new())).await;

    let results = updates
        .iter()
        .find_map(|u| u.tool_results.as_ref())
        .unwrap();
    assert!(!results[0].result.success);

    // The loop went on to a second model turn that carried the tool error.
    let requests = provider.requests.lock();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].messages.iter().any(|m| m.role == Role::Tool));
    drop(requests);

    assert!(updates.last().unwrap().error.is_none());
    assert!(orchestrator
        .history()
        .iter()
        .any(|m| m.role == Role::Assistant));
}

#[tokio::test]
async fn unknown_tool_comes_back_as_failed_result() {
    let completions = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with_sleepy_tool(completions);

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call_turn(&[("c1", "no_such_tool")]),
        answer_turn("giving up"),
    ]));

    let orchestrator = Orchestrator::new(provider, registry, "sys");
    let updates = drain(orchestrator.send_message("go".into(), CancellationToken::new())).await;

    let results = updates
        .iter()
        .find_map(|u| u.tool_results.as_ref())
        .unwrap();
    assert!(!results[0].result.success);
    assert!(results[0].result.error.contains("no_such_tool"));
}

#[tokio::test]
async fn cancellation_terminates_promptly_and_leaves_history_consistent() {
    let completions = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with_sleepy_tool(completions);
    // No scripted turns: the provider stream hangs forever.
    let provider = Arc::new(ScriptedProvider::new(vec![]));

    let orchestrator = Orchestrator::new(provider, registry, "sys");
    let cancel = CancellationToken::new();
    let stream = orchestrator.send_message("transcribe this very long file".into(), cancel.clone());

    let canceller = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    });

    let started = std::time::Instant::now();
    let updates = drain(stream).await;
    canceller.await.unwrap();

    let last = updates.last().unwrap();
    assert!(last.done);
    assert_eq!(last.error.as_deref(), Some("cancelled"));
    // Terminated within 200 ms of the cancellation signal.
    assert!(started.elapsed() < Duration::from_millis(250));

    // No assistant turn or tool message was appended.
    let history = orchestrator.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::System);
    assert_eq!(history[1].role, Role::User);
}

#[tokio::test]
async fn loop_stops_after_ten_turns() {
    let completions = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with_sleepy_tool(completions);

    // Every turn asks for another tool call, forever.
    let turns: Vec<Vec<StreamEvent>> = (0..20)
        .map(|i| {
            vec![
                StreamEvent::ToolCallCompleted {
                    id: format!("c{i}"),
                    name: "sleepy".into(),
                    arguments: json!({ "id": format!("t{i}") }),
                },
                StreamEvent::Done { reason: Some("tool_calls".into()) },
            ]
        })
        .collect();
    let provider = Arc::new(ScriptedProvider::new(turns));

    let orchestrator = Orchestrator::new(provider.clone(), registry, "sys");
    let updates = drain(orchestrator.send_message("loop".into(), CancellationToken::new())).await;

    let last = updates.last().unwrap();
    assert!(last.done);
    assert!(last.error.as_deref().unwrap_or("").contains("limit"));
    assert_eq!(provider.requests.lock().len(), 10);
}

#[tokio::test]
async fn clear_keeps_system_message_only() {
    let completions = Arc::new(Mutex::new(Vec::new()));
    let registry = registry_with_sleepy_tool(completions);
    let provider = Arc::new(ScriptedProvider::new(vec![answer_turn("hi")]));

    let orchestrator = Orchestrator::new(provider, registry, "sys");
    drain(orchestrator.send_message("hello".into(), CancellationToken::new())).await;
    assert!(orchestrator.history().len() > 1);

    orchestrator.clear();
    let history = orchestrator.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::System);
}
