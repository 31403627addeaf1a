//! Anthropic Messages adapter.
//!
//! Translates the shared message model to the Messages API: system messages
//! move to the top-level `system` field, tool results become user messages
//! with `tool_result` content blocks, and the streamed
//! `content_block_start/delta/stop` events are reassembled into the common
//! tool-call events.

use std::collections::HashMap;

use serde_json::Value;

use cf_domain::chat::{ContentPart, Message, MessageContent, Role};
use cf_domain::error::{Error, Result};
use cf_domain::stream::{BoxStream, StreamEvent};
use cf_domain::tool::ToolDefinition;

use crate::traits::{ChatRequest, LlmProvider};
use crate::util::{from_reqwest, remote_api_error};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct ClaudeProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: "https://api.anthropic.com".into(),
            api_key,
            default_model: model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut system_parts: Vec<String> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.extract_all_text()),
                Role::User => api_messages.push(user_msg_to_wire(msg)),
                Role::Assistant => api_messages.push(assistant_msg_to_wire(msg)),
                // Tool results are user messages with tool_result blocks.
                Role::Tool => api_messages.push(tool_result_to_wire(msg)),
            }
        }

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });

        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_wire).collect());
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn user_msg_to_wire(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({ "role": "user", "content": t }),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => {
                        Some(serde_json::json!({ "type": "text", "text": text }))
                    }
                    ContentPart::Image { data, media_type } => Some(serde_json::json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": media_type,
                            "data": data,
                        }
                    })),
                    _ => None,
                })
                .collect();
            serde_json::json!({ "role": "user", "content": content })
        }
    }
}

fn assistant_msg_to_wire(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({
            "role": "assistant",
            "content": [{ "type": "text", "text": t }],
        }),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => {
                        Some(serde_json::json!({ "type": "text", "text": text }))
                    }
                    ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                        "type": "tool_use",
                        "id": id,
                        "name": name,
                        "input": input,
                    })),
                    _ => None,
                })
                .collect();
            serde_json::json!({ "role": "assistant", "content": content })
        }
    }
}

fn tool_result_to_wire(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult {
                    tool_call_id,
                    content,
                    is_error,
                } => Some(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": content,
                    "is_error": is_error,
                })),
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => vec![serde_json::json!({
            "type": "tool_result",
            "tool_use_id": "",
            "content": t,
        })],
    };
    serde_json::json!({ "role": "user", "content": content })
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming event decode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Assembly state for streamed tool calls, keyed by content-block index.
struct StreamState {
    active_tool_calls: HashMap<u64, (String, String, String)>, // id, name, args buffer
    done_emitted: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            active_tool_calls: HashMap::new(),
            done_emitted: false,
        }
    }
}

fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" => "stop".into(),
        "tool_use" => "tool_calls".into(),
        other => other.to_string(),
    }
}

/// Parse a single Messages-API SSE payload into zero or more stream events.
fn parse_claude_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    let event_type = v.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match event_type {
        "content_block_start" => {
            let idx = v.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
            if let Some(block) = v.get("content_block") {
                if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                    let id = block
                        .get("id")
                        .and_then(|x| x.as_str())
                        .unwrap_or("")
                        .to_string();
                    let name = block
                        .get("name")
                        .and_then(|x| x.as_str())
                        .unwrap_or("")
                        .to_string();
                    events.push(Ok(StreamEvent::ToolCallStarted {
                        id: id.clone(),
                        name: name.clone(),
                    }));
                    state.active_tool_calls.insert(idx, (id, name, String::new()));
                }
            }
        }

        "content_block_delta" => {
            let idx = v.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
            if let Some(delta) = v.get("delta") {
                match delta.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(|t| t.as_str()) {
                            if !text.is_empty() {
                                events.push(Ok(StreamEvent::ContentDelta {
                                    text: text.to_string(),
                                }));
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta.get("partial_json").and_then(|p| p.as_str()) {
                            if let Some(tc) = state.active_tool_calls.get_mut(&idx) {
                                tc.2.push_str(partial);
                                events.push(Ok(StreamEvent::ToolCallDelta {
                                    id: tc.0.clone(),
                                    delta: partial.to_string(),
                                }));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        "content_block_stop" => {
            let idx = v.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
            if let Some((id, name, args)) = state.active_tool_calls.remove(&idx) {
                let arguments: Value =
                    serde_json::from_str(&args).unwrap_or(Value::Object(Default::default()));
                events.push(Ok(StreamEvent::ToolCallCompleted {
                    id,
                    name,
                    arguments,
                }));
            }
        }

        "message_delta" => {
            let stop_reason = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|s| s.as_str())
                .map(map_stop_reason);
            if stop_reason.is_some() {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    reason: stop_reason,
                }));
            }
        }

        "message_stop" => {
            if !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    reason: Some("stop".into()),
                }));
            }
        }

        "error" => {
            let msg = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            events.push(Ok(StreamEvent::Error {
                message: msg.to_string(),
            }));
        }

        // ping, message_start and unknown event types
        _ => {}
    }

    events
}

#[async_trait::async_trait]
impl LlmProvider for ClaudeProvider {
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&req);

        tracing::debug!(url = %url, "claude stream request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(remote_api_error("anthropic", status.as_u16(), &err_text));
        }

        let mut state = StreamState::new();
        Ok(crate::sse::sse_response_stream(resp, move |data| {
            parse_claude_sse(data, &mut state)
        }))
    }

    fn provider_id(&self) -> &str {
        "claude"
    }

    fn supports_vision(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::tool::ToolCall;

    #[test]
    fn system_messages_move_to_top_level_field() {
        let provider = ClaudeProvider::new("key".into(), None).unwrap();
        let req = ChatRequest {
            messages: vec![
                Message::system("you are a video editor"),
                Message::user("trim my clip"),
            ],
            ..Default::default()
        };
        let body = provider.build_body(&req);
        assert_eq!(body["system"], "you are a video editor");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn tool_results_become_user_messages() {
        let provider = ClaudeProvider::new("key".into(), None).unwrap();
        let calls = vec![ToolCall {
            id: "tc1".into(),
            name: "trim_video".into(),
            arguments: serde_json::json!({"start": 2.0}),
        }];
        let req = ChatRequest {
            messages: vec![
                Message::assistant_with_tool_calls("trimming", &calls),
                Message::tool_result("tc1", "Trimmed to 5.5s", false),
            ],
            ..Default::default()
        };
        let body = provider.build_body(&req);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "assistant");
        assert_eq!(messages[0]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"][0]["type"], "tool_result");
        assert_eq!(messages[1]["content"][0]["tool_use_id"], "tc1");
    }

    #[test]
    fn streamed_tool_call_is_assembled_across_deltas() {
        let mut state = StreamState::new();
        let mut events = Vec::new();
        for data in [
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"tc1","name":"trim_video"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"start\":"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"2.0}"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#,
        ] {
            events.extend(parse_claude_sse(data, &mut state));
        }

        let completed = events
            .iter()
            .find_map(|e| match e {
                Ok(StreamEvent::ToolCallCompleted { id, name, arguments }) => {
                    Some((id.clone(), name.clone(), arguments.clone()))
                }
                _ => None,
            })
            .expect("tool call completed");
        assert_eq!(completed.0, "tc1");
        assert_eq!(completed.1, "trim_video");
        assert_eq!(completed.2["start"], 2.0);

        assert!(matches!(
            events.last().unwrap(),
            Ok(StreamEvent::Done { reason: Some(r) }) if r == "tool_calls"
        ));
    }

    #[test]
    fn message_stop_without_delta_still_emits_done() {
        let mut state = StreamState::new();
        let events = parse_claude_sse(r#"{"type":"message_stop"}"#, &mut state);
        assert!(matches!(events[0], Ok(StreamEvent::Done { .. })));
    }
}
