//! OpenAI chat-completions adapter.
//!
//! Tool calls arrive as indexed fragments spread over many chunks; the
//! decoder buffers them by index and flushes completed calls when the
//! choice reports a finish reason (or at the `[DONE]` sentinel, for
//! endpoints that omit one).

use std::collections::BTreeMap;

use serde_json::Value;

use cf_domain::chat::{ContentPart, Message, MessageContent, Role};
use cf_domain::error::{Error, Result};
use cf_domain::stream::{BoxStream, StreamEvent};
use cf_domain::tool::ToolDefinition;

use crate::traits::{ChatRequest, LlmProvider};
use crate::util::{from_reqwest, remote_api_error};

const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key,
            default_model: model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_wire).collect());
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
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

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_wire(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_wire(msg),
        Role::Assistant => assistant_to_wire(msg),
        Role::User => user_to_wire(msg),
        Role::System => serde_json::json!({
            "role": "system",
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn user_to_wire(msg: &Message) -> Value {
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
                        "type": "image_url",
                        "image_url": { "url": format!("data:{media_type};base64,{data}") }
                    })),
                    _ => None,
                })
                .collect();
            serde_json::json!({ "role": "user", "content": content })
        }
    }
}

fn assistant_to_wire(msg: &Message) -> Value {
    let mut obj = serde_json::json!({ "role": "assistant" });
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t.clone()),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    _ => {}
                }
            }
        }
    }

    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_wire(msg: &Message) -> Value {
    if let MessageContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ContentPart::ToolResult {
                tool_call_id,
                content,
                ..
            } = part
            {
                return serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": content,
                });
            }
        }
    }
    serde_json::json!({
        "role": role_to_str(msg.role),
        "tool_call_id": "",
        "content": msg.content.extract_all_text(),
    })
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming event decode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tool-call assembly state. OpenAI fragments calls by `index` and never
/// marks a single call complete, so assembled calls flush together when the
/// finish reason arrives (or at `[DONE]` as a fallback).
struct StreamState {
    // index -> (id, name, args buffer)
    pending: BTreeMap<u64, (String, String, String)>,
    done_emitted: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            done_emitted: false,
        }
    }

    fn flush_completed(&mut self, events: &mut Vec<Result<StreamEvent>>) {
        for (_, (id, name, args)) in std::mem::take(&mut self.pending) {
            let arguments: Value = if args.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&args).unwrap_or(Value::Object(Default::default()))
            };
            events.push(Ok(StreamEvent::ToolCallCompleted {
                id,
                name,
                arguments,
            }));
        }
    }
}

fn map_finish_reason(reason: &str) -> String {
    match reason {
        "tool_calls" => "tool_calls".into(),
        "stop" => "stop".into(),
        other => other.to_string(),
    }
}

fn parse_openai_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    if data == "[DONE]" {
        if !state.done_emitted {
            state.done_emitted = true;
            state.flush_completed(&mut events);
            events.push(Ok(StreamEvent::Done {
                reason: Some("stop".into()),
            }));
        }
        return events;
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    if let Some(err) = v.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        events.push(Ok(StreamEvent::Error {
            message: msg.to_string(),
        }));
        return events;
    }

    let Some(choice) = v.get("choices").and_then(|c| c.as_array()).and_then(|c| c.first())
    else {
        return events; // usage-only chunk
    };

    if let Some(delta) = choice.get("delta") {
        if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
            if !text.is_empty() {
                events.push(Ok(StreamEvent::ContentDelta {
                    text: text.to_string(),
                }));
            }
        }
        if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
            for tc in tool_calls {
                let index = tc.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let id = tc.get("id").and_then(|i| i.as_str());
                let name = tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|n| n.as_str());
                let args_delta = tc
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(|a| a.as_str());

                let entry = state
                    .pending
                    .entry(index)
                    .or_insert_with(|| (String::new(), String::new(), String::new()));
                if let Some(id) = id {
                    entry.0 = id.to_string();
                }
                if let Some(name) = name {
                    let started = entry.1.is_empty();
                    entry.1 = name.to_string();
                    if started {
                        events.push(Ok(StreamEvent::ToolCallStarted {
                            id: entry.0.clone(),
                            name: entry.1.clone(),
                        }));
                    }
                }
                if let Some(delta) = args_delta {
                    entry.2.push_str(delta);
                    events.push(Ok(StreamEvent::ToolCallDelta {
                        id: entry.0.clone(),
                        delta: delta.to_string(),
                    }));
                }
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
        state.done_emitted = true;
        state.flush_completed(&mut events);
        events.push(Ok(StreamEvent::Done {
            reason: Some(map_finish_reason(reason)),
        }));
    }

    events
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&req);

        tracing::debug!(url = %url, "openai stream request");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(remote_api_error("openai", status.as_u16(), &err_text));
        }

        let mut state = StreamState::new();
        Ok(crate::sse::sse_response_stream(resp, move |data| {
            parse_openai_sse(data, &mut state)
        }))
    }

    fn provider_id(&self) -> &str {
        "openai"
    }

    fn supports_vision(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_calls_serialize_with_string_arguments() {
        let calls = vec![cf_domain::tool::ToolCall {
            id: "tc1".into(),
            name: "resize_video".into(),
            arguments: serde_json::json!({"width": 1280}),
        }];
        let wire = msg_to_wire(&Message::assistant_with_tool_calls("resizing", &calls));
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "resize_video");
        // Arguments must be a JSON-encoded string, not an object.
        assert!(wire["tool_calls"][0]["function"]["arguments"].is_string());
    }

    #[test]
    fn fragmented_tool_call_flushes_on_finish_reason() {
        let mut state = StreamState::new();
        let mut events = Vec::new();
        for data in [
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"trim_video","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"start\""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":":2.0}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ] {
            events.extend(parse_openai_sse(data, &mut state));
        }

        assert!(matches!(
            &events[0],
            Ok(StreamEvent::ToolCallStarted { id, name }) if id == "call_1" && name == "trim_video"
        ));
        let completed = events.iter().find_map(|e| match e {
            Ok(StreamEvent::ToolCallCompleted { arguments, .. }) => Some(arguments.clone()),
            _ => None,
        });
        assert_eq!(completed.unwrap()["start"], 2.0);
        assert!(matches!(
            events.last().unwrap(),
            Ok(StreamEvent::Done { reason: Some(r) }) if r == "tool_calls"
        ));
    }

    #[test]
    fn multiple_tool_calls_flush_in_index_order() {
        let mut state = StreamState::new();
        let mut events = Vec::new();
        for data in [
            r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"b","arguments":"{}"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"a","arguments":"{}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ] {
            events.extend(parse_openai_sse(data, &mut state));
        }
        let completed_ids: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::ToolCallCompleted { id, .. }) => Some(id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(completed_ids, vec!["call_a", "call_b"]);
    }

    #[test]
    fn done_sentinel_is_terminal_once() {
        let mut state = StreamState::new();
        let first = parse_openai_sse("[DONE]", &mut state);
        assert_eq!(first.len(), 1);
        let second = parse_openai_sse("[DONE]", &mut state);
        assert!(second.is_empty());
    }

    #[test]
    fn content_delta_round_trip() {
        let mut state = StreamState::new();
        let events = parse_openai_sse(
            r#"{"choices":[{"delta":{"content":"hello"}}]}"#,
            &mut state,
        );
        assert!(matches!(
            &events[0],
            Ok(StreamEvent::ContentDelta { text }) if text == "hello"
        ));
    }
}
