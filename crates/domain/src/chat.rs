use serde::{Deserialize, Serialize};

/// A message in the conversation (provider-agnostic).
///
/// Every adapter converts these to and from its wire format. Tool results
/// are modelled as their own role so the well-formedness invariant (an
/// assistant message with k tool calls is followed by exactly k tool
/// messages) is visible in the history itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data.
        data: String,
        media_type: String,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Assistant message carrying text plus the tool calls it emitted.
    pub fn assistant_with_tool_calls(text: &str, calls: &[crate::tool::ToolCall]) -> Self {
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(ContentPart::Text { text: text.into() });
        }
        for call in calls {
            parts.push(ContentPart::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            });
        }
        Self {
            role: Role::Assistant,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_call_id: tool_call_id.into(),
                content: content.into(),
                is_error,
            }]),
        }
    }

    /// Ids of the tool calls this message carries (empty for non-assistant
    /// messages and assistant messages without tool use).
    pub fn tool_call_ids(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolUse { id, .. } => Some(id.as_str()),
                    _ => None,
                })
                .collect(),
            MessageContent::Text(_) => Vec::new(),
        }
    }
}

impl MessageContent {
    /// Extract and join all text content.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_joins_text_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "trimming now".into(),
            },
            ContentPart::ToolUse {
                id: "c1".into(),
                name: "trim_video".into(),
                input: serde_json::json!({}),
            },
            ContentPart::Text {
                text: "done".into(),
            },
        ]);
        assert_eq!(content.extract_all_text(), "trimming now\ndone");
    }

    #[test]
    fn assistant_with_tool_calls_exposes_ids_in_order() {
        let calls = vec![
            crate::tool::ToolCall {
                id: "a".into(),
                name: "trim_video".into(),
                arguments: serde_json::json!({}),
            },
            crate::tool::ToolCall {
                id: "b".into(),
                name: "resize_video".into(),
                arguments: serde_json::json!({}),
            },
        ];
        let msg = Message::assistant_with_tool_calls("", &calls);
        assert_eq!(msg.tool_call_ids(), vec!["a", "b"]);
    }
}
