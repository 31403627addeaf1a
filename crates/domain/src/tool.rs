use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// The uniform result shape every tool produces, regardless of how it
/// failed internally. `content` is human-readable; `data` carries the
/// structured payload for programmatic callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: String::new(),
            data: serde_json::Value::Null,
        }
    }

    pub fn ok_with_data(content: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: String::new(),
            data,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: error.into(),
            data: serde_json::Value::Null,
        }
    }

    /// The string reported back to the model as the tool message content.
    pub fn envelope(&self) -> String {
        if self.success {
            self.content.clone()
        } else {
            format!("Error: {}", self.error)
        }
    }
}

impl From<crate::error::Error> for ToolResult {
    fn from(e: crate::error::Error) -> Self {
        let mut r = ToolResult::fail(e.to_string());
        r.data = serde_json::json!({ "kind": e.kind() });
        r
    }
}

/// A tool call paired with its result, as surfaced through agent updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub id: String,
    pub name: String,
    pub result: ToolResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_prefixes_errors() {
        assert_eq!(ToolResult::ok("5 files").envelope(), "5 files");
        assert_eq!(
            ToolResult::fail("input missing").envelope(),
            "Error: input missing"
        );
    }

    #[test]
    fn error_conversion_carries_kind() {
        let r: ToolResult = crate::error::Error::Cancelled.into();
        assert!(!r.success);
        assert_eq!(r.data["kind"], "cancelled");
    }
}
