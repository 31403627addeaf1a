//! Conversation history.
//!
//! Single-writer: only the orchestrator mutates it, and an assistant turn
//! is appended together with all of its tool results, so the history is
//! always well-formed (every assistant message with k tool calls is
//! immediately followed by exactly k tool messages with matching ids).

use cf_domain::chat::{ContentPart, Message, MessageContent, Role};
use cf_domain::tool::{ToolCall, ToolCallOutcome};

pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// A new conversation always starts with the system message at index 0.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Append a plain assistant answer (no tool calls).
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    /// Append an assistant turn and its tool results as one unit. Results
    /// must be in the assistant's emission order; ids are taken from the
    /// calls, so the invariant holds by construction.
    pub fn push_assistant_turn(&mut self, text: &str, calls: &[ToolCall], results: &[ToolCallOutcome]) {
        debug_assert_eq!(calls.len(), results.len());
        self.messages
            .push(Message::assistant_with_tool_calls(text, calls));
        for (call, outcome) in calls.iter().zip(results) {
            self.messages.push(Message::tool_result(
                &call.id,
                outcome.result.envelope(),
                !outcome.result.success,
            ));
        }
    }

    /// Drop everything but the system message.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
    }

    /// Check the tool-message pairing invariant. Used by tests and debug
    /// assertions; a violation is a bug in the orchestrator.
    pub fn is_well_formed(&self) -> bool {
        if self.messages.first().map(|m| m.role) != Some(Role::System) {
            return false;
        }
        let mut i = 0;
        while i < self.messages.len() {
            let msg = &self.messages[i];
            if msg.role == Role::Assistant {
                let ids = msg.tool_call_ids();
                for (k, id) in ids.iter().enumerate() {
                    let Some(follow) = self.messages.get(i + 1 + k) else {
                        return false;
                    };
                    if follow.role != Role::Tool || tool_result_id(follow) != Some(id) {
                        return false;
                    }
                }
                i += 1 + ids.len();
            } else if msg.role == Role::Tool {
                // A tool message outside an assistant turn's window.
                return false;
            } else {
                i += 1;
            }
        }
        true
    }
}

fn tool_result_id(msg: &Message) -> Option<&str> {
    match &msg.content {
        MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
            ContentPart::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        }),
        MessageContent::Text(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::tool::ToolResult;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "trim_video".into(),
            arguments: serde_json::json!({}),
        }
    }

    fn outcome(id: &str, success: bool) -> ToolCallOutcome {
        ToolCallOutcome {
            id: id.into(),
            name: "trim_video".into(),
            result: if success {
                ToolResult::ok("done")
            } else {
                ToolResult::fail("boom")
            },
        }
    }

    #[test]
    fn clear_keeps_only_the_system_message() {
        let mut c = Conversation::new("system prompt");
        c.push_user("hello");
        c.push_assistant("hi");
        c.clear();
        assert_eq!(c.messages().len(), 1);
        assert_eq!(c.messages()[0].role, Role::System);
    }

    #[test]
    fn assistant_turn_with_tools_is_well_formed() {
        let mut c = Conversation::new("sys");
        c.push_user("trim both");
        c.push_assistant_turn(
            "on it",
            &[call("a"), call("b")],
            &[outcome("a", true), outcome("b", false)],
        );
        c.push_assistant("both done");
        assert!(c.is_well_formed());
        assert_eq!(c.messages().len(), 5);
    }

    #[test]
    fn failed_tool_results_are_marked_and_enveloped() {
        let mut c = Conversation::new("sys");
        c.push_assistant_turn("x", &[call("a")], &[outcome("a", false)]);
        let tool_msg = &c.messages()[2];
        match &tool_msg.content {
            MessageContent::Parts(parts) => match &parts[0] {
                ContentPart::ToolResult {
                    content, is_error, ..
                } => {
                    assert!(is_error);
                    assert_eq!(content, "Error: boom");
                }
                other => panic!("unexpected part {other:?}"),
            },
            _ => panic!("expected parts"),
        }
    }

    #[test]
    fn orphan_tool_message_is_ill_formed() {
        let mut c = Conversation::new("sys");
        c.messages.push(Message::tool_result("ghost", "x", false));
        assert!(!c.is_well_formed());
    }

    #[test]
    fn missing_tool_result_is_ill_formed() {
        let mut c = Conversation::new("sys");
        c.messages
            .push(Message::assistant_with_tool_calls("x", &[call("a")]));
        assert!(!c.is_well_formed());
    }
}
