//! Tool registry: the single dispatch point for every tool invocation.
//!
//! Tools live in a BTreeMap so schema export iterates in a stable order.
//! The registry is the only layer that validates arguments (against each
//! tool's compiled JSON Schema); the orchestrator trusts it and does not
//! re-validate. Dispatch failures of any kind come back in the uniform
//! `ToolResult` shape.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_domain::tool::{ToolDefinition, ToolResult};

type HandlerFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;
type Handler = Arc<dyn Fn(Value, CancellationToken) -> HandlerFuture + Send + Sync>;

struct RegisteredTool {
    definition: ToolDefinition,
    schema: jsonschema::JSONSchema,
    handler: Handler,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. The schema is compiled once here; a tool with an
    /// invalid schema is a programming error surfaced at startup.
    pub fn register<F, Fut>(&mut self, definition: ToolDefinition, handler: F) -> Result<()>
    where
        F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult>> + Send + 'static,
    {
        if self.tools.contains_key(&definition.name) {
            return Err(Error::Config(format!(
                "duplicate tool name: {}",
                definition.name
            )));
        }
        let schema = jsonschema::JSONSchema::compile(&definition.parameters).map_err(|e| {
            Error::Config(format!("tool {} has an invalid schema: {e}", definition.name))
        })?;
        let handler: Handler = Arc::new(move |args, cancel| {
            let fut = handler(args, cancel);
            Box::pin(async move { fut.await.unwrap_or_else(ToolResult::from) })
        });
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                schema,
                handler,
            },
        );
        Ok(())
    }

    /// All tool definitions, in stable (lexicographic) order.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and dispatch. Every failure mode (unknown tool, schema
    /// violation, handler error) comes back as a failed `ToolResult`.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::from(Error::ToolNotFound(name.to_string()));
        };

        if let Err(violations) = tool.schema.validate(&arguments) {
            let first = violations
                .into_iter()
                .next()
                .map(|v| format!("{} (at {})", v, v.instance_path))
                .unwrap_or_else(|| "schema violation".into());
            return ToolResult::from(Error::SchemaViolation(format!("{name}: {first}")));
        }

        tracing::debug!(tool = name, "dispatching tool");
        let started = std::time::Instant::now();
        let result = (tool.handler)(arguments, cancel).await;
        tracing::debug!(
            tool = name,
            success = result.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> ToolDefinition {
        ToolDefinition {
            name: "echo".into(),
            description: "Echo the message back".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" }
                },
                "required": ["message"]
            }),
        }
    }

    fn registry_with_echo() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(echo_tool(), |args, _cancel| async move {
            let msg = args["message"].as_str().unwrap_or_default().to_string();
            Ok(ToolResult::ok(msg))
        })
        .unwrap();
        r
    }

    #[tokio::test]
    async fn execute_happy_path() {
        let r = registry_with_echo();
        let result = r
            .execute("echo", json!({"message": "hi"}), CancellationToken::new())
            .await;
        assert!(result.success);
        assert_eq!(result.content, "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_result_not_a_panic() {
        let r = registry_with_echo();
        let result = r
            .execute("nope", json!({}), CancellationToken::new())
            .await;
        assert!(!result.success);
        assert_eq!(result.data["kind"], "tool_not_found");
    }

    #[tokio::test]
    async fn schema_violations_are_caught_before_dispatch() {
        let r = registry_with_echo();
        let result = r
            .execute("echo", json!({"message": 42}), CancellationToken::new())
            .await;
        assert!(!result.success);
        assert_eq!(result.data["kind"], "schema_violation");
    }

    #[tokio::test]
    async fn handler_errors_fold_into_tool_result() {
        let mut r = ToolRegistry::new();
        r.register(
            ToolDefinition {
                name: "fails".into(),
                description: "always fails".into(),
                parameters: json!({"type": "object"}),
            },
            |_args, _cancel| async move {
                Err::<ToolResult, _>(Error::FileNotFound("/missing.mp4".into()))
            },
        )
        .unwrap();
        let result = r.execute("fails", json!({}), CancellationToken::new()).await;
        assert!(!result.success);
        assert_eq!(result.data["kind"], "file_not_found");
        assert_eq!(result.envelope(), format!("Error: {}", result.error));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut r = registry_with_echo();
        let err = r
            .register(echo_tool(), |_a, _c| async move { Ok(ToolResult::ok("")) })
            .unwrap_err();
        assert_eq!(err.kind(), "config_invalid");
    }

    #[test]
    fn list_is_stably_ordered() {
        let mut r = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            r.register(
                ToolDefinition {
                    name: name.into(),
                    description: String::new(),
                    parameters: json!({"type": "object"}),
                },
                |_a, _c| async move { Ok(ToolResult::ok("")) },
            )
            .unwrap();
        }
        let names: Vec<String> = r.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
