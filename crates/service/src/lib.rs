//! Service facade: the one surface any transport consumes.
//!
//! Aggregates the config store, the tool registry (built once at startup),
//! and the agent orchestrator. The orchestrator is created lazily per
//! configuration because the chosen provider may change at runtime via
//! `update_config`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use cf_agent::Orchestrator;
use cf_domain::chat::Message;
use cf_domain::config::{Config, ConfigStore, MaskedConfig};
use cf_domain::error::Result;
use cf_domain::stream::{AgentUpdate, BoxStream};
use cf_domain::tool::{ToolDefinition, ToolResult};
use cf_tools::{build_registry, ToolDeps, ToolRegistry};

const SYSTEM_PROMPT: &str = "\
You are a video-editing assistant. You operate on files the user names by \
path, using the available tools for every media operation. Never guess at \
file contents: probe first. Prefer small verifiable steps, report output \
paths, and surface tool errors honestly rather than retrying blindly.";

pub struct VideoEditorService {
    config: Arc<ConfigStore>,
    registry: Arc<ToolRegistry>,
    orchestrator: Mutex<Option<Arc<Orchestrator>>>,
}

impl VideoEditorService {
    pub fn new(config: Arc<ConfigStore>) -> Result<Self> {
        let deps = Arc::new(ToolDeps::new(config.clone())?);
        let registry = Arc::new(build_registry(deps)?);
        Ok(Self {
            config,
            registry,
            orchestrator: Mutex::new(None),
        })
    }

    /// The active orchestrator, built on first use and kept until the
    /// conversation is cleared after a provider change.
    fn orchestrator(&self) -> Result<Arc<Orchestrator>> {
        let mut slot = self.orchestrator.lock();
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        let provider = cf_providers::provider_from_config(&self.config.snapshot())?;
        let orchestrator = Arc::new(Orchestrator::new(
            provider,
            self.registry.clone(),
            SYSTEM_PROMPT,
        ));
        *slot = Some(orchestrator.clone());
        Ok(orchestrator)
    }

    // ── Chat ───────────────────────────────────────────────────────

    /// Send a user message; returns the update stream. The stream ends
    /// with exactly one terminal update.
    pub fn send_message(
        &self,
        message: String,
        cancel: CancellationToken,
    ) -> BoxStream<'static, AgentUpdate> {
        match self.orchestrator() {
            Ok(orchestrator) => orchestrator.send_message(message, cancel),
            Err(e) => Box::pin(futures_stream_once(AgentUpdate::error(e.to_string()))),
        }
    }

    pub fn get_conversation_history(&self) -> Vec<Message> {
        self.orchestrator
            .lock()
            .as_ref()
            .map(|o| o.history())
            .unwrap_or_default()
    }

    /// Clear the conversation; the system message survives.
    pub fn clear_conversation(&self) {
        if let Some(orchestrator) = self.orchestrator.lock().as_ref() {
            orchestrator.clear();
        }
    }

    // ── Direct tool execution ──────────────────────────────────────

    pub async fn execute_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        self.registry.execute(name, arguments, cancel).await
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.registry.list()
    }

    // ── Configuration ──────────────────────────────────────────────

    /// Credential-masked config view.
    pub fn get_config(&self) -> MaskedConfig {
        self.config.masked()
    }

    /// Apply a partial update and persist atomically. Changing the
    /// provider or model resets the lazy orchestrator so the next message
    /// uses the new settings.
    pub fn update_config<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        let before = self.config.snapshot();
        self.config.update(mutate)?;
        let after = self.config.snapshot();
        if before.agent_provider != after.agent_provider
            || before.agent_model != after.agent_model
        {
            tracing::info!("agent provider settings changed; conversation reset");
            *self.orchestrator.lock() = None;
        }
        Ok(())
    }
}

fn futures_stream_once(
    update: AgentUpdate,
) -> impl futures_core::Stream<Item = AgentUpdate> + Send {
    async_stream::stream! { yield update; }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (tempfile::TempDir, VideoEditorService) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::load(dir.path().join("cfg.json")).unwrap());
        let service = VideoEditorService::new(config).unwrap();
        (dir, service)
    }

    #[test]
    fn registry_is_fully_populated() {
        let (_dir, service) = service();
        let tools = service.list_tools();
        assert!(tools.len() >= 70);
        assert!(tools.iter().any(|t| t.name == "get_video_info"));
    }

    #[test]
    fn config_round_trips_through_the_facade() {
        let (_dir, service) = service();
        service
            .update_config(|c| c.agent_model = Some("gpt-4o-mini".into()))
            .unwrap();
        let masked = service.get_config();
        assert_eq!(masked.agent_model.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn unknown_tool_execution_fails_in_shape() {
        let (_dir, service) = service();
        let result = service
            .execute_tool("definitely_not_a_tool", serde_json::json!({}), CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(result.envelope().starts_with("Error: "));
    }

    #[test]
    fn empty_history_before_first_message() {
        let (_dir, service) = service();
        assert!(service.get_conversation_history().is_empty());
        // Clearing before any conversation exists is a no-op.
        service.clear_conversation();
    }
}
