//! The tool catalogue and its registry.
//!
//! Every tool obeys the same contract: a JSON-schema'd argument object in,
//! a [`cf_domain::tool::ToolResult`] out, never a panic and never an `Err`
//! escaping the registry. Handlers build their remote clients from the
//! current configuration snapshot at call time, so credentials added
//! mid-session take effect without a restart.

pub mod args;
pub mod registry;

mod audio_tools;
mod composite;
mod diagram;
mod effects;
mod multitake_tools;
mod text;
mod timeline;
mod transcript_tools;
mod transitions;
mod video;
mod vision;
mod voice_tools;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cf_domain::config::ConfigStore;
use cf_domain::error::{Error, Result};
use cf_domain::transcript::Transcript;
use cf_media::MediaRunner;
use cf_multitake::{MultiTakeManager, ProjectStore};
use cf_providers::LlmProvider;
use cf_transcribe::{TranscriptCache, TranscriptPipeline, WhisperClient};
use cf_voice::{ElevenLabsClient, VoiceCache, WordSplicer};

pub use registry::ToolRegistry;
pub use timeline::TimelineStore;

/// Shared dependencies handed to every tool at registration time.
pub struct ToolDeps {
    pub config: Arc<ConfigStore>,
    pub transcript_cache: Arc<TranscriptCache>,
    pub timelines: Arc<TimelineStore>,
    pub project_store: Arc<ProjectStore>,
    pub scratch_dir: PathBuf,
}

impl ToolDeps {
    /// Standard wiring: project store under `~/.clipforge/projects`,
    /// scratch under the system temp dir.
    pub fn new(config: Arc<ConfigStore>) -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?;
        let project_store = Arc::new(ProjectStore::new(home.join(".clipforge").join("projects"))?);
        let scratch_dir = std::env::temp_dir().join("clipforge");
        std::fs::create_dir_all(&scratch_dir)?;
        Ok(Self {
            config,
            transcript_cache: Arc::new(TranscriptCache::new()),
            timelines: Arc::new(TimelineStore::new()),
            project_store,
            scratch_dir,
        })
    }

    pub fn runner(&self) -> MediaRunner {
        MediaRunner::from_config(&self.config.snapshot())
    }

    fn openai_key(&self) -> Result<String> {
        self.config
            .snapshot()
            .openai_key
            .ok_or_else(|| Error::NoCredentials("openaiKey / OPENAI_API_KEY".into()))
    }

    pub fn whisper(&self) -> Result<WhisperClient> {
        WhisperClient::new(self.openai_key()?)
    }

    pub fn transcripts(&self) -> Result<TranscriptPipeline> {
        Ok(TranscriptPipeline::new(
            self.runner(),
            self.whisper()?,
            self.scratch_dir.clone(),
        ))
    }

    /// Cached transcript lookup shared by the transcript and voice tools.
    pub async fn transcript_for(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        language: Option<&str>,
    ) -> Result<Transcript> {
        if let Some(cached) = self.transcript_cache.get(path) {
            return Ok(cached);
        }
        let transcript = self.transcripts()?.extract(cancel, path, language).await?;
        self.transcript_cache.put(path, transcript.clone());
        Ok(transcript)
    }

    pub fn elevenlabs(&self) -> Result<ElevenLabsClient> {
        let key = self
            .config
            .snapshot()
            .eleven_labs_key
            .ok_or_else(|| Error::NoCredentials("elevenLabsKey / ELEVENLABS_API_KEY".into()))?;
        ElevenLabsClient::new(key)
    }

    pub fn voice_cache(&self) -> Result<VoiceCache> {
        Ok(VoiceCache::new(self.config.clone(), self.elevenlabs()?))
    }

    pub fn splicer(&self) -> Result<WordSplicer> {
        Ok(WordSplicer::new(
            self.runner(),
            Arc::new(self.transcripts()?),
            self.transcript_cache.clone(),
            self.voice_cache()?,
            self.scratch_dir.clone(),
        ))
    }

    /// The configured agent provider, required to support image input.
    pub fn vision_provider(&self) -> Result<Arc<dyn LlmProvider>> {
        let provider = cf_providers::provider_from_config(&self.config.snapshot())?;
        if !provider.supports_vision() {
            return Err(Error::NoCredentials(format!(
                "provider {} does not accept image input",
                provider.provider_id()
            )));
        }
        Ok(provider)
    }

    /// Multi-take manager bound to the current config. Analysis needs the
    /// transcription credential; tools that require it check before calling
    /// (an absent key only fails once analysis actually uploads).
    pub fn multitake(&self) -> Result<MultiTakeManager> {
        let config = self.config.snapshot();
        let whisper = WhisperClient::new(config.openai_key.clone().unwrap_or_default())?;
        let transcripts = Arc::new(TranscriptPipeline::new(
            self.runner(),
            whisper,
            self.scratch_dir.clone(),
        ));
        let default_root = config
            .last_project_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("clipforge-projects")
            });
        Ok(MultiTakeManager::new(
            self.project_store.clone(),
            self.runner(),
            transcripts,
            default_root,
        ))
    }

    pub fn require_transcription_key(&self) -> Result<()> {
        self.openai_key().map(drop)
    }
}

/// Build the full registry. Called once at startup; the registry is
/// read-only afterwards.
pub fn build_registry(deps: Arc<ToolDeps>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    video::register(&mut registry, &deps)?;
    effects::register(&mut registry, &deps)?;
    composite::register(&mut registry, &deps)?;
    transitions::register(&mut registry, &deps)?;
    text::register(&mut registry, &deps)?;
    audio_tools::register(&mut registry, &deps)?;
    transcript_tools::register(&mut registry, &deps)?;
    vision::register(&mut registry, &deps)?;
    voice_tools::register(&mut registry, &deps)?;
    timeline::register(&mut registry, &deps)?;
    multitake_tools::register(&mut registry, &deps)?;
    diagram::register(&mut registry, &deps)?;
    tracing::info!(tools = registry.len(), "tool registry built");
    Ok(registry)
}

/// Shorthand for a tool definition.
pub(crate) fn tool_def(
    name: &str,
    description: &str,
    parameters: serde_json::Value,
) -> cf_domain::tool::ToolDefinition {
    cf_domain::tool::ToolDefinition {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps_for_test() -> Arc<ToolDeps> {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::load(dir.path().join("cfg.json")).unwrap());
        let project_store = Arc::new(ProjectStore::new(dir.path().join("projects")).unwrap());
        Arc::new(ToolDeps {
            config,
            transcript_cache: Arc::new(TranscriptCache::new()),
            timelines: Arc::new(TimelineStore::new()),
            project_store,
            scratch_dir: dir.path().join("scratch"),
        })
    }

    #[test]
    fn full_registry_builds_with_expected_tool_count() {
        let registry = build_registry(deps_for_test()).unwrap();
        // The catalogue: 11 video + 6 effects + 2 composite + 2 transitions
        // + 3 text + 13 audio + 4 transcript + 5 vision + 5 voice +
        // 7 timeline + 10 multi-take + 4 diagram.
        assert_eq!(registry.len(), 72);
        assert!(registry.get("trim_video").is_some());
        assert!(registry.get("replace_word").is_some());
        assert!(registry.get("assemble_best_takes").is_some());
    }

    #[test]
    fn registry_list_is_schema_complete() {
        let registry = build_registry(deps_for_test()).unwrap();
        for def in registry.list() {
            assert!(!def.description.is_empty(), "{} lacks a description", def.name);
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
        }
    }
}
