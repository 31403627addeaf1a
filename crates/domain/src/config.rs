//! Persistent configuration.
//!
//! One JSON file at `~/.mcp-video-config.json` holds API credentials, binary
//! paths, the chosen agent provider/model, and the voice-clone cache.
//! Environment variables override the corresponding fields at load time.
//! Unknown keys written by other versions survive a read/write round-trip.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = ".mcp-video-config.json";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentProviderKind {
    #[default]
    Openai,
    Claude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eleven_labs_key: Option<String>,

    #[serde(default)]
    pub agent_provider: AgentProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_model: Option<String>,
    #[serde(default)]
    pub default_quality: QualityPreset,

    #[serde(default = "d_ffmpeg")]
    pub ffmpeg_path: String,
    #[serde(default = "d_ffprobe")]
    pub ffprobe_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_project_dir: Option<String>,

    /// Audio-sample content hash -> remote cloned-voice id.
    #[serde(default)]
    pub eleven_labs_voices: BTreeMap<String, String>,

    /// Keys this version does not know about; preserved on round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn d_ffmpeg() -> String {
    "ffmpeg".into()
}

fn d_ffprobe() -> String {
    "ffprobe".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: None,
            claude_api_key: None,
            eleven_labs_key: None,
            agent_provider: AgentProviderKind::default(),
            agent_model: None,
            default_quality: QualityPreset::default(),
            ffmpeg_path: d_ffmpeg(),
            ffprobe_path: d_ffprobe(),
            last_project_dir: None,
            eleven_labs_voices: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Apply environment-variable overrides on top of the file contents.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            if !v.is_empty() {
                self.openai_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("CLAUDE_API_KEY") {
            if !v.is_empty() {
                self.claude_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("ELEVENLABS_API_KEY") {
            if !v.is_empty() {
                self.eleven_labs_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("FFMPEG_PATH") {
            if !v.is_empty() {
                self.ffmpeg_path = v;
            }
        }
        if let Ok(v) = std::env::var("FFPROBE_PATH") {
            if !v.is_empty() {
                self.ffprobe_path = v;
            }
        }
    }
}

/// The credential-free view returned by `get_config`: each secret collapses
/// to a has-key boolean.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedConfig {
    pub has_openai_key: bool,
    pub has_claude_api_key: bool,
    pub has_eleven_labs_key: bool,
    pub agent_provider: AgentProviderKind,
    pub agent_model: Option<String>,
    pub default_quality: QualityPreset,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub last_project_dir: Option<String>,
    pub cached_voices: usize,
}

impl From<&Config> for MaskedConfig {
    fn from(c: &Config) -> Self {
        Self {
            has_openai_key: c.openai_key.is_some(),
            has_claude_api_key: c.claude_api_key.is_some(),
            has_eleven_labs_key: c.eleven_labs_key.is_some(),
            agent_provider: c.agent_provider,
            agent_model: c.agent_model.clone(),
            default_quality: c.default_quality,
            ffmpeg_path: c.ffmpeg_path.clone(),
            ffprobe_path: c.ffprobe_path.clone(),
            last_project_dir: c.last_project_dir.clone(),
            cached_voices: c.eleven_labs_voices.len(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConfigStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Owns the config file path and the in-memory copy. All mutations go
/// through [`ConfigStore::update`], which rewrites the file atomically
/// (temp + rename) while holding the store's mutex; this also serializes
/// voice-cache updates.
pub struct ConfigStore {
    path: PathBuf,
    current: Mutex<Config>,
}

impl ConfigStore {
    /// Load from the default home-directory location.
    pub fn load_default() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?;
        Self::load(home.join(CONFIG_FILE_NAME))
    }

    /// Load from an explicit path, creating an in-memory default when the
    /// file does not exist yet. Env overrides are applied after the read.
    pub fn load(path: PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            Config::default()
        };
        config.apply_env();
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(Self {
            path,
            current: Mutex::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A point-in-time copy of the full config (credentials included).
    pub fn snapshot(&self) -> Config {
        self.current.lock().clone()
    }

    pub fn masked(&self) -> MaskedConfig {
        MaskedConfig::from(&*self.current.lock())
    }

    /// Mutate the config and persist the result atomically. The whole
    /// read-modify-write runs under the store mutex.
    pub fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut guard = self.current.lock();
        mutate(&mut guard);
        persist(&self.path, &guard)
    }

    // ── Voice-clone cache ──────────────────────────────────────────

    pub fn voice_for_sample(&self, sample_hash: &str) -> Option<String> {
        self.current.lock().eleven_labs_voices.get(sample_hash).cloned()
    }

    pub fn remember_voice(&self, sample_hash: &str, voice_id: &str) -> Result<()> {
        self.update(|c| {
            c.eleven_labs_voices
                .insert(sample_hash.to_owned(), voice_id.to_owned());
        })
    }

    /// Drop a cached voice id (used when the remote id fails liveness).
    pub fn evict_voice(&self, sample_hash: &str) -> Result<()> {
        self.update(|c| {
            c.eleven_labs_voices.remove(sample_hash);
        })
    }

    pub fn cached_voices(&self) -> BTreeMap<String, String> {
        self.current.lock().eleven_labs_voices.clone()
    }
}

fn persist(path: &Path, config: &Config) -> Result<()> {
    let raw = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, raw.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), "configuration persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_point_at_binaries_on_path() {
        let c = Config::default();
        assert_eq!(c.ffmpeg_path, "ffmpeg");
        assert_eq!(c.ffprobe_path, "ffprobe");
        assert_eq!(c.agent_provider, AgentProviderKind::Openai);
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = r#"{
            "openaiKey": "sk-test",
            "futureFeatureFlag": { "enabled": true },
            "elevenLabsVoices": { "abc123": "voice_1" }
        }"#;
        let parsed: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.openai_key.as_deref(), Some("sk-test"));
        assert_eq!(
            parsed.eleven_labs_voices.get("abc123").map(String::as_str),
            Some("voice_1")
        );
        let rewritten = serde_json::to_string(&parsed).unwrap();
        assert!(rewritten.contains("futureFeatureFlag"));
    }

    #[test]
    fn update_persists_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let store = ConfigStore::load(path.clone()).unwrap();
        store
            .update(|c| c.agent_model = Some("gpt-4o".into()))
            .unwrap();

        let reloaded = ConfigStore::load(path).unwrap();
        assert_eq!(reloaded.snapshot().agent_model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn voice_cache_insert_and_evict() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("cfg.json")).unwrap();
        store.remember_voice("hash1", "voice_a").unwrap();
        assert_eq!(store.voice_for_sample("hash1").as_deref(), Some("voice_a"));
        store.evict_voice("hash1").unwrap();
        assert!(store.voice_for_sample("hash1").is_none());
    }

    #[test]
    fn masked_view_hides_secrets() {
        let mut c = Config::default();
        c.claude_api_key = Some("sk-ant-secret".into());
        let masked = MaskedConfig::from(&c);
        assert!(masked.has_claude_api_key);
        assert!(!masked.has_openai_key);
        let json = serde_json::to_string(&masked).unwrap();
        assert!(!json.contains("sk-ant-secret"));
    }
}
