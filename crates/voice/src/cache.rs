//! Voice-clone cache.
//!
//! The persistent map lives inside the configuration file (sample content
//! hash -> remote voice id); this module adds hashing, the liveness check,
//! and the single re-clone that is the system's only automatic retry.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use cf_domain::config::ConfigStore;
use cf_domain::error::Result;

use crate::elevenlabs::ElevenLabsClient;

/// SHA-256 of the sample file's bytes, hex-encoded.
pub fn hash_sample(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub struct VoiceCache {
    config: Arc<ConfigStore>,
    client: ElevenLabsClient,
}

impl VoiceCache {
    pub fn new(config: Arc<ConfigStore>, client: ElevenLabsClient) -> Self {
        Self { config, client }
    }

    pub fn client(&self) -> &ElevenLabsClient {
        &self.client
    }

    /// Resolve a voice id for a sample file.
    ///
    /// A cached id is probed for liveness first; an id the remote no longer
    /// knows is evicted and the sample re-cloned once. Fresh samples are
    /// registered and remembered under their content hash.
    pub async fn resolve(&self, sample: &Path, clone_name: &str) -> Result<String> {
        let hash = hash_sample(sample)?;

        if let Some(cached) = self.config.voice_for_sample(&hash) {
            if self.client.voice_exists(&cached).await? {
                tracing::debug!(hash = %&hash[..12], voice_id = %cached, "voice cache hit");
                return Ok(cached);
            }
            tracing::warn!(voice_id = %cached, "cached voice failed liveness probe, evicting");
            self.config.evict_voice(&hash)?;
        }

        let voice_id = self.client.clone_voice(clone_name, sample).await?;
        self.config.remember_voice(&hash, &voice_id)?;
        tracing::info!(voice_id = %voice_id, "voice cloned and cached");
        Ok(voice_id)
    }

    /// All cached (hash, voice id) pairs.
    pub fn list(&self) -> Vec<(String, String)> {
        self.config.cached_voices().into_iter().collect()
    }

    /// Forget a cached voice by sample hash; also removes it remotely on a
    /// best-effort basis.
    pub async fn clear(&self, sample_hash: &str) -> Result<bool> {
        let Some(voice_id) = self.config.voice_for_sample(sample_hash) else {
            return Ok(false);
        };
        if let Err(e) = self.client.delete_voice(&voice_id).await {
            tracing::warn!(voice_id = %voice_id, error = %e, "remote voice delete failed");
        }
        self.config.evict_voice(sample_hash)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_hash_is_stable_and_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        assert_eq!(hash_sample(&a).unwrap(), hash_sample(&b).unwrap());

        std::fs::write(&b, b"different").unwrap();
        assert_ne!(hash_sample(&a).unwrap(), hash_sample(&b).unwrap());
    }
}
