//! ElevenLabs client: voice cloning, speech synthesis, and the liveness
//! probe the cache uses before trusting a stored voice id.

use std::path::Path;
use std::time::Duration;

use cf_domain::error::{Error, Result};

const TTS_TIMEOUT: Duration = Duration::from_secs(120);
const TTS_MODEL: &str = "eleven_multilingual_v2";

pub struct ElevenLabsClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ElevenLabsClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TTS_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: "https://api.elevenlabs.io".into(),
            api_key,
            client,
        })
    }

    fn api_error(&self, status: u16, body: String) -> Error {
        Error::RemoteApi {
            provider: "elevenlabs".into(),
            status,
            message: body.chars().take(500).collect(),
        }
    }

    /// Register a voice sample with the cloning service; returns the new
    /// voice id.
    pub async fn clone_voice(&self, name: &str, sample: &Path) -> Result<String> {
        let bytes = tokio::fs::read(sample).await?;
        let file_name = sample
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample.mp3".into());

        let form = reqwest::multipart::Form::new()
            .text("name", name.to_string())
            .part(
                "files",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        tracing::debug!(name, sample = %sample.display(), "registering voice clone");

        let resp = self
            .client
            .post(format!("{}/v1/voices/add", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(self.api_error(status.as_u16(), body));
        }

        let v: serde_json::Value = serde_json::from_str(&body)?;
        v.get("voice_id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| self.api_error(status.as_u16(), "response missing voice_id".into()))
    }

    /// Synthesize speech with a cloned voice, writing MP3 bytes to `out`.
    pub async fn generate_speech(&self, voice_id: &str, text: &str, out: &Path) -> Result<()> {
        tracing::debug!(voice_id, chars = text.len(), "synthesizing speech");

        let resp = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{voice_id}",
                self.base_url
            ))
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": TTS_MODEL,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout("speech synthesis".into())
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.api_error(status.as_u16(), body));
        }

        let bytes = resp.bytes().await.map_err(|e| Error::Http(e.to_string()))?;
        tokio::fs::write(out, &bytes).await?;
        Ok(())
    }

    /// Liveness probe: does the remote side still know this voice id?
    pub async fn voice_exists(&self, voice_id: &str) -> Result<bool> {
        let resp = self
            .client
            .get(format!("{}/v1/voices/{voice_id}", self.base_url))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        match resp.status().as_u16() {
            200 => Ok(true),
            400 | 404 => Ok(false),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(self.api_error(status, body))
            }
        }
    }

    /// Remove a cloned voice from the remote service.
    pub async fn delete_voice(&self, voice_id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(format!("{}/v1/voices/{voice_id}", self.base_url))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if status.is_success() || status.as_u16() == 404 {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(self.api_error(status.as_u16(), body))
        }
    }
}
