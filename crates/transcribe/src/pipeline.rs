//! Extraction and chunking around the remote transcription call.
//!
//! Audio is pulled out of the container at mono / 16 kHz / 64 kbit/s, the
//! smallest encoding that stays inside the remote model's accuracy sweet
//! spot. Files over the chunk threshold are split into fixed-duration
//! copy-encoded chunks, transcribed sequentially, and reassembled with
//! timestamps shifted by the running offset.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_domain::transcript::Transcript;
use cf_media::{probe_media, MediaRunner};

use crate::client::WhisperClient;

/// Just under the remote API's 25 MiB upload limit.
pub const CHUNK_THRESHOLD_BYTES: u64 = 24 * 1024 * 1024;

/// Fixed chunk duration for oversized audio.
pub const CHUNK_SECONDS: u32 = 600;

pub struct TranscriptPipeline {
    runner: MediaRunner,
    client: WhisperClient,
    scratch_dir: PathBuf,
}

impl TranscriptPipeline {
    pub fn new(runner: MediaRunner, client: WhisperClient, scratch_dir: PathBuf) -> Self {
        Self {
            runner,
            client,
            scratch_dir,
        }
    }

    /// Extract a word-timed transcript from any media file.
    pub async fn extract(
        &self,
        cancel: &CancellationToken,
        media: &Path,
        language: Option<&str>,
    ) -> Result<Transcript> {
        cf_media::fsops::require_readable(media)?;
        std::fs::create_dir_all(&self.scratch_dir)?;

        let scratch = self
            .scratch_dir
            .join(format!("transcribe-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&scratch)?;
        let guard = ScratchGuard(scratch.clone());

        let audio = scratch.join("audio.mp3");
        self.extract_audio(cancel, media, &audio).await?;

        let size = std::fs::metadata(&audio)?.len();
        let transcript = if size <= CHUNK_THRESHOLD_BYTES {
            tracing::debug!(bytes = size, "transcribing in a single request");
            self.client.transcribe(&audio, language).await?
        } else {
            tracing::debug!(bytes = size, "audio over chunk threshold, splitting");
            self.transcribe_chunked(cancel, &audio, &scratch, language)
                .await?
        };

        drop(guard);
        transcript.validate()?;
        Ok(transcript)
    }

    /// Extract transcription-ready audio: single channel, 16 kHz, 64 kbit/s.
    async fn extract_audio(
        &self,
        cancel: &CancellationToken,
        media: &Path,
        out: &Path,
    ) -> Result<()> {
        let media_s = media.to_string_lossy();
        let out_s = out.to_string_lossy();
        self.runner
            .execute(
                cancel,
                &[
                    "-i", media_s.as_ref(),
                    "-vn",
                    "-ac", "1",
                    "-ar", "16000",
                    "-b:a", "64k",
                    out_s.as_ref(),
                ],
            )
            .await
            .map_err(|e| e.context("audio extraction for transcription"))
    }

    async fn transcribe_chunked(
        &self,
        cancel: &CancellationToken,
        audio: &Path,
        scratch: &Path,
        language: Option<&str>,
    ) -> Result<Transcript> {
        let info = probe_media(&self.runner, cancel, audio).await?;
        let total = info.duration;
        if total <= 0.0 {
            return Err(Error::TranscriptExtraction(
                "extracted audio has no duration".into(),
            ));
        }

        let audio_s = audio.to_string_lossy();
        let mut merged = Transcript {
            text: String::new(),
            segments: Vec::new(),
            duration: 0.0,
            language: String::new(),
        };
        let mut offset = 0.0_f64;
        let mut chunk_start = 0.0_f64;
        let mut index = 0usize;

        while chunk_start < total {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let chunk_path = scratch.join(format!("chunk_{index:03}.mp3"));
            let chunk_s = chunk_path.to_string_lossy();
            self.runner
                .execute(
                    cancel,
                    &[
                        "-ss", &format!("{chunk_start}"),
                        "-t", &format!("{CHUNK_SECONDS}"),
                        "-i", audio_s.as_ref(),
                        "-c", "copy",
                        chunk_s.as_ref(),
                    ],
                )
                .await
                .map_err(|e| {
                    Error::TranscriptExtraction(format!("chunk {index}: split failed: {e}"))
                })?;

            let chunk = self
                .client
                .transcribe(&chunk_path, language)
                .await
                .map_err(|e| {
                    Error::TranscriptExtraction(format!("chunk {index}: {e}"))
                })?;

            // Shift by the cumulative offset: the sum of the prior chunks'
            // final segment ends, not the nominal chunk duration.
            let chunk_end = chunk.segments.last().map(|s| s.end).unwrap_or(0.0);
            for mut segment in chunk.segments {
                segment.start += offset;
                segment.end += offset;
                for word in &mut segment.words {
                    word.start += offset;
                    word.end += offset;
                }
                merged.segments.push(segment);
            }
            if !merged.text.is_empty() && !chunk.text.is_empty() {
                merged.text.push(' ');
            }
            merged.text.push_str(&chunk.text);
            if merged.language.is_empty() {
                merged.language = chunk.language;
            }

            offset += chunk_end;
            chunk_start += f64::from(CHUNK_SECONDS);
            index += 1;
        }

        merged
            .segments
            .sort_by(|a, b| a.start.total_cmp(&b.start));
        merged.duration = merged.segments.last().map(|s| s.end).unwrap_or(0.0);

        tracing::debug!(chunks = index, segments = merged.segments.len(), "chunked transcription merged");
        Ok(merged)
    }
}

/// Removes the per-extraction scratch directory, including on early error
/// returns and cancellation.
struct ScratchGuard(PathBuf);

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            if self.0.exists() {
                tracing::warn!(path = %self.0.display(), error = %e, "failed to remove scratch dir");
            }
        }
    }
}

