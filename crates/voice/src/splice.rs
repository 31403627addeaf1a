//! Word-replacement splicer.
//!
//! Locates a phrase in the transcript at word precision, synthesizes the
//! replacement with a cloned voice, splices it into the original audio with
//! 50 ms crossfades at both seams, and remuxes with the untouched video
//! stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cf_analysis::matching::find_phrase;
use cf_domain::error::{Error, Result};
use cf_domain::transcript::{TimeRange, Transcript};
use cf_media::fsops::{self, StagedOutput};
use cf_media::{probe_media, MediaRunner};
use cf_transcribe::{TranscriptCache, TranscriptPipeline};

use crate::cache::VoiceCache;

/// Crossfade applied at each splice seam.
const CROSSFADE_SECS: f64 = 0.05;

/// Length of the auto-extracted voice sample.
const AUTO_SAMPLE_SECS: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub search_phrase: String,
    pub replacement_text: String,
    /// Occurrence to replace; `-1` replaces all in ascending start order.
    pub match_index: i64,
    pub voice_sample: Option<PathBuf>,
    pub voice_id: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReplaceSummary {
    pub output: PathBuf,
    pub replaced: usize,
    pub ranges: Vec<TimeRange>,
}

pub struct WordSplicer {
    runner: MediaRunner,
    transcripts: Arc<TranscriptPipeline>,
    transcript_cache: Arc<TranscriptCache>,
    voices: VoiceCache,
    scratch_dir: PathBuf,
}

impl WordSplicer {
    pub fn new(
        runner: MediaRunner,
        transcripts: Arc<TranscriptPipeline>,
        transcript_cache: Arc<TranscriptCache>,
        voices: VoiceCache,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            runner,
            transcripts,
            transcript_cache,
            voices,
            scratch_dir,
        }
    }

    pub async fn replace(
        &self,
        cancel: &CancellationToken,
        req: &ReplaceRequest,
    ) -> Result<ReplaceSummary> {
        fsops::require_readable(&req.input)?;
        fsops::reject_in_place(&req.input, &req.output)?;

        let transcript = self.transcript_for(cancel, &req.input, req.language.as_deref()).await?;

        let hits = find_phrase(&transcript, &req.search_phrase);
        if hits.is_empty() {
            return Err(Error::Other(format!(
                "not_found: phrase \"{}\" does not occur in the transcript",
                req.search_phrase
            )));
        }
        let targets: Vec<TimeRange> = if req.match_index >= 0 {
            let idx = req.match_index as usize;
            let hit = hits.get(idx).ok_or_else(|| {
                Error::Other(format!(
                    "not_found: match index {idx} out of range ({} occurrences)",
                    hits.len()
                ))
            })?;
            vec![*hit]
        } else {
            hits.clone()
        };

        let info = probe_media(&self.runner, cancel, &req.input).await?;
        let total = info.duration;

        let scratch = self
            .scratch_dir
            .join(format!("replace-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&scratch)?;
        let _guard = ScratchGuard(scratch.clone());

        let voice_id = self
            .resolve_voice(cancel, req, targets.first().copied(), total, &scratch)
            .await?;

        // Pull the full-quality audio track out once and splice in place.
        let mut working = scratch.join("working.wav");
        self.extract_track(cancel, &req.input, &working).await?;

        let mut shift = 0.0_f64;
        for (i, target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let raw = scratch.join(format!("tts_{i}.mp3"));
            self.voices
                .client()
                .generate_speech(&voice_id, &req.replacement_text, &raw)
                .await?;

            let normalized = scratch.join(format!("tts_{i}.wav"));
            self.normalize_loudness(cancel, &raw, &normalized).await?;
            let replacement_len = probe_media(&self.runner, cancel, &normalized)
                .await?
                .duration;

            // Later matches drift by the accumulated length difference of
            // the splices already applied.
            let range = TimeRange {
                start: target.start + shift,
                end: target.end + shift,
            };
            let next = scratch.join(format!("spliced_{i}.wav"));
            let working_len = probe_media(&self.runner, cancel, &working).await?.duration;
            self.splice_once(cancel, &working, &normalized, &next, range, working_len)
                .await?;
            shift += replacement_len - target.duration() - 2.0 * CROSSFADE_SECS;
            working = next;
        }

        // Reassemble the container.
        let stage = StagedOutput::new(&req.output)?;
        let out_s = stage.path().to_string_lossy().into_owned();
        let working_s = working.to_string_lossy();
        let input_s = req.input.to_string_lossy();
        let ext = req
            .output
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();

        if info.is_video() {
            // Copy the video stream untouched, swap the audio, end at the
            // shorter of the two.
            self.runner
                .execute(
                    cancel,
                    &[
                        "-i", input_s.as_ref(),
                        "-i", working_s.as_ref(),
                        "-map", "0:v:0",
                        "-map", "1:a:0",
                        "-c:v", "copy",
                        "-shortest",
                        "-f", container_format(&ext),
                        &out_s,
                    ],
                )
                .await?;
        } else {
            self.runner
                .execute(
                    cancel,
                    &[
                        "-i", working_s.as_ref(),
                        "-f", container_format(&ext),
                        &out_s,
                    ],
                )
                .await?;
        }
        let output = stage.commit()?;

        tracing::info!(
            output = %output.display(),
            replaced = targets.len(),
            "word replacement complete"
        );
        Ok(ReplaceSummary {
            output,
            replaced: targets.len(),
            ranges: targets,
        })
    }

    async fn transcript_for(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        language: Option<&str>,
    ) -> Result<Transcript> {
        if let Some(cached) = self.transcript_cache.get(input) {
            return Ok(cached);
        }
        let transcript = self.transcripts.extract(cancel, input, language).await?;
        self.transcript_cache.put(input, transcript.clone());
        Ok(transcript)
    }

    async fn resolve_voice(
        &self,
        cancel: &CancellationToken,
        req: &ReplaceRequest,
        first_match: Option<TimeRange>,
        total: f64,
        scratch: &Path,
    ) -> Result<String> {
        if let Some(id) = &req.voice_id {
            return Ok(id.clone());
        }
        if let Some(sample) = &req.voice_sample {
            fsops::require_readable(sample)?;
            return self.voices.resolve(sample, "clipforge-clone").await;
        }

        // Fall back to a sample centered on the first match.
        let mid = first_match.map(|r| (r.start + r.end) / 2.0).unwrap_or(0.0);
        let start = (mid - AUTO_SAMPLE_SECS / 2.0).clamp(0.0, (total - 1.0).max(0.0));
        let sample = scratch.join("voice_sample.mp3");
        let input_s = req.input.to_string_lossy();
        let sample_s = sample.to_string_lossy();
        self.runner
            .execute(
                cancel,
                &[
                    "-ss", &format!("{start:.3}"),
                    "-t", &format!("{AUTO_SAMPLE_SECS}"),
                    "-i", input_s.as_ref(),
                    "-vn",
                    "-ac", "1",
                    sample_s.as_ref(),
                ],
            )
            .await?;
        self.voices.resolve(&sample, "clipforge-clone").await
    }

    async fn extract_track(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        out: &Path,
    ) -> Result<()> {
        let input_s = input.to_string_lossy();
        let out_s = out.to_string_lossy();
        self.runner
            .execute(
                cancel,
                &[
                    "-i", input_s.as_ref(),
                    "-vn",
                    "-acodec", "pcm_s16le",
                    "-ar", "48000",
                    "-ac", "2",
                    out_s.as_ref(),
                ],
            )
            .await
    }

    async fn normalize_loudness(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        out: &Path,
    ) -> Result<()> {
        let input_s = input.to_string_lossy();
        let out_s = out.to_string_lossy();
        self.runner
            .execute(
                cancel,
                &[
                    "-i", input_s.as_ref(),
                    "-af", "loudnorm",
                    "-ar", "48000",
                    "-ac", "2",
                    out_s.as_ref(),
                ],
            )
            .await
    }

    async fn splice_once(
        &self,
        cancel: &CancellationToken,
        working: &Path,
        replacement: &Path,
        out: &Path,
        range: TimeRange,
        total: f64,
    ) -> Result<()> {
        let filter = splice_filter(range.start, range.end, total);
        let working_s = working.to_string_lossy();
        let replacement_s = replacement.to_string_lossy();
        let out_s = out.to_string_lossy();
        self.runner
            .execute(
                cancel,
                &[
                    "-i", working_s.as_ref(),
                    "-i", replacement_s.as_ref(),
                    "-filter_complex", &filter,
                    "-map", "[out]",
                    out_s.as_ref(),
                ],
            )
            .await
    }
}

/// Build the splice filter graph for one replacement.
///
/// Out-of-range boundaries are clipped: a match starting at (or before)
/// zero has no leading segment, one ending at (or past) the total duration
/// has no trailing segment. Each surviving seam gets a 50 ms crossfade.
pub fn splice_filter(start: f64, end: f64, total: f64) -> String {
    let start = start.clamp(0.0, total);
    let end = end.clamp(start, total);
    let has_pre = start > CROSSFADE_SECS;
    let has_post = end < total - CROSSFADE_SECS;

    match (has_pre, has_post) {
        (true, true) => format!(
            "[0:a]atrim=end={start:.3},asetpts=PTS-STARTPTS[pre];\
             [0:a]atrim=start={end:.3},asetpts=PTS-STARTPTS[post];\
             [pre][1:a]acrossfade=d={CROSSFADE_SECS}[mid];\
             [mid][post]acrossfade=d={CROSSFADE_SECS}[out]"
        ),
        (true, false) => format!(
            "[0:a]atrim=end={start:.3},asetpts=PTS-STARTPTS[pre];\
             [pre][1:a]acrossfade=d={CROSSFADE_SECS}[out]"
        ),
        (false, true) => format!(
            "[0:a]atrim=start={end:.3},asetpts=PTS-STARTPTS[post];\
             [1:a][post]acrossfade=d={CROSSFADE_SECS}[out]"
        ),
        (false, false) => "[1:a]acopy[out]".to_string(),
    }
}

fn container_format(ext: &str) -> &'static str {
    match ext {
        "mp4" | "m4v" | "mov" => "mp4",
        "mkv" => "matroska",
        "webm" => "webm",
        "wav" => "wav",
        "flac" => "flac",
        "ogg" => "ogg",
        "m4a" | "aac" => "ipod",
        _ => "mp3",
    }
}

struct ScratchGuard(PathBuf);

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_match_gets_both_seams() {
        let f = splice_filter(2.10, 2.90, 10.0);
        assert!(f.contains("atrim=end=2.100"));
        assert!(f.contains("atrim=start=2.900"));
        assert_eq!(f.matches("acrossfade").count(), 2);
    }

    #[test]
    fn match_at_file_start_clips_leading_segment() {
        let f = splice_filter(-0.2, 1.5, 10.0);
        assert!(!f.contains("[pre]"));
        assert!(f.contains("atrim=start=1.500"));
        assert_eq!(f.matches("acrossfade").count(), 1);
    }

    #[test]
    fn match_at_file_end_clips_trailing_segment() {
        let f = splice_filter(8.0, 10.4, 10.0);
        assert!(f.contains("atrim=end=8.000"));
        assert!(!f.contains("[post]"));
        assert_eq!(f.matches("acrossfade").count(), 1);
    }

    #[test]
    fn whole_file_match_degenerates_to_replacement_only() {
        let f = splice_filter(0.0, 10.0, 10.0);
        assert_eq!(f, "[1:a]acopy[out]");
    }

    #[test]
    fn container_formats_for_common_extensions() {
        assert_eq!(container_format("mp4"), "mp4");
        assert_eq!(container_format("mkv"), "matroska");
        assert_eq!(container_format("mp3"), "mp3");
    }
}
