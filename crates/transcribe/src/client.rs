//! Remote transcription client (OpenAI audio transcriptions endpoint).
//!
//! Uploads are multipart with `verbose_json` response format and both word
//! and segment timestamp granularities requested. The response's top-level
//! word list is folded into segments by strict interval containment; words
//! straddling a segment seam are dropped.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use cf_domain::error::{Error, Result};
use cf_domain::transcript::{Segment, Transcript, Word};

const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(120);
const MODEL: &str = "whisper-1";

pub struct WhisperClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl WhisperClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TRANSCRIPTION_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key,
            client,
        })
    }

    /// Transcribe one audio file. The caller is responsible for keeping the
    /// upload under the remote size limit (see the pipeline's chunking).
    pub async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Transcript> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".into());

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("model", MODEL)
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .text("timestamp_granularities[]", "segment");
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        tracing::debug!(file = %audio.display(), "uploading audio for transcription");

        let resp = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout("transcription request".into())
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::RemoteApi {
                provider: "openai".into(),
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        parse_verbose_json(&body)
    }
}

// ── verbose_json response shapes ───────────────────────────────────

#[derive(Deserialize)]
struct VerboseResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    segments: Vec<RawSegment>,
    #[serde(default)]
    words: Vec<RawWord>,
}

#[derive(Deserialize)]
struct RawSegment {
    #[serde(default)]
    text: String,
    start: f64,
    end: f64,
}

#[derive(Deserialize)]
struct RawWord {
    word: String,
    start: f64,
    end: f64,
}

/// Parse a `verbose_json` payload, attaching words to segments by strict
/// containment of the word's interval in the segment's interval.
pub fn parse_verbose_json(raw: &str) -> Result<Transcript> {
    let resp: VerboseResponse = serde_json::from_str(raw)
        .map_err(|e| Error::TranscriptExtraction(format!("unparseable response: {e}")))?;

    if resp.segments.is_empty() {
        return Err(Error::TranscriptExtraction(
            "response contains no segments".into(),
        ));
    }

    let mut segments: Vec<Segment> = resp
        .segments
        .iter()
        .map(|s| Segment {
            text: s.text.trim().to_string(),
            start: s.start,
            end: s.end,
            words: resp
                .words
                .iter()
                .filter(|w| w.start >= s.start && w.end <= s.end)
                .map(|w| Word {
                    word: w.word.trim().to_string(),
                    start: w.start,
                    end: w.end,
                })
                .collect(),
        })
        .collect();

    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    let duration = if resp.duration > 0.0 {
        resp.duration
    } else {
        segments.last().map(|s| s.end).unwrap_or(0.0)
    };

    Ok(Transcript {
        text: resp.text.trim().to_string(),
        segments,
        duration,
        language: resp.language,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "text": "the quick brown fox",
        "language": "english",
        "duration": 3.2,
        "segments": [
            {"text": " the quick brown fox", "start": 0.0, "end": 3.2}
        ],
        "words": [
            {"word": "the", "start": 0.1, "end": 0.3},
            {"word": "quick", "start": 0.35, "end": 0.7},
            {"word": "brown", "start": 0.75, "end": 1.1},
            {"word": "fox", "start": 1.15, "end": 1.5}
        ]
    }"#;

    #[test]
    fn words_attach_to_containing_segment() {
        let t = parse_verbose_json(SAMPLE).unwrap();
        assert_eq!(t.segments.len(), 1);
        assert_eq!(t.segments[0].words.len(), 4);
        assert_eq!(t.segments[0].words[1].word, "quick");
        assert!((t.duration - 3.2).abs() < 1e-9);
    }

    #[test]
    fn straddling_words_are_dropped() {
        let raw = r#"{
            "text": "a b",
            "language": "en",
            "duration": 4.0,
            "segments": [
                {"text": "a", "start": 0.0, "end": 2.0},
                {"text": "b", "start": 2.0, "end": 4.0}
            ],
            "words": [
                {"word": "a", "start": 0.5, "end": 1.0},
                {"word": "seam", "start": 1.8, "end": 2.2},
                {"word": "b", "start": 2.5, "end": 3.0}
            ]
        }"#;
        let t = parse_verbose_json(raw).unwrap();
        let all: Vec<&str> = t.words().map(|w| w.word.as_str()).collect();
        assert_eq!(all, vec!["a", "b"]);
    }

    #[test]
    fn empty_segments_is_an_extraction_error() {
        let raw = r#"{"text": "", "segments": [], "words": []}"#;
        let err = parse_verbose_json(raw).unwrap_err();
        assert_eq!(err.kind(), "transcript_extraction_failed");
    }

    #[test]
    fn segments_come_back_sorted() {
        let raw = r#"{
            "text": "b a",
            "duration": 4.0,
            "segments": [
                {"text": "b", "start": 2.0, "end": 4.0},
                {"text": "a", "start": 0.0, "end": 2.0}
            ],
            "words": []
        }"#;
        let t = parse_verbose_json(raw).unwrap();
        assert!(t.segments[0].start < t.segments[1].start);
        assert!(t.validate().is_ok());
    }
}
