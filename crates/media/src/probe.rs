//! ffprobe JSON parsing.
//!
//! `probe_media` runs `ffprobe -print_format json -show_format -show_streams`
//! and reduces the response to the handful of fields the tool catalogue and
//! analyzers actually consume.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};

use crate::runner::MediaRunner;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: f64,
    pub container: String,
    pub size_bytes: u64,
    pub bit_rate: u64,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub pix_fmt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_rate: u64,
}

impl MediaInfo {
    pub fn is_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Probe one file.
pub async fn probe_media(
    runner: &MediaRunner,
    cancel: &CancellationToken,
    path: &Path,
) -> Result<MediaInfo> {
    crate::fsops::require_readable(path)?;
    let path_str = path.to_string_lossy();
    let raw = runner
        .probe(
            cancel,
            &[
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                path_str.as_ref(),
            ],
        )
        .await?;
    parse_media_info(&raw)
}

// ── Raw ffprobe shapes ─────────────────────────────────────────────

#[derive(Deserialize)]
struct RawProbe {
    #[serde(default)]
    streams: Vec<RawStream>,
    format: Option<RawFormat>,
}

#[derive(Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct RawStream {
    #[serde(default)]
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    bit_rate: Option<String>,
}

pub fn parse_media_info(raw: &str) -> Result<MediaInfo> {
    let probe: RawProbe = serde_json::from_str(raw)
        .map_err(|e| Error::Other(format!("unparseable probe output: {e}")))?;
    let format = probe
        .format
        .ok_or_else(|| Error::Other("probe output has no format section".into()))?;

    let duration = format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let size_bytes = format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let bit_rate = format
        .bit_rate
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let mut video = None;
    let mut audio = None;
    for stream in &probe.streams {
        match stream.codec_type.as_str() {
            "video" if video.is_none() => {
                video = Some(VideoStreamInfo {
                    codec: stream.codec_name.clone(),
                    width: stream.width.unwrap_or(0),
                    height: stream.height.unwrap_or(0),
                    fps: stream
                        .r_frame_rate
                        .as_deref()
                        .map(parse_frame_rate)
                        .unwrap_or(0.0),
                    pix_fmt: stream.pix_fmt.clone().unwrap_or_default(),
                });
            }
            "audio" if audio.is_none() => {
                audio = Some(AudioStreamInfo {
                    codec: stream.codec_name.clone(),
                    sample_rate: stream
                        .sample_rate
                        .as_deref()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                    channels: stream.channels.unwrap_or(0),
                    bit_rate: stream
                        .bit_rate
                        .as_deref()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                });
            }
            _ => {}
        }
    }

    Ok(MediaInfo {
        duration,
        container: format.format_name,
        size_bytes,
        bit_rate,
        video,
        audio,
    })
}

/// ffprobe reports frame rate as a rational like `30000/1001`.
fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().unwrap_or(0.0);
            let den: f64 = den.parse().unwrap_or(1.0);
            if den == 0.0 {
                0.0
            } else {
                num / den
            }
        }
        None => rate.parse().unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001",
                "pix_fmt": "yuv420p"
            },
            {
                "codec_type": "audio",
                "codec_name": "aac",
                "sample_rate": "48000",
                "channels": 2,
                "bit_rate": "128000"
            }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "10.000000",
            "size": "1048576",
            "bit_rate": "838860"
        }
    }"#;

    #[test]
    fn parses_video_and_audio_streams() {
        let info = parse_media_info(SAMPLE).unwrap();
        assert!((info.duration - 10.0).abs() < 1e-9);
        assert_eq!(info.size_bytes, 1_048_576);
        let v = info.video.unwrap();
        assert_eq!(v.codec, "h264");
        assert_eq!((v.width, v.height), (1920, 1080));
        assert!((v.fps - 29.97).abs() < 0.01);
        let a = info.audio.unwrap();
        assert_eq!(a.sample_rate, 48_000);
        assert_eq!(a.channels, 2);
    }

    #[test]
    fn audio_only_files_have_no_video_stream() {
        let raw = r#"{
            "streams": [{"codec_type":"audio","codec_name":"mp3","sample_rate":"44100","channels":1}],
            "format": {"format_name":"mp3","duration":"65.3","size":"523000","bit_rate":"64000"}
        }"#;
        let info = parse_media_info(raw).unwrap();
        assert!(!info.is_video());
        assert!(info.has_audio());
    }

    #[test]
    fn frame_rate_rational_with_zero_denominator() {
        assert_eq!(parse_frame_rate("30/0"), 0.0);
        assert!((parse_frame_rate("25") - 25.0).abs() < 1e-9);
    }
}
