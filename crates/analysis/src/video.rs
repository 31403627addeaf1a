//! Visual quality measurement.
//!
//! Roughly ten evenly-spaced frames go through `signalstats` (brightness,
//! contrast, color balance, inter-frame difference) and a second pass
//! through `edgedetect` + `signalstats` whose mean luma approximates edge
//! density, i.e. sharpness. Stabilization is estimated from the variance of
//! the inter-frame difference sequence; compression artifacts from
//! bits-per-pixel; resolution, framerate and codec sit on fixed curves.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_media::{MediaInfo, MediaRunner};

/// Target number of sampled frames.
const SAMPLE_FRAMES: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoQuality {
    /// Mean luma, 0-255.
    pub brightness: f64,
    /// Mean (YHIGH - YLOW) / 255, 0-1.
    pub contrast: f64,
    /// Edge density estimate, 0-1.
    pub sharpness: f64,
    /// Chroma offset from neutral, 0-1 (0 = strong cast, 1 = balanced).
    pub color_balance: f64,
    /// 0-1; higher = steadier.
    pub stabilization: f64,
    /// Bits per pixel, `bitrate / (width x height)`.
    pub bits_per_pixel: f64,
    /// 0-1 score derived from bits-per-pixel.
    pub artifact_score: f64,
    pub resolution_score: f64,
    pub framerate_score: f64,
    pub codec_score: f64,
    /// Composite 0-100 used as the video term of the overall score.
    pub score: f64,
}

/// Per-frame numbers from one signalstats pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub yavg: f64,
    pub ylow: f64,
    pub yhigh: f64,
    pub uavg: f64,
    pub vavg: f64,
    pub ydif: f64,
}

/// Measure visual quality for one file.
pub async fn measure_video(
    runner: &MediaRunner,
    cancel: &CancellationToken,
    path: &Path,
    info: &MediaInfo,
) -> Result<VideoQuality> {
    let video = info
        .video
        .as_ref()
        .ok_or_else(|| Error::Other(format!("no video stream in {}", path.display())))?;

    let frames = sample_signalstats(runner, cancel, path, info.duration, false).await?;
    let edge_frames = sample_signalstats(runner, cancel, path, info.duration, true).await?;
    if frames.is_empty() {
        return Err(Error::Other("signalstats produced no frames".into()));
    }

    let sharpness_raw = if edge_frames.is_empty() {
        0.0
    } else {
        mean(edge_frames.iter().map(|f| f.yavg)) / 255.0
    };

    Ok(assess(
        &frames,
        sharpness_raw,
        info.bit_rate as f64,
        video.width,
        video.height,
        video.fps,
        &video.codec,
    ))
}

/// Run a sampled signalstats pass and parse per-frame metadata from stdout.
async fn sample_signalstats(
    runner: &MediaRunner,
    cancel: &CancellationToken,
    path: &Path,
    duration: f64,
    edges: bool,
) -> Result<Vec<FrameStats>> {
    // One frame every duration/10 seconds; fall back to 1 fps for very
    // short inputs.
    let interval = (duration / f64::from(SAMPLE_FRAMES)).max(0.1);
    let filter = if edges {
        format!("fps=1/{interval:.3},edgedetect,signalstats,metadata=mode=print:file=-")
    } else {
        format!("fps=1/{interval:.3},signalstats,metadata=mode=print:file=-")
    };
    let path_s = path.to_string_lossy();
    let out = runner
        .execute_capturing_output(
            cancel,
            &[
                "-i", path_s.as_ref(),
                "-map", "0:v:0",
                "-vf", &filter,
                "-f", "null", "-",
            ],
        )
        .await
        .map_err(|e| e.context("signalstats pass"))?;
    Ok(parse_signalstats(&out))
}

/// Parse `metadata=print` output into per-frame stats.
pub fn parse_signalstats(output: &str) -> Vec<FrameStats> {
    let mut frames: Vec<FrameStats> = Vec::new();
    let mut current: Option<FrameStats> = None;

    for line in output.lines() {
        let line = line.trim();
        if line.starts_with("frame:") {
            if let Some(f) = current.take() {
                frames.push(f);
            }
            current = Some(FrameStats::default());
        } else if let Some((key, value)) = line.split_once('=') {
            let Some(frame) = current.as_mut() else { continue };
            let Ok(v) = value.trim().parse::<f64>() else { continue };
            match key.trim() {
                "lavfi.signalstats.YAVG" => frame.yavg = v,
                "lavfi.signalstats.YLOW" => frame.ylow = v,
                "lavfi.signalstats.YHIGH" => frame.yhigh = v,
                "lavfi.signalstats.UAVG" => frame.uavg = v,
                "lavfi.signalstats.VAVG" => frame.vavg = v,
                "lavfi.signalstats.YDIF" => frame.ydif = v,
                _ => {}
            }
        }
    }
    if let Some(f) = current.take() {
        frames.push(f);
    }
    frames
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return 0.0;
    }
    collected.iter().sum::<f64>() / collected.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Fold frame stats and container facts into the quality record.
pub fn assess(
    frames: &[FrameStats],
    sharpness_raw: f64,
    bit_rate: f64,
    width: u32,
    height: u32,
    fps: f64,
    codec: &str,
) -> VideoQuality {
    let brightness = mean(frames.iter().map(|f| f.yavg));
    let contrast = mean(frames.iter().map(|f| (f.yhigh - f.ylow) / 255.0)).clamp(0.0, 1.0);

    // Neutral chroma sits at 128; distance from it is a color cast.
    let cast = mean(
        frames
            .iter()
            .map(|f| ((f.uavg - 128.0).abs() + (f.vavg - 128.0).abs()) / 2.0),
    );
    let color_balance = (1.0 - cast / 64.0).clamp(0.0, 1.0);

    // Lower inter-frame difference variance reads as steadier footage.
    let ydifs: Vec<f64> = frames.iter().map(|f| f.ydif).collect();
    let stabilization = (1.0 - variance(&ydifs) / 100.0).clamp(0.0, 1.0);

    // Sharpness: edge density, rescaled so typical footage lands mid-band.
    let sharpness = (sharpness_raw * 4.0).clamp(0.0, 1.0);

    let pixels = f64::from(width.max(1)) * f64::from(height.max(1));
    let bits_per_pixel = bit_rate / pixels;
    let artifact_score = (bits_per_pixel / 2.0).clamp(0.0, 1.0);

    let resolution_score = resolution_curve(height);
    let framerate_score = framerate_curve(fps);
    let codec_score = codec_curve(codec);

    // Brightness scores full inside the watchable band.
    let brightness_pct = brightness / 2.55;
    let brightness_score = if (40.0..=85.0).contains(&brightness_pct) {
        1.0
    } else if brightness_pct < 40.0 {
        (brightness_pct / 40.0).max(0.0)
    } else {
        ((100.0 - brightness_pct) / 15.0).clamp(0.0, 1.0)
    };

    let format_score = (resolution_score + framerate_score + codec_score) / 3.0;
    let score = (100.0
        * (0.25 * sharpness
            + 0.15 * brightness_score
            + 0.10 * contrast
            + 0.15 * stabilization
            + 0.15 * artifact_score
            + 0.20 * format_score))
        .clamp(0.0, 100.0);

    VideoQuality {
        brightness,
        contrast,
        sharpness,
        color_balance,
        stabilization,
        bits_per_pixel,
        artifact_score,
        resolution_score,
        framerate_score,
        codec_score,
        score,
    }
}

pub fn resolution_curve(height: u32) -> f64 {
    match height {
        h if h >= 2160 => 1.0,
        h if h >= 1440 => 0.95,
        h if h >= 1080 => 0.9,
        h if h >= 720 => 0.75,
        h if h >= 480 => 0.55,
        _ => 0.4,
    }
}

pub fn framerate_curve(fps: f64) -> f64 {
    if fps >= 60.0 {
        1.0
    } else if fps >= 30.0 {
        0.9
    } else if fps >= 24.0 {
        0.85
    } else if fps > 0.0 {
        0.6
    } else {
        0.5
    }
}

pub fn codec_curve(codec: &str) -> f64 {
    match codec {
        "hevc" | "h265" | "av1" => 1.0,
        "h264" | "vp9" => 0.9,
        "vp8" | "mpeg2video" => 0.65,
        "mpeg4" | "msmpeg4v3" => 0.6,
        _ => 0.7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
frame:0    pts:0      pts_time:0
lavfi.signalstats.YMIN=16
lavfi.signalstats.YLOW=24
lavfi.signalstats.YAVG=122.5
lavfi.signalstats.YHIGH=224
lavfi.signalstats.YMAX=235
lavfi.signalstats.UAVG=127.2
lavfi.signalstats.VAVG=129.1
lavfi.signalstats.YDIF=3.1
frame:1    pts:12800  pts_time:0.5
lavfi.signalstats.YLOW=26
lavfi.signalstats.YAVG=124.0
lavfi.signalstats.YHIGH=226
lavfi.signalstats.UAVG=126.8
lavfi.signalstats.VAVG=128.7
lavfi.signalstats.YDIF=2.9
";

    #[test]
    fn parses_per_frame_blocks() {
        let frames = parse_signalstats(SAMPLE);
        assert_eq!(frames.len(), 2);
        assert!((frames[0].yavg - 122.5).abs() < 1e-9);
        assert!((frames[1].ydif - 2.9).abs() < 1e-9);
    }

    #[test]
    fn steady_well_lit_footage_scores_high() {
        let frames = parse_signalstats(SAMPLE);
        let q = assess(&frames, 0.12, 8_000_000.0, 1920, 1080, 30.0, "h264");
        assert!(q.score > 60.0, "got {}", q.score);
        assert!(q.stabilization > 0.9);
        assert!(q.color_balance > 0.9);
    }

    #[test]
    fn shaky_footage_lowers_stabilization() {
        let mut frames = parse_signalstats(SAMPLE);
        frames[0].ydif = 2.0;
        frames[1].ydif = 45.0;
        let extra = FrameStats {
            ydif: 1.0,
            ..frames[0].clone()
        };
        frames.push(extra);
        let steady = assess(&parse_signalstats(SAMPLE), 0.1, 8e6, 1920, 1080, 30.0, "h264");
        let shaky = assess(&frames, 0.1, 8e6, 1920, 1080, 30.0, "h264");
        assert!(shaky.stabilization < steady.stabilization);
    }

    #[test]
    fn bits_per_pixel_uses_spec_formula() {
        let frames = parse_signalstats(SAMPLE);
        let q = assess(&frames, 0.1, 2_073_600.0, 1920, 1080, 30.0, "h264");
        assert!((q.bits_per_pixel - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_curves() {
        assert_eq!(resolution_curve(2160), 1.0);
        assert_eq!(resolution_curve(1080), 0.9);
        assert_eq!(resolution_curve(360), 0.4);
        assert_eq!(framerate_curve(29.97), 0.85);
        assert_eq!(codec_curve("hevc"), 1.0);
        assert_eq!(codec_curve("h264"), 0.9);
    }
}
