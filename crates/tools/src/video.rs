//! Video primitives: probe, trim, concatenate, resize, extract, speed,
//! convert, web transcode, and segment removal/retention.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_domain::config::QualityPreset;
use cf_domain::error::{Error, Result};
use cf_domain::tool::ToolResult;
use cf_media::fsops::StagedOutput;
use cf_media::{probe_media, WebProfile, WebResolution};

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::{tool_def, ToolDeps};

macro_rules! register_tool_fn {
    ($registry:expr, $deps:expr, $def:expr, $handler:path) => {{
        let deps = $deps.clone();
        $registry.register($def, move |args, cancel| {
            let deps = deps.clone();
            async move { $handler(deps, args, cancel).await }
        })?;
    }};
}
pub(crate) use register_tool_fn;

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "get_video_info",
            "Probe a media file: duration, container, codecs, resolution, frame rate, bitrate.",
            json!({
                "type": "object",
                "properties": { "input": { "type": "string", "description": "Path to the media file" } },
                "required": ["input"]
            })
        ),
        get_video_info
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "trim_video",
            "Cut a time range out of a video without re-encoding. Provide endTime or duration, not both.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "start": { "type": "number", "minimum": 0 },
                    "endTime": { "type": "number" },
                    "duration": { "type": "number" }
                },
                "required": ["input", "output", "start"]
            })
        ),
        trim_video
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "concatenate_videos",
            "Concatenate videos in order. Inputs should share codec parameters; use convert_video first if they differ.",
            json!({
                "type": "object",
                "properties": {
                    "inputs": { "type": "array", "items": { "type": "string" }, "minItems": 2 },
                    "output": { "type": "string" }
                },
                "required": ["inputs", "output"]
            })
        ),
        concatenate_videos
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "resize_video",
            "Resize a video. Give width and/or height; -2 keeps aspect on the omitted axis.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "width": { "type": "integer" },
                    "height": { "type": "integer" }
                },
                "required": ["input", "output"]
            })
        ),
        resize_video
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "extract_audio",
            "Extract the audio track to its own file; codec is chosen from the output extension.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" }
                },
                "required": ["input", "output"]
            })
        ),
        extract_audio
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "extract_frames",
            "Extract still frames into a directory as numbered images.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "outputDir": { "type": "string" },
                    "fps": { "type": "number", "description": "Frames per second to extract (default 1)" },
                    "format": { "type": "string", "enum": ["png", "jpg"] }
                },
                "required": ["input", "outputDir"]
            })
        ),
        extract_frames
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "adjust_speed",
            "Speed a video up or down. factor 2.0 is double speed; audio tempo follows with pitch preserved.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "factor": { "type": "number", "exclusiveMinimum": 0 }
                },
                "required": ["input", "output", "factor"]
            })
        ),
        adjust_speed
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "convert_video",
            "Convert to another container/codec, chosen from the output extension.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" }
                },
                "required": ["input", "output"]
            })
        ),
        convert_video
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "transcode_for_web",
            "Transcode for web delivery: quality high/medium/low at 4k/1080p/720p/480p, fast-start enabled.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "quality": { "type": "string", "enum": ["high", "medium", "low"] },
                    "resolution": { "type": "string", "enum": ["4k", "1080p", "720p", "480p"] }
                },
                "required": ["input", "output"]
            })
        ),
        transcode_for_web
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "remove_segments",
            "Remove one or more time ranges from a video, closing the gaps.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "segments": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "start": { "type": "number", "minimum": 0 },
                                "end": { "type": "number" }
                            },
                            "required": ["start", "end"]
                        }
                    }
                },
                "required": ["input", "output", "segments"]
            })
        ),
        remove_segments
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "keep_segments",
            "Keep only the listed time ranges of a video, concatenated in order.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "segments": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "start": { "type": "number", "minimum": 0 },
                                "end": { "type": "number" }
                            },
                            "required": ["start", "end"]
                        }
                    }
                },
                "required": ["input", "output", "segments"]
            })
        ),
        keep_segments
    );

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn get_video_info(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let info = probe_media(&deps.runner(), &cancel, &input).await?;

    let mut summary = format!(
        "{}: {:.2}s, {} container, {:.1} kbit/s",
        input.display(),
        info.duration,
        info.container,
        info.bit_rate as f64 / 1000.0
    );
    if let Some(v) = &info.video {
        summary.push_str(&format!(
            ", video {}x{} {} @ {:.2} fps",
            v.width, v.height, v.codec, v.fps
        ));
    }
    if let Some(a) = &info.audio {
        summary.push_str(&format!(
            ", audio {} {} Hz {}ch",
            a.codec, a.sample_rate, a.channels
        ));
    }
    Ok(ToolResult::ok_with_data(summary, serde_json::to_value(&info)?))
}

async fn trim_video(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let (start, end) = time_window(&args)?;
    let end = match end {
        Some(e) => e,
        None => probe_media(&deps.runner(), &cancel, &input).await?.duration,
    };

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-ss", &format!("{start:.3}"),
                "-to", &format!("{end:.3}"),
                "-c", "copy",
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok_with_data(
        format!(
            "Trimmed {} to [{start:.3}, {end:.3}] -> {}",
            input.display(),
            committed.display()
        ),
        json!({ "output": committed, "start": start, "end": end }),
    ))
}

async fn concatenate_videos(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let inputs = input_paths(&args, "inputs")?;
    let input_refs: Vec<&PathBuf> = inputs.iter().collect();
    let output = output_path(&args, "output", &input_refs)?;

    let list_path = deps
        .scratch_dir
        .join(format!("concat_{}.txt", uuid::Uuid::new_v4().simple()));
    let mut list = String::new();
    for input in &inputs {
        list.push_str(&format!(
            "file '{}'\n",
            input.to_string_lossy().replace('\'', "'\\''")
        ));
    }
    std::fs::create_dir_all(&deps.scratch_dir)?;
    std::fs::write(&list_path, list)?;

    let stage = StagedOutput::new(&output)?;
    let list_s = list_path.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    let result = deps
        .runner()
        .execute(
            &cancel,
            &[
                "-f", "concat",
                "-safe", "0",
                "-i", list_s.as_ref(),
                "-c", "copy",
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await;
    let _ = std::fs::remove_file(&list_path);
    result?;

    let committed = stage.commit()?;
    Ok(ToolResult::ok_with_data(
        format!("Concatenated {} files -> {}", inputs.len(), committed.display()),
        json!({ "output": committed, "inputs": inputs.len() }),
    ))
}

async fn resize_video(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let width = opt_i64(&args, "width");
    let height = opt_i64(&args, "height");
    if width.is_none() && height.is_none() {
        return Err(Error::SchemaViolation(
            "resize_video needs width and/or height".into(),
        ));
    }
    let scale = format!(
        "scale={}:{}",
        width.unwrap_or(-2),
        height.unwrap_or(-2)
    );

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-vf", &scale,
                "-c:v", "libx264",
                "-crf", "18",
                "-preset", "medium",
                "-c:a", "copy",
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Resized {} with {scale} -> {}",
        input.display(),
        committed.display()
    )))
}

async fn extract_audio(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    let codec = audio_codec_for(&output);
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-vn",
                "-acodec", codec,
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Extracted audio -> {}",
        committed.display()
    )))
}

async fn extract_frames(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let out_dir = PathBuf::from(req_str(&args, "outputDir")?);
    let fps = opt_f64(&args, "fps").unwrap_or(1.0);
    let format = opt_str(&args, "format").unwrap_or("png");
    std::fs::create_dir_all(&out_dir)?;

    let pattern = out_dir.join(format!("frame_%04d.{format}"));
    let input_s = input.to_string_lossy();
    let pattern_s = pattern.to_string_lossy();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-vf", &format!("fps={fps}"),
                pattern_s.as_ref(),
            ],
        )
        .await?;

    let count = std::fs::read_dir(&out_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("frame_")
        })
        .count();
    Ok(ToolResult::ok_with_data(
        format!("Extracted {count} frames into {}", out_dir.display()),
        json!({ "outputDir": out_dir, "frames": count }),
    ))
}

async fn adjust_speed(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let factor = req_f64(&args, "factor")?;
    if factor <= 0.0 {
        return Err(Error::SchemaViolation("factor must be positive".into()));
    }

    let filter = format!(
        "[0:v]setpts=PTS/{factor}[v];[0:a]{}[a]",
        atempo_chain(factor)
    );
    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-filter_complex", &filter,
                "-map", "[v]",
                "-map", "[a]",
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Adjusted speed by {factor}x -> {}",
        committed.display()
    )))
}

async fn convert_video(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-c:v", "libx264",
                "-crf", "18",
                "-preset", "medium",
                "-c:a", "aac",
                "-b:a", "192k",
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Converted {} -> {}",
        input.display(),
        committed.display()
    )))
}

async fn transcode_for_web(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let quality = match opt_str(&args, "quality") {
        Some("high") => QualityPreset::High,
        Some("low") => QualityPreset::Low,
        Some("medium") | None => deps.config.snapshot().default_quality,
        Some(other) => {
            return Err(Error::SchemaViolation(format!(
                "unknown quality \"{other}\""
            )))
        }
    };
    let resolution = match opt_str(&args, "resolution") {
        Some(r) => WebResolution::parse(r)?,
        None => WebResolution::Fhd1080,
    };
    let profile = WebProfile::new(quality, resolution);

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    let encode = profile.encode_args();
    let mut cmd: Vec<&str> = vec!["-i", input_s.as_ref()];
    cmd.extend(encode.iter().map(String::as_str));
    cmd.push("-f");
    cmd.push("mp4");
    cmd.push(&out_s);
    deps.runner().execute(&cancel, &cmd).await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Web transcode ({quality:?}, {resolution:?}) -> {}",
        committed.display()
    )))
}

async fn remove_segments(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    segment_filter_tool(deps, args, cancel, false).await
}

async fn keep_segments(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    segment_filter_tool(deps, args, cancel, true).await
}

async fn segment_filter_tool(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
    keep: bool,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let segments = parse_segments(&args)?;
    let filter = segment_select_filter(&segments, keep);

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-filter_complex", &filter,
                "-map", "[v]",
                "-map", "[a]",
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    let verb = if keep { "Kept" } else { "Removed" };
    Ok(ToolResult::ok(format!(
        "{verb} {} segments -> {}",
        segments.len(),
        committed.display()
    )))
}

// ── Pure helpers ───────────────────────────────────────────────────

pub(crate) fn parse_segments(args: &Value) -> Result<Vec<(f64, f64)>> {
    let arr = args
        .get("segments")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::SchemaViolation("missing \"segments\"".into()))?;
    let mut segments = Vec::with_capacity(arr.len());
    for seg in arr {
        let start = seg
            .get("start")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::SchemaViolation("segment missing start".into()))?;
        let end = seg
            .get("end")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::SchemaViolation("segment missing end".into()))?;
        if end <= start {
            return Err(Error::SchemaViolation(format!(
                "segment end {end} must be after start {start}"
            )));
        }
        segments.push((start, end));
    }
    Ok(segments)
}

/// Build a select/aselect filter keeping (or dropping) the given ranges and
/// re-timestamping the survivors into a gapless stream.
pub(crate) fn segment_select_filter(segments: &[(f64, f64)], keep: bool) -> String {
    let ranges = segments
        .iter()
        .map(|(s, e)| format!("between(t,{s:.3},{e:.3})"))
        .collect::<Vec<_>>()
        .join("+");
    let expr = if keep {
        ranges
    } else {
        format!("not({ranges})")
    };
    format!(
        "[0:v]select='{expr}',setpts=N/FRAME_RATE/TB[v];\
         [0:a]aselect='{expr}',asetpts=N/SR/TB[a]"
    )
}

/// Chain atempo filters; a single atempo only accepts [0.5, 2.0].
pub(crate) fn atempo_chain(factor: f64) -> String {
    let mut remaining = factor;
    let mut stages: Vec<String> = Vec::new();
    while remaining > 2.0 {
        stages.push("atempo=2.0".into());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.5".into());
        remaining /= 0.5;
    }
    stages.push(format!("atempo={remaining:.4}"));
    stages.join(",")
}

/// ffmpeg muxer name for an output extension; staged temp names end in
/// `.tmp`, so the format is always passed explicitly.
pub(crate) fn output_muxer(output: &std::path::Path) -> &'static str {
    match output
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") | Some("m4v") | Some("mov") => "mp4",
        Some("mkv") => "matroska",
        Some("webm") => "webm",
        Some("avi") => "avi",
        Some("gif") => "gif",
        Some("mp3") => "mp3",
        Some("wav") => "wav",
        Some("flac") => "flac",
        Some("ogg") => "ogg",
        Some("m4a") | Some("aac") => "ipod",
        _ => "mp4",
    }
}

pub(crate) fn audio_codec_for(output: &std::path::Path) -> &'static str {
    match output
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") => "libmp3lame",
        Some("wav") => "pcm_s16le",
        Some("flac") => "flac",
        Some("ogg") => "libvorbis",
        Some("m4a") | Some("aac") => "aac",
        _ => "aac",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atempo_chain_splits_extreme_factors() {
        assert_eq!(atempo_chain(1.5), "atempo=1.5000");
        assert_eq!(atempo_chain(4.0), "atempo=2.0,atempo=2.0,atempo=1.0000");
        assert_eq!(atempo_chain(0.25), "atempo=0.5,atempo=0.5000");
    }

    #[test]
    fn segment_filter_keep_vs_remove() {
        let segs = vec![(1.0, 2.0), (5.0, 6.5)];
        let keep = segment_select_filter(&segs, true);
        let remove = segment_select_filter(&segs, false);
        assert!(keep.contains("between(t,1.000,2.000)+between(t,5.000,6.500)"));
        assert!(remove.contains("not(between"));
        assert!(keep.contains("setpts=N/FRAME_RATE/TB"));
        assert!(keep.contains("asetpts=N/SR/TB"));
    }

    #[test]
    fn segments_must_be_ordered_ranges() {
        let bad = json!({"segments": [{"start": 3.0, "end": 2.0}]});
        assert!(parse_segments(&bad).is_err());
    }

    #[test]
    fn muxer_for_tmp_staged_names() {
        assert_eq!(output_muxer(std::path::Path::new("/x/out.mp4")), "mp4");
        assert_eq!(output_muxer(std::path::Path::new("/x/out.mkv")), "matroska");
        assert_eq!(output_muxer(std::path::Path::new("/x/noext")), "mp4");
    }
}
