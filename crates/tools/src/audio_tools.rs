//! Audio primitives: trim, concat, gain, normalize, fades, mixing, format
//! conversion, tempo, section removal, split, reverse, channel extraction.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_domain::tool::ToolResult;
use cf_media::fsops::StagedOutput;
use cf_media::probe_media;

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::video::{atempo_chain, audio_codec_for, output_muxer, register_tool_fn};
use crate::{tool_def, ToolDeps};

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "trim_audio",
            "Cut a time range out of an audio file. Provide endTime or duration, not both.",
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
        trim_audio
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "concatenate_audio",
            "Concatenate audio files in order.",
            json!({
                "type": "object",
                "properties": {
                    "inputs": { "type": "array", "items": { "type": "string" }, "minItems": 2 },
                    "output": { "type": "string" }
                },
                "required": ["inputs", "output"]
            })
        ),
        concatenate_audio
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "adjust_volume",
            "Change the volume by a linear factor or a dB offset.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "factor": { "type": "number", "exclusiveMinimum": 0 },
                    "db": { "type": "number" }
                },
                "required": ["input", "output"]
            })
        ),
        adjust_volume
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "normalize_audio",
            "Loudness-normalize to the EBU R128 target.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" }
                },
                "required": ["input", "output"]
            })
        ),
        normalize_audio
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "audio_fade_in",
            "Fade in from silence over the given duration.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "duration": { "type": "number", "exclusiveMinimum": 0 }
                },
                "required": ["input", "output", "duration"]
            })
        ),
        audio_fade_in
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "audio_fade_out",
            "Fade out to silence over the final given duration.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "duration": { "type": "number", "exclusiveMinimum": 0 }
                },
                "required": ["input", "output", "duration"]
            })
        ),
        audio_fade_out
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "mix_audio",
            "Mix several audio files together with optional per-input gains.",
            json!({
                "type": "object",
                "properties": {
                    "inputs": { "type": "array", "items": { "type": "string" }, "minItems": 2 },
                    "gains": { "type": "array", "items": { "type": "number" } },
                    "output": { "type": "string" }
                },
                "required": ["inputs", "output"]
            })
        ),
        mix_audio
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "convert_audio_format",
            "Convert audio to the format implied by the output extension.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "bitrate": { "type": "string", "description": "e.g. 192k" }
                },
                "required": ["input", "output"]
            })
        ),
        convert_audio_format
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "adjust_audio_speed",
            "Change audio speed while preserving pitch (tempo stretch).",
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
        adjust_audio_speed
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "remove_audio_section",
            "Remove a time range from an audio file, closing the gap.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "start": { "type": "number", "minimum": 0 },
                    "end": { "type": "number", "exclusiveMinimum": 0 }
                },
                "required": ["input", "output", "start", "end"]
            })
        ),
        remove_audio_section
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "split_audio",
            "Split an audio file at a timestamp into two files.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "splitAt": { "type": "number", "exclusiveMinimum": 0 },
                    "output1": { "type": "string" },
                    "output2": { "type": "string" }
                },
                "required": ["input", "splitAt", "output1", "output2"]
            })
        ),
        split_audio
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "reverse_audio",
            "Reverse an audio file.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" }
                },
                "required": ["input", "output"]
            })
        ),
        reverse_audio
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "extract_audio_channel",
            "Extract one channel (0-based) to a mono file.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "channel": { "type": "integer", "minimum": 0 }
                },
                "required": ["input", "output", "channel"]
            })
        ),
        extract_audio_channel
    );

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_audio_filter(
    deps: &ToolDeps,
    cancel: &CancellationToken,
    input: &PathBuf,
    output: &PathBuf,
    filter: &str,
    description: String,
) -> Result<ToolResult> {
    let stage = StagedOutput::new(output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            cancel,
            &[
                "-i", input_s.as_ref(),
                "-af", filter,
                "-acodec", audio_codec_for(output),
                "-f", output_muxer(output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!("{description} -> {}", committed.display())))
}

async fn trim_audio(
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
    Ok(ToolResult::ok(format!(
        "Trimmed audio to [{start:.3}, {end:.3}] -> {}",
        committed.display()
    )))
}

async fn concatenate_audio(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let inputs = input_paths(&args, "inputs")?;
    let input_refs: Vec<&PathBuf> = inputs.iter().collect();
    let output = output_path(&args, "output", &input_refs)?;

    // Decode-and-concat handles heterogeneous codecs.
    let mut filter = String::new();
    for i in 0..inputs.len() {
        filter.push_str(&format!("[{i}:a]"));
    }
    filter.push_str(&format!("concat=n={}:v=0:a=1[a]", inputs.len()));

    let stage = StagedOutput::new(&output)?;
    let out_s = stage.path().to_string_lossy().into_owned();
    let input_strs: Vec<String> = inputs
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    let mut cmd: Vec<&str> = Vec::new();
    for input in &input_strs {
        cmd.push("-i");
        cmd.push(input);
    }
    cmd.extend([
        "-filter_complex", filter.as_str(),
        "-map", "[a]",
        "-acodec", audio_codec_for(&output),
        "-f", output_muxer(&output),
        out_s.as_str(),
    ]);
    deps.runner().execute(&cancel, &cmd).await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Concatenated {} audio files -> {}",
        inputs.len(),
        committed.display()
    )))
}

async fn adjust_volume(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let filter = match (opt_f64(&args, "factor"), opt_f64(&args, "db")) {
        (Some(_), Some(_)) => {
            return Err(Error::SchemaViolation(
                "give factor or db, not both".into(),
            ))
        }
        (Some(f), None) => format!("volume={f}"),
        (None, Some(db)) => format!("volume={db}dB"),
        (None, None) => {
            return Err(Error::SchemaViolation(
                "adjust_volume needs factor or db".into(),
            ))
        }
    };
    run_audio_filter(&deps, &cancel, &input, &output, &filter, "Adjusted volume".into()).await
}

async fn normalize_audio(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    run_audio_filter(
        &deps,
        &cancel,
        &input,
        &output,
        "loudnorm",
        "Loudness normalized".into(),
    )
    .await
}

async fn audio_fade_in(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let duration = req_f64(&args, "duration")?;
    let filter = format!("afade=t=in:st=0:d={duration}");
    run_audio_filter(
        &deps,
        &cancel,
        &input,
        &output,
        &filter,
        format!("Faded in over {duration}s"),
    )
    .await
}

async fn audio_fade_out(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let duration = req_f64(&args, "duration")?;
    let total = probe_media(&deps.runner(), &cancel, &input).await?.duration;
    let start = (total - duration).max(0.0);
    let filter = format!("afade=t=out:st={start:.3}:d={duration}");
    run_audio_filter(
        &deps,
        &cancel,
        &input,
        &output,
        &filter,
        format!("Faded out over {duration}s"),
    )
    .await
}

async fn mix_audio(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let inputs = input_paths(&args, "inputs")?;
    let input_refs: Vec<&PathBuf> = inputs.iter().collect();
    let output = output_path(&args, "output", &input_refs)?;
    let gains: Vec<f64> = args
        .get("gains")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    if !gains.is_empty() && gains.len() != inputs.len() {
        return Err(Error::SchemaViolation(format!(
            "gains length {} does not match inputs length {}",
            gains.len(),
            inputs.len()
        )));
    }

    let filter = mix_filter(inputs.len(), &gains);

    let stage = StagedOutput::new(&output)?;
    let out_s = stage.path().to_string_lossy().into_owned();
    let input_strs: Vec<String> = inputs
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    let mut cmd: Vec<&str> = Vec::new();
    for input in &input_strs {
        cmd.push("-i");
        cmd.push(input);
    }
    cmd.extend([
        "-filter_complex", filter.as_str(),
        "-map", "[a]",
        "-acodec", audio_codec_for(&output),
        "-f", output_muxer(&output),
        out_s.as_str(),
    ]);
    deps.runner().execute(&cancel, &cmd).await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Mixed {} inputs -> {}",
        inputs.len(),
        committed.display()
    )))
}

async fn convert_audio_format(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let bitrate = opt_str(&args, "bitrate").unwrap_or("192k");

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-vn",
                "-acodec", audio_codec_for(&output),
                "-b:a", bitrate,
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Converted audio -> {}",
        committed.display()
    )))
}

async fn adjust_audio_speed(
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
    let filter = atempo_chain(factor);
    run_audio_filter(
        &deps,
        &cancel,
        &input,
        &output,
        &filter,
        format!("Tempo-stretched by {factor}x"),
    )
    .await
}

async fn remove_audio_section(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let start = req_f64(&args, "start")?;
    let end = req_f64(&args, "end")?;
    if end <= start {
        return Err(Error::SchemaViolation(format!(
            "end {end} must be after start {start}"
        )));
    }
    let filter = format!(
        "aselect='not(between(t,{start:.3},{end:.3}))',asetpts=N/SR/TB"
    );
    run_audio_filter(
        &deps,
        &cancel,
        &input,
        &output,
        &filter,
        format!("Removed [{start:.3}, {end:.3}]"),
    )
    .await
}

async fn split_audio(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let split_at = req_f64(&args, "splitAt")?;
    let output1 = output_path(&args, "output1", &[&input])?;
    let output2 = output_path(&args, "output2", &[&input])?;
    if output1 == output2 {
        return Err(Error::SchemaViolation(
            "output1 and output2 must differ".into(),
        ));
    }

    let input_s = input.to_string_lossy();

    let stage1 = StagedOutput::new(&output1)?;
    let out1_s = stage1.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-to", &format!("{split_at:.3}"),
                "-c", "copy",
                "-f", output_muxer(&output1),
                &out1_s,
            ],
        )
        .await?;

    let stage2 = StagedOutput::new(&output2)?;
    let out2_s = stage2.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", input_s.as_ref(),
                "-ss", &format!("{split_at:.3}"),
                "-c", "copy",
                "-f", output_muxer(&output2),
                &out2_s,
            ],
        )
        .await?;

    let first = stage1.commit()?;
    let second = stage2.commit()?;
    Ok(ToolResult::ok_with_data(
        format!(
            "Split at {split_at:.3}s -> {} and {}",
            first.display(),
            second.display()
        ),
        json!({ "first": first, "second": second }),
    ))
}

async fn reverse_audio(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    run_audio_filter(&deps, &cancel, &input, &output, "areverse", "Reversed".into()).await
}

async fn extract_audio_channel(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let channel = opt_u64(&args, "channel").unwrap_or(0);
    let filter = format!("pan=mono|c0=c{channel}");
    run_audio_filter(
        &deps,
        &cancel,
        &input,
        &output,
        &filter,
        format!("Extracted channel {channel}"),
    )
    .await
}

/// amix with optional per-input gain stages.
pub(crate) fn mix_filter(count: usize, gains: &[f64]) -> String {
    let mut filter = String::new();
    let mut labels = String::new();
    for i in 0..count {
        if gains.is_empty() {
            labels.push_str(&format!("[{i}:a]"));
        } else {
            filter.push_str(&format!("[{i}:a]volume={}[g{i}];", gains[i]));
            labels.push_str(&format!("[g{i}]"));
        }
    }
    format!("{filter}{labels}amix=inputs={count}:duration=longest[a]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_without_gains_is_plain_amix() {
        assert_eq!(
            mix_filter(2, &[]),
            "[0:a][1:a]amix=inputs=2:duration=longest[a]"
        );
    }

    #[test]
    fn mix_with_gains_inserts_volume_stages() {
        let f = mix_filter(2, &[1.0, 0.5]);
        assert!(f.contains("[0:a]volume=1[g0]"));
        assert!(f.contains("[1:a]volume=0.5[g1]"));
        assert!(f.ends_with("amix=inputs=2:duration=longest[a]"));
    }
}
