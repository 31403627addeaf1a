//! Transcript tools: extraction, phrase search, transcript-driven removal,
//! and trimming a recording down to its scripted content.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_analysis::matching;
use cf_domain::error::{Error, Result};
use cf_domain::tool::ToolResult;
use cf_media::fsops::StagedOutput;

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::video::{output_muxer, register_tool_fn, segment_select_filter};
use crate::{tool_def, ToolDeps};

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "extract_transcript",
            "Transcribe a media file with word-level timestamps. Formats: text, srt, json.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "language": { "type": "string", "description": "ISO language hint, e.g. en" },
                    "format": { "type": "string", "enum": ["text", "srt", "json"] }
                },
                "required": ["input"]
            })
        ),
        extract_transcript
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "find_in_transcript",
            "Find a spoken phrase and return its occurrences with timestamps.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "phrase": { "type": "string" },
                    "language": { "type": "string" }
                },
                "required": ["input", "phrase"]
            })
        ),
        find_in_transcript
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "remove_by_transcript",
            "Remove every occurrence of a spoken phrase (or one occurrence by index) from the media.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "phrase": { "type": "string" },
                    "matchIndex": { "type": "integer", "minimum": -1, "description": "-1 removes all occurrences" },
                    "language": { "type": "string" }
                },
                "required": ["input", "output", "phrase"]
            })
        ),
        remove_by_transcript
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "trim_to_script",
            "Trim a recording to the span that matches a script, dropping leading/trailing chatter.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "script": { "type": "string" },
                    "language": { "type": "string" }
                },
                "required": ["input", "output", "script"]
            })
        ),
        trim_to_script
    );

    Ok(())
}

async fn extract_transcript(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let language = opt_str(&args, "language");
    let format = opt_str(&args, "format").unwrap_or("text");

    let transcript = deps.transcript_for(&cancel, &input, language).await?;

    let content = match format {
        "srt" => transcript.format_srt(),
        "json" => serde_json::to_string_pretty(&transcript)?,
        _ => transcript.text.clone(),
    };
    Ok(ToolResult::ok_with_data(
        content,
        serde_json::to_value(&transcript)?,
    ))
}

async fn find_in_transcript(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let phrase = req_str(&args, "phrase")?;
    let language = opt_str(&args, "language");

    let transcript = deps.transcript_for(&cancel, &input, language).await?;
    let hits = matching::find_phrase(&transcript, phrase);
    if hits.is_empty() {
        return Ok(ToolResult::ok_with_data(
            format!("\"{phrase}\" was not found"),
            json!({ "phrase": phrase, "occurrences": [] }),
        ));
    }

    let listing = hits
        .iter()
        .enumerate()
        .map(|(i, r)| format!("  {i}: [{:.2}s - {:.2}s]", r.start, r.end))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(ToolResult::ok_with_data(
        format!("\"{phrase}\" occurs {} time(s):\n{listing}", hits.len()),
        json!({ "phrase": phrase, "occurrences": hits }),
    ))
}

async fn remove_by_transcript(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let phrase = req_str(&args, "phrase")?;
    let match_index = opt_i64(&args, "matchIndex").unwrap_or(-1);
    let language = opt_str(&args, "language");

    let transcript = deps.transcript_for(&cancel, &input, language).await?;
    let hits = matching::find_phrase(&transcript, phrase);
    if hits.is_empty() {
        return Err(Error::Other(format!(
            "not_found: \"{phrase}\" does not occur in the transcript"
        )));
    }
    let targets: Vec<(f64, f64)> = if match_index >= 0 {
        let hit = hits.get(match_index as usize).ok_or_else(|| {
            Error::Other(format!(
                "not_found: match index {match_index} out of range ({} occurrences)",
                hits.len()
            ))
        })?;
        vec![(hit.start, hit.end)]
    } else {
        hits.iter().map(|r| (r.start, r.end)).collect()
    };

    let filter = segment_select_filter(&targets, false);
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
    Ok(ToolResult::ok_with_data(
        format!(
            "Removed {} occurrence(s) of \"{phrase}\" -> {}",
            targets.len(),
            committed.display()
        ),
        json!({ "removed": targets.len(), "output": committed }),
    ))
}

async fn trim_to_script(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let script = req_str(&args, "script")?;
    let language = opt_str(&args, "language");

    let sections = matching::parse_sections(script);
    if sections.is_empty() {
        return Err(Error::SchemaViolation("script is empty".into()));
    }

    let transcript = deps.transcript_for(&cancel, &input, language).await?;
    let mut start: Option<f64> = None;
    let mut end: Option<f64> = None;
    for section in &sections {
        let m = matching::match_section(section, &transcript, 0.55);
        if let Some(range) = m.time_range {
            start = Some(start.map_or(range.start, |s: f64| s.min(range.start)));
            end = Some(end.map_or(range.end, |e: f64| e.max(range.end)));
        }
    }
    let (Some(start), Some(end)) = (start, end) else {
        return Err(Error::InsufficientCoverage(
            "no part of the script was found in the recording".into(),
        ));
    };

    // Small lead-in/out so speech is not clipped mid-word.
    let pad = 0.25;
    let start = (start - pad).max(0.0);
    let end = end + pad;

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
            "Trimmed to scripted span [{start:.2}s - {end:.2}s] -> {}",
            committed.display()
        ),
        json!({ "start": start, "end": end, "output": committed }),
    ))
}
