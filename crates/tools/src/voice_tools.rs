//! Voice tools: cloning, synthesis, cache management, and word replacement.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_domain::error::Result;
use cf_domain::tool::ToolResult;
use cf_media::fsops::StagedOutput;
use cf_voice::{hash_sample, ReplaceRequest};

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::video::{output_muxer, register_tool_fn};
use crate::{tool_def, ToolDeps};

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "clone_voice",
            "Clone a voice from an audio sample. Cached by sample content, so re-cloning the same file is free.",
            json!({
                "type": "object",
                "properties": {
                    "samplePath": { "type": "string" },
                    "name": { "type": "string", "description": "Display name for the cloned voice" }
                },
                "required": ["samplePath"]
            })
        ),
        clone_voice
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "generate_speech",
            "Synthesize speech with a cloned voice (by id, or cloned on the fly from a sample).",
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "output": { "type": "string" },
                    "voiceId": { "type": "string" },
                    "samplePath": { "type": "string" }
                },
                "required": ["text", "output"]
            })
        ),
        generate_speech
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "list_cached_voices",
            "List cached voice clones (sample hash -> voice id).",
            json!({ "type": "object", "properties": {} })
        ),
        list_cached_voices
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "clear_cached_voice",
            "Forget a cached voice clone by sample hash (also deletes it remotely, best effort).",
            json!({
                "type": "object",
                "properties": {
                    "sampleHash": { "type": "string" }
                },
                "required": ["sampleHash"]
            })
        ),
        clear_cached_voice
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "replace_word",
            "Replace a spoken phrase with synthesized speech in the speaker's own (cloned) voice. matchIndex -1 replaces every occurrence.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "search": { "type": "string" },
                    "replacement": { "type": "string" },
                    "matchIndex": { "type": "integer", "minimum": -1 },
                    "voiceSamplePath": { "type": "string" },
                    "voiceId": { "type": "string" },
                    "language": { "type": "string" }
                },
                "required": ["input", "output", "search", "replacement"]
            })
        ),
        replace_word
    );

    Ok(())
}

async fn clone_voice(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let sample = input_path(&args, "samplePath")?;
    let name = opt_str(&args, "name").unwrap_or("clipforge-clone");
    let cache = deps.voice_cache()?;
    let voice_id = cache.resolve(&sample, name).await?;
    let hash = hash_sample(&sample)?;
    Ok(ToolResult::ok_with_data(
        format!("Voice ready: {voice_id}"),
        json!({ "voiceId": voice_id, "sampleHash": hash }),
    ))
}

async fn generate_speech(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let text = req_str(&args, "text")?;
    let output = PathBuf::from(req_str(&args, "output")?);
    let cache = deps.voice_cache()?;

    let voice_id = match (opt_str(&args, "voiceId"), opt_str(&args, "samplePath")) {
        (Some(id), _) => id.to_string(),
        (None, Some(sample)) => {
            let sample = PathBuf::from(sample);
            cf_media::fsops::require_readable(&sample)?;
            cache.resolve(&sample, "clipforge-clone").await?
        }
        (None, None) => {
            return Err(cf_domain::Error::SchemaViolation(
                "generate_speech needs voiceId or samplePath".into(),
            ))
        }
    };

    // TTS always returns MP3; convert when the caller asked for another
    // container.
    let wants_mp3 = output
        .extension()
        .map(|e| e.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false);

    let stage = StagedOutput::new(&output)?;
    if wants_mp3 {
        cache
            .client()
            .generate_speech(&voice_id, text, stage.path())
            .await?;
    } else {
        let raw = deps
            .scratch_dir
            .join(format!("tts_{}.mp3", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&deps.scratch_dir)?;
        cache.client().generate_speech(&voice_id, text, &raw).await?;
        let raw_s = raw.to_string_lossy();
        let out_s = stage.path().to_string_lossy().into_owned();
        let result = deps
            .runner()
            .execute(
                &cancel,
                &["-i", raw_s.as_ref(), "-f", output_muxer(&output), &out_s],
            )
            .await;
        let _ = std::fs::remove_file(&raw);
        result?;
    }
    let committed = stage.commit()?;
    Ok(ToolResult::ok_with_data(
        format!("Synthesized {} chars -> {}", text.len(), committed.display()),
        json!({ "voiceId": voice_id, "output": committed }),
    ))
}

async fn list_cached_voices(
    deps: Arc<ToolDeps>,
    _args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let voices = deps.config.cached_voices();
    if voices.is_empty() {
        return Ok(ToolResult::ok_with_data(
            "No cached voices",
            json!({ "voices": {} }),
        ));
    }
    let listing = voices
        .iter()
        .map(|(hash, id)| format!("  {}… -> {id}", &hash[..hash.len().min(12)]))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(ToolResult::ok_with_data(
        format!("{} cached voice(s):\n{listing}", voices.len()),
        json!({ "voices": voices }),
    ))
}

async fn clear_cached_voice(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let hash = req_str(&args, "sampleHash")?;
    let cache = deps.voice_cache()?;
    let removed = cache.clear(hash).await?;
    Ok(if removed {
        ToolResult::ok(format!("Cleared cached voice for {hash}"))
    } else {
        ToolResult::fail(format!("no cached voice under hash {hash}"))
    })
}

async fn replace_word(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let request = ReplaceRequest {
        input,
        output,
        search_phrase: req_str(&args, "search")?.to_string(),
        replacement_text: req_str(&args, "replacement")?.to_string(),
        match_index: opt_i64(&args, "matchIndex").unwrap_or(-1),
        voice_sample: opt_str(&args, "voiceSamplePath").map(PathBuf::from),
        voice_id: opt_str(&args, "voiceId").map(str::to_string),
        language: opt_str(&args, "language").map(str::to_string),
    };

    let splicer = deps.splicer()?;
    let summary = splicer.replace(&cancel, &request).await?;
    Ok(ToolResult::ok_with_data(
        format!(
            "Replaced {} occurrence(s) of \"{}\" with \"{}\" -> {}",
            summary.replaced,
            request.search_phrase,
            request.replacement_text,
            summary.output.display()
        ),
        json!({
            "output": summary.output,
            "replaced": summary.replaced,
            "ranges": summary.ranges,
        }),
    ))
}
