//! Text overlays and subtitle burning.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_domain::tool::ToolResult;
use cf_media::fsops::StagedOutput;

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::video::{output_muxer, register_tool_fn};
use crate::{tool_def, ToolDeps};

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "add_text_overlay",
            "Draw static text on the video at an anchor position or explicit x/y expressions.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "text": { "type": "string" },
                    "position": {
                        "type": "string",
                        "enum": ["top-left", "top-center", "top-right",
                                  "center-left", "center", "center-right",
                                  "bottom-left", "bottom-center", "bottom-right"]
                    },
                    "x": { "type": "string", "description": "Explicit x expression (overrides position)" },
                    "y": { "type": "string" },
                    "fontSize": { "type": "integer", "minimum": 8 },
                    "color": { "type": "string" },
                    "start": { "type": "number", "minimum": 0 },
                    "end": { "type": "number" }
                },
                "required": ["input", "output", "text"]
            })
        ),
        add_text_overlay
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "add_animated_text",
            "Draw text with an entrance animation: fade, slide-left/right/up/down, or zoom.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "text": { "type": "string" },
                    "animation": { "type": "string", "enum": ["fade", "slide-left", "slide-right", "slide-up", "slide-down", "zoom"] },
                    "start": { "type": "number", "minimum": 0 },
                    "duration": { "type": "number", "exclusiveMinimum": 0, "description": "Animation length in seconds (default 1.0)" },
                    "fontSize": { "type": "integer", "minimum": 8 },
                    "color": { "type": "string" }
                },
                "required": ["input", "output", "text", "animation"]
            })
        ),
        add_animated_text
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "burn_subtitles",
            "Burn a subtitle file (SRT/ASS) into the video frames.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "subtitles": { "type": "string", "description": "Path to the subtitle file" }
                },
                "required": ["input", "output", "subtitles"]
            })
        ),
        burn_subtitles
    );

    Ok(())
}

async fn run_drawtext(
    deps: &ToolDeps,
    cancel: &CancellationToken,
    args: &Value,
    filter: String,
    description: String,
) -> Result<ToolResult> {
    let input = input_path(args, "input")?;
    let output = output_path(args, "output", &[&input])?;

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            cancel,
            &[
                "-i", input_s.as_ref(),
                "-vf", &filter,
                "-c:v", "libx264",
                "-crf", "18",
                "-c:a", "copy",
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!("{description} -> {}", committed.display())))
}

async fn add_text_overlay(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let text = req_str(&args, "text")?;
    let font_size = opt_u64(&args, "fontSize").unwrap_or(36);
    let color = opt_str(&args, "color").unwrap_or("white");

    let (x, y) = match (opt_str(&args, "x"), opt_str(&args, "y")) {
        (Some(x), Some(y)) => (x.to_string(), y.to_string()),
        (None, None) => {
            let position = opt_str(&args, "position").unwrap_or("bottom-center");
            anchor_expr(position, "text_w", "text_h")?
        }
        _ => {
            return Err(Error::SchemaViolation(
                "give both x and y expressions, or neither".into(),
            ))
        }
    };

    let mut filter = format!(
        "drawtext=text='{}':fontsize={font_size}:fontcolor={color}:x={x}:y={y}:box=1:boxcolor=black@0.4:boxborderw=8",
        escape_filter_text(text)
    );
    if let (Some(start), Some(end)) = (opt_f64(&args, "start"), opt_f64(&args, "end")) {
        filter.push_str(&format!(":enable='between(t\\,{start}\\,{end})'"));
    }

    run_drawtext(&deps, &cancel, &args, filter, format!("Text overlay \"{text}\"")).await
}

async fn add_animated_text(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let text = req_str(&args, "text")?;
    let animation = req_str(&args, "animation")?;
    let start = opt_f64(&args, "start").unwrap_or(0.0);
    let duration = opt_f64(&args, "duration").unwrap_or(1.0);
    let font_size = opt_u64(&args, "fontSize").unwrap_or(48);
    let color = opt_str(&args, "color").unwrap_or("white");

    let filter = animated_text_filter(text, animation, start, duration, font_size, color)?;
    run_drawtext(
        &deps,
        &cancel,
        &args,
        filter,
        format!("Animated text ({animation})"),
    )
    .await
}

async fn burn_subtitles(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let subs = std::path::PathBuf::from(req_str(&args, "subtitles")?);
    cf_media::fsops::require_readable(&subs)?;
    let filter = format!(
        "subtitles='{}'",
        subs.to_string_lossy().replace('\'', "\\'").replace(':', "\\:")
    );
    run_drawtext(&deps, &cancel, &args, filter, "Burned subtitles".into()).await
}

/// drawtext recipes per animation. Slides move toward the anchor over
/// `duration`; fade ramps alpha; zoom rides a fade with a position drift
/// (drawtext cannot animate font size).
pub(crate) fn animated_text_filter(
    text: &str,
    animation: &str,
    start: f64,
    duration: f64,
    font_size: u64,
    color: &str,
) -> Result<String> {
    let escaped = escape_filter_text(text);
    let t = format!("(t-{start})/{duration}");
    let progress = format!("min(1\\,max(0\\,{t}))");

    let (x, y, alpha) = match animation {
        "fade" => (
            "(w-text_w)/2".to_string(),
            "(h-text_h)/2".to_string(),
            Some(progress.clone()),
        ),
        "slide-left" => (
            format!("w-(w/2+text_w/2)*{progress}"),
            "(h-text_h)/2".to_string(),
            None,
        ),
        "slide-right" => (
            format!("-text_w+(w/2+text_w/2)*{progress}"),
            "(h-text_h)/2".to_string(),
            None,
        ),
        "slide-up" => (
            "(w-text_w)/2".to_string(),
            format!("h-(h/2+text_h/2)*{progress}"),
            None,
        ),
        "slide-down" => (
            "(w-text_w)/2".to_string(),
            format!("-text_h+(h/2+text_h/2)*{progress}"),
            None,
        ),
        "zoom" => (
            "(w-text_w)/2".to_string(),
            format!("(h-text_h)/2+20*(1-{progress})"),
            Some(progress.clone()),
        ),
        other => {
            return Err(Error::SchemaViolation(format!(
                "unknown animation \"{other}\""
            )))
        }
    };

    let mut filter = format!(
        "drawtext=text='{escaped}':fontsize={font_size}:fontcolor={color}:x={x}:y={y}"
    );
    if let Some(alpha) = alpha {
        filter.push_str(&format!(":alpha='{alpha}'"));
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_gets_alpha_ramp() {
        let f = animated_text_filter("Hi", "fade", 2.0, 1.5, 48, "white").unwrap();
        assert!(f.contains("alpha='min(1\\,max(0\\,(t-2)/1.5))'"));
        assert!(f.contains("x=(w-text_w)/2"));
    }

    #[test]
    fn slides_move_toward_center() {
        let left = animated_text_filter("Hi", "slide-left", 0.0, 1.0, 48, "white").unwrap();
        assert!(left.contains("x=w-(w/2+text_w/2)*"));
        let down = animated_text_filter("Hi", "slide-down", 0.0, 1.0, 48, "white").unwrap();
        assert!(down.contains("y=-text_h+"));
    }

    #[test]
    fn unknown_animation_is_rejected() {
        assert!(animated_text_filter("Hi", "spin", 0.0, 1.0, 48, "white").is_err());
    }
}
