//! Visual effects: blur, color grading, chroma key, vignette, sharpen, and
//! the Ken Burns zoom-pan over a still image.

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
            "apply_blur",
            "Blur a video: gaussian, box, motion, or radial.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "blurType": { "type": "string", "enum": ["gaussian", "box", "motion", "radial"] },
                    "strength": { "type": "number", "minimum": 0, "description": "Blur strength (default 5)" }
                },
                "required": ["input", "output"]
            })
        ),
        apply_blur
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "color_grade",
            "Adjust brightness, contrast, saturation, gamma, hue, temperature and tint.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "brightness": { "type": "number", "minimum": -1, "maximum": 1 },
                    "contrast": { "type": "number", "minimum": 0, "maximum": 4 },
                    "saturation": { "type": "number", "minimum": 0, "maximum": 3 },
                    "gamma": { "type": "number", "minimum": 0.1, "maximum": 10 },
                    "hue": { "type": "number", "description": "Hue rotation in degrees" },
                    "temperature": { "type": "number", "description": "Color temperature in Kelvin (e.g. 5500)" },
                    "tint": { "type": "number", "minimum": -1, "maximum": 1 }
                },
                "required": ["input", "output"]
            })
        ),
        color_grade
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "chroma_key",
            "Key out a color (green screen). Optionally composite over a background image.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "color": { "type": "string", "description": "Key color, e.g. 0x00FF00 or green" },
                    "similarity": { "type": "number", "minimum": 0.01, "maximum": 1 },
                    "blend": { "type": "number", "minimum": 0, "maximum": 1 },
                    "background": { "type": "string", "description": "Optional background image path" }
                },
                "required": ["input", "output"]
            })
        ),
        chroma_key
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "apply_vignette",
            "Darken the frame edges with a vignette.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "angle": { "type": "number", "description": "Vignette angle in radians (default PI/5)" }
                },
                "required": ["input", "output"]
            })
        ),
        apply_vignette
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "sharpen",
            "Sharpen a video with an unsharp mask.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "output": { "type": "string" },
                    "amount": { "type": "number", "minimum": 0, "maximum": 5, "description": "Sharpen amount (default 1.0)" }
                },
                "required": ["input", "output"]
            })
        ),
        sharpen
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "ken_burns",
            "Animate a still image with a slow zoom-pan, producing a video clip.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string", "description": "Still image path" },
                    "output": { "type": "string" },
                    "duration": { "type": "number", "exclusiveMinimum": 0, "description": "Clip length in seconds (default 5)" },
                    "zoomFrom": { "type": "number", "minimum": 1 },
                    "zoomTo": { "type": "number", "minimum": 1 },
                    "width": { "type": "integer" },
                    "height": { "type": "integer" }
                },
                "required": ["input", "output"]
            })
        ),
        ken_burns
    );

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_simple_filter(
    deps: &ToolDeps,
    cancel: &CancellationToken,
    args: &Value,
    filter: &str,
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
                "-vf", filter,
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
    Ok(ToolResult::ok(format!("{description} -> {}", committed.display())))
}

async fn apply_blur(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let strength = opt_f64(&args, "strength").unwrap_or(5.0);
    let blur_type = opt_str(&args, "blurType").unwrap_or("gaussian");
    let filter = blur_filter(blur_type, strength)?;
    run_simple_filter(
        &deps,
        &cancel,
        &args,
        &filter,
        format!("Applied {blur_type} blur ({strength})"),
    )
    .await
}

async fn color_grade(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let filter = color_grade_filter(&args);
    if filter.is_empty() {
        return Err(Error::SchemaViolation(
            "color_grade called with no adjustments".into(),
        ));
    }
    run_simple_filter(&deps, &cancel, &args, &filter, "Color graded".into()).await
}

async fn chroma_key(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let color = opt_str(&args, "color").unwrap_or("green");
    let similarity = opt_f64(&args, "similarity").unwrap_or(0.3);
    let blend = opt_f64(&args, "blend").unwrap_or(0.1);

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();

    if let Some(bg) = opt_str(&args, "background") {
        let bg_path = std::path::PathBuf::from(bg);
        cf_media::fsops::require_readable(&bg_path)?;
        let bg_s = bg_path.to_string_lossy();
        let filter = format!(
            "[1:v]colorkey={color}:{similarity}:{blend}[fg];\
             [0:v][fg]overlay=(W-w)/2:(H-h)/2[v]"
        );
        deps.runner()
            .execute(
                &cancel,
                &[
                    "-i", bg_s.as_ref(),
                    "-i", input_s.as_ref(),
                    "-filter_complex", &filter,
                    "-map", "[v]",
                    "-map", "1:a?",
                    "-c:a", "copy",
                    "-f", output_muxer(&output),
                    &out_s,
                ],
            )
            .await?;
    } else {
        // Without a background, keep the alpha channel.
        let filter = format!("colorkey={color}:{similarity}:{blend},format=yuva420p");
        deps.runner()
            .execute(
                &cancel,
                &[
                    "-i", input_s.as_ref(),
                    "-vf", &filter,
                    "-c:v", "libvpx-vp9",
                    "-f", "webm",
                    &out_s,
                ],
            )
            .await?;
    }
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Chroma keyed {color} -> {}",
        committed.display()
    )))
}

async fn apply_vignette(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let filter = match opt_f64(&args, "angle") {
        Some(angle) => format!("vignette=angle={angle}"),
        None => "vignette".to_string(),
    };
    run_simple_filter(&deps, &cancel, &args, &filter, "Applied vignette".into()).await
}

async fn sharpen(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let amount = opt_f64(&args, "amount").unwrap_or(1.0);
    let filter = format!("unsharp=5:5:{amount:.2}:5:5:0.0");
    run_simple_filter(
        &deps,
        &cancel,
        &args,
        &filter,
        format!("Sharpened (amount {amount})"),
    )
    .await
}

async fn ken_burns(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let output = output_path(&args, "output", &[&input])?;
    let duration = opt_f64(&args, "duration").unwrap_or(5.0);
    let zoom_from = opt_f64(&args, "zoomFrom").unwrap_or(1.0);
    let zoom_to = opt_f64(&args, "zoomTo").unwrap_or(1.3);
    let width = opt_i64(&args, "width").unwrap_or(1920);
    let height = opt_i64(&args, "height").unwrap_or(1080);

    const FPS: f64 = 25.0;
    let frames = (duration * FPS).round() as i64;
    let step = (zoom_to - zoom_from) / frames.max(1) as f64;
    let filter = format!(
        "zoompan=z='{zoom_from}+on*{step:.6}':d={frames}:x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':s={width}x{height}:fps={FPS}"
    );

    let stage = StagedOutput::new(&output)?;
    let input_s = input.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-loop", "1",
                "-i", input_s.as_ref(),
                "-vf", &filter,
                "-t", &format!("{duration}"),
                "-c:v", "libx264",
                "-pix_fmt", "yuv420p",
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Ken Burns {zoom_from}->{zoom_to} over {duration}s -> {}",
        committed.display()
    )))
}

// ── Pure helpers ───────────────────────────────────────────────────

pub(crate) fn blur_filter(blur_type: &str, strength: f64) -> Result<String> {
    Ok(match blur_type {
        "gaussian" => format!("gblur=sigma={strength}"),
        "box" => format!("boxblur={}", strength.round() as i64),
        // Temporal mix reads as motion blur; more frames = stronger.
        "motion" => format!("tmix=frames={}", (strength.round() as i64).clamp(2, 30)),
        // Sharp center blended toward a blurred copy by radial distance.
        "radial" => format!(
            "split[sharp][tail];[tail]gblur=sigma={strength}[soft];\
             [sharp][soft]blend=all_expr='A*(1-min(1\\,hypot(X-W/2\\,Y-H/2)/(W/2)))+B*min(1\\,hypot(X-W/2\\,Y-H/2)/(W/2))'"
        ),
        other => {
            return Err(Error::SchemaViolation(format!(
                "unknown blur type \"{other}\""
            )))
        }
    })
}

pub(crate) fn color_grade_filter(args: &Value) -> String {
    let mut chain: Vec<String> = Vec::new();

    if let Some(k) = opt_f64(args, "temperature") {
        chain.push(format!("colortemperature=temperature={}", k.round() as i64));
    }
    if let Some(tint) = opt_f64(args, "tint") {
        // Positive tint pushes magenta, negative pushes green.
        chain.push(format!(
            "colorbalance=rm={0:.3}:bm={0:.3}:gm={1:.3}",
            tint * 0.3,
            -tint * 0.3
        ));
    }

    let mut eq: Vec<String> = Vec::new();
    if let Some(b) = opt_f64(args, "brightness") {
        eq.push(format!("brightness={b}"));
    }
    if let Some(c) = opt_f64(args, "contrast") {
        eq.push(format!("contrast={c}"));
    }
    if let Some(s) = opt_f64(args, "saturation") {
        eq.push(format!("saturation={s}"));
    }
    if let Some(g) = opt_f64(args, "gamma") {
        eq.push(format!("gamma={g}"));
    }
    if !eq.is_empty() {
        chain.push(format!("eq={}", eq.join(":")));
    }
    if let Some(h) = opt_f64(args, "hue") {
        chain.push(format!("hue=h={h}"));
    }

    chain.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_variants_map_to_filters() {
        assert_eq!(blur_filter("gaussian", 3.0).unwrap(), "gblur=sigma=3");
        assert_eq!(blur_filter("box", 4.4).unwrap(), "boxblur=4");
        assert_eq!(blur_filter("motion", 5.0).unwrap(), "tmix=frames=5");
        assert!(blur_filter("radial", 5.0).unwrap().contains("blend=all_expr"));
        assert!(blur_filter("swirl", 1.0).is_err());
    }

    #[test]
    fn color_grade_composes_in_order() {
        let f = color_grade_filter(&json!({
            "temperature": 4500.0,
            "brightness": 0.1,
            "saturation": 1.2,
            "hue": 15.0
        }));
        let temp_pos = f.find("colortemperature").unwrap();
        let eq_pos = f.find("eq=").unwrap();
        let hue_pos = f.find("hue=").unwrap();
        assert!(temp_pos < eq_pos && eq_pos < hue_pos);
        assert!(f.contains("brightness=0.1"));
        assert!(f.contains("saturation=1.2"));
    }

    #[test]
    fn empty_grade_is_empty() {
        assert!(color_grade_filter(&json!({})).is_empty());
    }
}
