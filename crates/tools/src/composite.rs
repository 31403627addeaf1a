//! Composites: picture-in-picture and split-screen grids.

use std::path::PathBuf;
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
            "picture_in_picture",
            "Overlay a small video on a main video at one of nine anchors or explicit coordinates.",
            json!({
                "type": "object",
                "properties": {
                    "main": { "type": "string" },
                    "overlay": { "type": "string" },
                    "output": { "type": "string" },
                    "position": {
                        "type": "string",
                        "enum": ["top-left", "top-center", "top-right",
                                  "center-left", "center", "center-right",
                                  "bottom-left", "bottom-center", "bottom-right"]
                    },
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "scale": { "type": "number", "exclusiveMinimum": 0, "maximum": 1, "description": "Overlay width as a fraction of the main video (default 0.25)" }
                },
                "required": ["main", "overlay", "output"]
            })
        ),
        picture_in_picture
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "split_screen",
            "Tile videos side by side: horizontal, vertical, 2x2 or 3x3.",
            json!({
                "type": "object",
                "properties": {
                    "inputs": { "type": "array", "items": { "type": "string" }, "minItems": 2 },
                    "output": { "type": "string" },
                    "layout": { "type": "string", "enum": ["horizontal", "vertical", "2x2", "3x3"] }
                },
                "required": ["inputs", "output", "layout"]
            })
        ),
        split_screen
    );

    Ok(())
}

async fn picture_in_picture(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let main = input_path(&args, "main")?;
    let overlay = input_path(&args, "overlay")?;
    let output = output_path(&args, "output", &[&main, &overlay])?;
    let scale = opt_f64(&args, "scale").unwrap_or(0.25);

    let (x, y) = match (opt_f64(&args, "x"), opt_f64(&args, "y")) {
        (Some(x), Some(y)) => (format!("{x}"), format!("{y}")),
        (None, None) => {
            let position = opt_str(&args, "position").unwrap_or("bottom-right");
            anchor_expr(position, "w", "h")?
        }
        _ => {
            return Err(Error::SchemaViolation(
                "give both x and y, or neither".into(),
            ))
        }
    };

    let filter =
        format!("[1:v]scale=iw*{scale}:-2[pip];[0:v][pip]overlay={x}:{y}[v]");

    let stage = StagedOutput::new(&output)?;
    let main_s = main.to_string_lossy();
    let overlay_s = overlay.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", main_s.as_ref(),
                "-i", overlay_s.as_ref(),
                "-filter_complex", &filter,
                "-map", "[v]",
                "-map", "0:a?",
                "-c:a", "copy",
                "-f", output_muxer(&output),
                &out_s,
            ],
        )
        .await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Picture-in-picture -> {}",
        committed.display()
    )))
}

async fn split_screen(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let inputs = input_paths(&args, "inputs")?;
    let input_refs: Vec<&PathBuf> = inputs.iter().collect();
    let output = output_path(&args, "output", &input_refs)?;
    let layout = req_str(&args, "layout")?;

    let needed = match layout {
        "horizontal" | "vertical" => 2,
        "2x2" => 4,
        "3x3" => 9,
        other => {
            return Err(Error::SchemaViolation(format!(
                "unknown layout \"{other}\""
            )))
        }
    };
    if inputs.len() != needed {
        return Err(Error::SchemaViolation(format!(
            "layout {layout} needs exactly {needed} inputs, got {}",
            inputs.len()
        )));
    }

    let filter = split_screen_filter(layout, needed);

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
        "-filter_complex",
        filter.as_str(),
        "-map",
        "[v]",
        "-map",
        "0:a?",
        "-c:a",
        "copy",
    ]);
    cmd.push("-f");
    cmd.push(output_muxer(&output));
    cmd.push(&out_s);
    deps.runner().execute(&cancel, &cmd).await?;
    let committed = stage.commit()?;
    Ok(ToolResult::ok(format!(
        "Split screen ({layout}) -> {}",
        committed.display()
    )))
}

/// Normalize every tile to a common size, then stack.
pub(crate) fn split_screen_filter(layout: &str, count: usize) -> String {
    let mut filter = String::new();
    for i in 0..count {
        filter.push_str(&format!("[{i}:v]scale=640:360,setsar=1[t{i}];"));
    }
    let tiles: String = (0..count).map(|i| format!("[t{i}]")).collect();
    match layout {
        "horizontal" => filter.push_str(&format!("{tiles}hstack=inputs={count}[v]")),
        "vertical" => filter.push_str(&format!("{tiles}vstack=inputs={count}[v]")),
        "2x2" => filter.push_str(&format!(
            "{tiles}xstack=inputs=4:layout=0_0|w0_0|0_h0|w0_h0[v]"
        )),
        _ => filter.push_str(&format!(
            "{tiles}xstack=inputs=9:layout=0_0|w0_0|w0+w1_0|0_h0|w0_h0|w0+w1_h0|0_h0+h1|w0_h0+h1|w0+w1_h0+h1[v]"
        )),
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_uses_hstack() {
        let f = split_screen_filter("horizontal", 2);
        assert!(f.contains("hstack=inputs=2"));
        assert!(f.contains("[0:v]scale=640:360"));
    }

    #[test]
    fn grid_layouts_use_xstack() {
        assert!(split_screen_filter("2x2", 4).contains("xstack=inputs=4"));
        let nine = split_screen_filter("3x3", 9);
        assert!(nine.contains("xstack=inputs=9"));
        assert_eq!(nine.matches("scale=640:360").count(), 9);
    }
}
