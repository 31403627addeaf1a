//! Transitions: a fixed catalogue of xfade styles joining two clips.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_domain::tool::ToolResult;
use cf_media::fsops::StagedOutput;
use cf_media::probe_media;

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::video::{output_muxer, register_tool_fn};
use crate::{tool_def, ToolDeps};

/// The supported xfade transition names.
pub const TRANSITIONS: &[&str] = &[
    "fade", "fadeblack", "fadewhite", "dissolve", "distance",
    "wipeleft", "wiperight", "wipeup", "wipedown",
    "slideleft", "slideright", "slideup", "slidedown",
    "smoothleft", "smoothright", "smoothup", "smoothdown",
    "circlecrop", "rectcrop", "circleclose", "circleopen",
    "horzclose", "horzopen", "vertclose", "vertopen",
];

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "apply_transition",
            "Join two clips with a named transition. Offset defaults to the end of the first clip minus the transition duration.",
            json!({
                "type": "object",
                "properties": {
                    "input1": { "type": "string" },
                    "input2": { "type": "string" },
                    "output": { "type": "string" },
                    "transition": { "type": "string" },
                    "duration": { "type": "number", "exclusiveMinimum": 0, "description": "Transition length in seconds (default 1.0)" },
                    "offset": { "type": "number", "minimum": 0, "description": "When the transition starts, in seconds into the first clip" }
                },
                "required": ["input1", "input2", "output", "transition"]
            })
        ),
        apply_transition
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "list_transitions",
            "List the available transition names.",
            json!({ "type": "object", "properties": {} })
        ),
        list_transitions
    );

    Ok(())
}

async fn apply_transition(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input1 = input_path(&args, "input1")?;
    let input2 = input_path(&args, "input2")?;
    let output = output_path(&args, "output", &[&input1, &input2])?;
    let transition = req_str(&args, "transition")?;
    if !TRANSITIONS.contains(&transition) {
        return Err(Error::SchemaViolation(format!(
            "unknown transition \"{transition}\"; see list_transitions"
        )));
    }
    let duration = opt_f64(&args, "duration").unwrap_or(1.0);

    let offset = match opt_f64(&args, "offset") {
        Some(o) => o,
        None => {
            let first = probe_media(&deps.runner(), &cancel, &input1).await?;
            (first.duration - duration).max(0.0)
        }
    };

    let filter = format!(
        "[0:v][1:v]xfade=transition={transition}:duration={duration}:offset={offset:.3}[v];\
         [0:a][1:a]acrossfade=d={duration}[a]"
    );

    let stage = StagedOutput::new(&output)?;
    let in1_s = input1.to_string_lossy();
    let in2_s = input2.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    deps.runner()
        .execute(
            &cancel,
            &[
                "-i", in1_s.as_ref(),
                "-i", in2_s.as_ref(),
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
        "Joined with {transition} ({duration}s at {offset:.2}s) -> {}",
        committed.display()
    )))
}

async fn list_transitions(
    _deps: Arc<ToolDeps>,
    _args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    Ok(ToolResult::ok_with_data(
        format!("{} transitions: {}", TRANSITIONS.len(), TRANSITIONS.join(", ")),
        json!({ "transitions": TRANSITIONS }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_has_twenty_five_unique_names() {
        assert_eq!(TRANSITIONS.len(), 25);
        let unique: std::collections::HashSet<_> = TRANSITIONS.iter().collect();
        assert_eq!(unique.len(), TRANSITIONS.len());
    }
}
