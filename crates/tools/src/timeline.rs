//! Timeline tools: named in-memory edit timelines with undo/redo.
//!
//! Timelines live for the process lifetime. Every mutation snapshots the
//! clip list onto the undo stack; redo is cleared by any new edit.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_domain::tool::ToolResult;

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::video::register_tool_fn;
use crate::{tool_def, ToolDeps};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineClip {
    pub path: String,
    pub start: f64,
    pub end: f64,
    pub label: Option<String>,
}

#[derive(Debug, Default, Clone)]
struct TimelineState {
    clips: Vec<TimelineClip>,
    playhead: f64,
    undo: Vec<Vec<TimelineClip>>,
    redo: Vec<Vec<TimelineClip>>,
}

impl TimelineState {
    fn total_duration(&self) -> f64 {
        self.clips.iter().map(|c| c.end - c.start).sum()
    }

    fn snapshot_for_edit(&mut self) {
        self.undo.push(self.clips.clone());
        self.redo.clear();
    }
}

#[derive(Default)]
pub struct TimelineStore {
    timelines: Mutex<BTreeMap<String, TimelineState>>,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "create_timeline",
            "Create a named empty timeline.",
            json!({
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"]
            })
        ),
        create_timeline
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "add_to_timeline",
            "Append a clip (a file and a time range within it) to a timeline.",
            json!({
                "type": "object",
                "properties": {
                    "timeline": { "type": "string" },
                    "path": { "type": "string" },
                    "start": { "type": "number", "minimum": 0 },
                    "end": { "type": "number", "exclusiveMinimum": 0 },
                    "label": { "type": "string" }
                },
                "required": ["timeline", "path", "start", "end"]
            })
        ),
        add_to_timeline
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "undo",
            "Undo the last timeline edit.",
            json!({
                "type": "object",
                "properties": { "timeline": { "type": "string" } },
                "required": ["timeline"]
            })
        ),
        undo
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "redo",
            "Redo the last undone timeline edit.",
            json!({
                "type": "object",
                "properties": { "timeline": { "type": "string" } },
                "required": ["timeline"]
            })
        ),
        redo
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "view_timeline",
            "Show a timeline's clips, duration, and playhead.",
            json!({
                "type": "object",
                "properties": { "timeline": { "type": "string" } },
                "required": ["timeline"]
            })
        ),
        view_timeline
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "jump_to_timeline_point",
            "Move the playhead to a time (seconds) or a clip index.",
            json!({
                "type": "object",
                "properties": {
                    "timeline": { "type": "string" },
                    "time": { "type": "number", "minimum": 0 },
                    "clipIndex": { "type": "integer", "minimum": 0 }
                },
                "required": ["timeline"]
            })
        ),
        jump_to_timeline_point
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "list_timelines",
            "List all timelines with clip counts and durations.",
            json!({ "type": "object", "properties": {} })
        ),
        list_timelines
    );

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn create_timeline(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let name = req_str(&args, "name")?;
    let mut timelines = deps.timelines.timelines.lock();
    if timelines.contains_key(name) {
        return Err(Error::SchemaViolation(format!(
            "timeline \"{name}\" already exists"
        )));
    }
    timelines.insert(name.to_string(), TimelineState::default());
    Ok(ToolResult::ok(format!("Created timeline \"{name}\"")))
}

async fn add_to_timeline(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let name = req_str(&args, "timeline")?;
    let path = input_path(&args, "path")?;
    let start = req_f64(&args, "start")?;
    let end = req_f64(&args, "end")?;
    if end <= start {
        return Err(Error::SchemaViolation(format!(
            "end {end} must be after start {start}"
        )));
    }

    let mut timelines = deps.timelines.timelines.lock();
    let timeline = timelines
        .get_mut(name)
        .ok_or_else(|| Error::Other(format!("timeline \"{name}\" does not exist")))?;
    timeline.snapshot_for_edit();
    timeline.clips.push(TimelineClip {
        path: path.to_string_lossy().into_owned(),
        start,
        end,
        label: opt_str(&args, "label").map(str::to_string),
    });
    let count = timeline.clips.len();
    let duration = timeline.total_duration();
    Ok(ToolResult::ok(format!(
        "Added clip {count} ({:.2}s); timeline \"{name}\" is now {duration:.2}s",
        end - start
    )))
}

async fn undo(deps: Arc<ToolDeps>, args: Value, _cancel: CancellationToken) -> Result<ToolResult> {
    let name = req_str(&args, "timeline")?;
    let mut timelines = deps.timelines.timelines.lock();
    let timeline = timelines
        .get_mut(name)
        .ok_or_else(|| Error::Other(format!("timeline \"{name}\" does not exist")))?;
    let Some(previous) = timeline.undo.pop() else {
        return Ok(ToolResult::fail(format!(
            "nothing to undo on \"{name}\""
        )));
    };
    timeline.redo.push(std::mem::replace(&mut timeline.clips, previous));
    Ok(ToolResult::ok(format!(
        "Undid last edit; \"{name}\" has {} clip(s)",
        timeline.clips.len()
    )))
}

async fn redo(deps: Arc<ToolDeps>, args: Value, _cancel: CancellationToken) -> Result<ToolResult> {
    let name = req_str(&args, "timeline")?;
    let mut timelines = deps.timelines.timelines.lock();
    let timeline = timelines
        .get_mut(name)
        .ok_or_else(|| Error::Other(format!("timeline \"{name}\" does not exist")))?;
    let Some(next) = timeline.redo.pop() else {
        return Ok(ToolResult::fail(format!("nothing to redo on \"{name}\"")));
    };
    timeline.undo.push(std::mem::replace(&mut timeline.clips, next));
    Ok(ToolResult::ok(format!(
        "Redid edit; \"{name}\" has {} clip(s)",
        timeline.clips.len()
    )))
}

async fn view_timeline(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let name = req_str(&args, "timeline")?;
    let timelines = deps.timelines.timelines.lock();
    let timeline = timelines
        .get(name)
        .ok_or_else(|| Error::Other(format!("timeline \"{name}\" does not exist")))?;

    let mut lines = Vec::with_capacity(timeline.clips.len());
    let mut offset = 0.0;
    for (i, clip) in timeline.clips.iter().enumerate() {
        let len = clip.end - clip.start;
        lines.push(format!(
            "  {i}: [{offset:.2}s - {:.2}s] {} [{:.2}-{:.2}]{}",
            offset + len,
            clip.path,
            clip.start,
            clip.end,
            clip.label
                .as_deref()
                .map(|l| format!(" ({l})"))
                .unwrap_or_default()
        ));
        offset += len;
    }
    let body = if lines.is_empty() {
        "  (empty)".to_string()
    } else {
        lines.join("\n")
    };
    Ok(ToolResult::ok_with_data(
        format!(
            "Timeline \"{name}\": {} clip(s), {:.2}s, playhead {:.2}s\n{body}",
            timeline.clips.len(),
            timeline.total_duration(),
            timeline.playhead
        ),
        json!({
            "name": name,
            "clips": timeline.clips,
            "duration": timeline.total_duration(),
            "playhead": timeline.playhead,
        }),
    ))
}

async fn jump_to_timeline_point(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let name = req_str(&args, "timeline")?;
    let mut timelines = deps.timelines.timelines.lock();
    let timeline = timelines
        .get_mut(name)
        .ok_or_else(|| Error::Other(format!("timeline \"{name}\" does not exist")))?;

    let target = match (opt_f64(&args, "time"), opt_u64(&args, "clipIndex")) {
        (Some(t), None) => t.clamp(0.0, timeline.total_duration()),
        (None, Some(idx)) => {
            let idx = idx as usize;
            if idx >= timeline.clips.len() {
                return Err(Error::SchemaViolation(format!(
                    "clip index {idx} out of range ({} clips)",
                    timeline.clips.len()
                )));
            }
            timeline
                .clips
                .iter()
                .take(idx)
                .map(|c| c.end - c.start)
                .sum()
        }
        _ => {
            return Err(Error::SchemaViolation(
                "give time or clipIndex, exactly one".into(),
            ))
        }
    };
    timeline.playhead = target;
    Ok(ToolResult::ok(format!(
        "Playhead of \"{name}\" at {target:.2}s"
    )))
}

async fn list_timelines(
    deps: Arc<ToolDeps>,
    _args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let timelines = deps.timelines.timelines.lock();
    if timelines.is_empty() {
        return Ok(ToolResult::ok("No timelines"));
    }
    let listing = timelines
        .iter()
        .map(|(name, t)| {
            format!(
                "  {name}: {} clip(s), {:.2}s",
                t.clips.len(),
                t.total_duration()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    Ok(ToolResult::ok(format!(
        "{} timeline(s):\n{listing}",
        timelines.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_redo_round_trip() {
        let mut state = TimelineState::default();
        state.snapshot_for_edit();
        state.clips.push(TimelineClip {
            path: "a.mp4".into(),
            start: 0.0,
            end: 2.0,
            label: None,
        });
        state.snapshot_for_edit();
        state.clips.push(TimelineClip {
            path: "b.mp4".into(),
            start: 1.0,
            end: 4.0,
            label: None,
        });
        assert_eq!(state.clips.len(), 2);
        assert!((state.total_duration() - 5.0).abs() < 1e-9);

        // Undo removes the second clip.
        let previous = state.undo.pop().unwrap();
        state.redo.push(std::mem::replace(&mut state.clips, previous));
        assert_eq!(state.clips.len(), 1);

        // Redo restores it.
        let next = state.redo.pop().unwrap();
        state.undo.push(std::mem::replace(&mut state.clips, next));
        assert_eq!(state.clips.len(), 2);
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut state = TimelineState::default();
        state.snapshot_for_edit();
        state.clips.push(TimelineClip {
            path: "a.mp4".into(),
            start: 0.0,
            end: 1.0,
            label: None,
        });
        let previous = state.undo.pop().unwrap();
        state.redo.push(std::mem::replace(&mut state.clips, previous));
        assert_eq!(state.redo.len(), 1);

        state.snapshot_for_edit();
        assert!(state.redo.is_empty());
    }
}
