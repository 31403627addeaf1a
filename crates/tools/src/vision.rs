//! Vision tools: frame sampling plus a multimodal round-trip through the
//! configured agent provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_domain::chat::{ContentPart, Message, MessageContent, Role};
use cf_domain::error::{Error, Result};
use cf_domain::stream::StreamEvent;
use cf_domain::tool::ToolResult;
use cf_providers::{ChatRequest, LlmProvider};

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::video::register_tool_fn;
use crate::{tool_def, ToolDeps};

const MAX_FRAMES: usize = 8;

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "analyze_video_content",
            "Sample frames across the video and answer a question about its content.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "question": { "type": "string", "description": "What to look for (default: general description)" }
                },
                "required": ["input"]
            })
        ),
        analyze_video_content
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "describe_scene",
            "Describe the scene at one timestamp.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "timestamp": { "type": "number", "minimum": 0 }
                },
                "required": ["input", "timestamp"]
            })
        ),
        describe_scene
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "search_visual_content",
            "Search the video for visual content matching a query; returns candidate timestamps.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "query": { "type": "string" }
                },
                "required": ["input", "query"]
            })
        ),
        search_visual_content
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "find_objects_in_video",
            "Look for a specific object across sampled frames.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "object": { "type": "string" }
                },
                "required": ["input", "object"]
            })
        ),
        find_objects_in_video
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "compare_video_frames",
            "Compare the frames at two timestamps and describe the differences.",
            json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" },
                    "time1": { "type": "number", "minimum": 0 },
                    "time2": { "type": "number", "minimum": 0 }
                },
                "required": ["input", "time1", "time2"]
            })
        ),
        compare_video_frames
    );

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frame sampling + provider round-trip
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Grab one JPEG frame at a timestamp.
async fn grab_frame(
    deps: &ToolDeps,
    cancel: &CancellationToken,
    input: &Path,
    at: f64,
) -> Result<PathBuf> {
    let frame = deps.scratch_dir.join(format!(
        "frame_{}_{:.0}ms.jpg",
        uuid::Uuid::new_v4().simple(),
        at * 1000.0
    ));
    std::fs::create_dir_all(&deps.scratch_dir)?;
    let input_s = input.to_string_lossy();
    let frame_s = frame.to_string_lossy();
    deps.runner()
        .execute(
            cancel,
            &[
                "-ss", &format!("{at:.3}"),
                "-i", input_s.as_ref(),
                "-frames:v", "1",
                "-q:v", "4",
                frame_s.as_ref(),
            ],
        )
        .await?;
    Ok(frame)
}

/// Evenly-spaced timestamps across the file.
async fn sample_timestamps(
    deps: &ToolDeps,
    cancel: &CancellationToken,
    input: &Path,
    count: usize,
) -> Result<Vec<f64>> {
    let info = cf_media::probe_media(&deps.runner(), cancel, input).await?;
    if info.duration <= 0.0 {
        return Err(Error::Other("media has no duration".into()));
    }
    let step = info.duration / (count as f64 + 1.0);
    Ok((1..=count).map(|i| step * i as f64).collect())
}

/// Send labelled frames plus a prompt through the vision provider and
/// drain the streamed answer.
async fn ask_with_frames(
    provider: Arc<dyn LlmProvider>,
    frames: Vec<(String, PathBuf)>,
    prompt: String,
) -> Result<String> {
    let mut parts: Vec<ContentPart> = Vec::with_capacity(frames.len() * 2 + 1);
    for (label, path) in &frames {
        let bytes = std::fs::read(path)?;
        parts.push(ContentPart::Text {
            text: label.clone(),
        });
        parts.push(ContentPart::Image {
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
            media_type: "image/jpeg".into(),
        });
    }
    parts.push(ContentPart::Text { text: prompt });

    let req = ChatRequest {
        messages: vec![
            Message::system(
                "You are a precise video-frame analyst. Answer concretely and \
                 reference frames by their labels.",
            ),
            Message {
                role: Role::User,
                content: MessageContent::Parts(parts),
            },
        ],
        tools: Vec::new(),
        model: None,
        max_tokens: Some(1024),
        temperature: None,
    };

    let mut stream = provider.chat_stream(req).await?;
    let mut answer = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::ContentDelta { text } => answer.push_str(&text),
            StreamEvent::Error { message } => {
                return Err(Error::RemoteApi {
                    provider: provider.provider_id().into(),
                    status: 0,
                    message,
                })
            }
            StreamEvent::Done { .. } => break,
            _ => {}
        }
    }
    // Frames served their purpose; keep the scratch dir tidy.
    for (_, path) in frames {
        let _ = std::fs::remove_file(path);
    }
    Ok(answer)
}

async fn sampled_frames_question(
    deps: Arc<ToolDeps>,
    cancel: CancellationToken,
    args: Value,
    prompt: String,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let provider = deps.vision_provider()?;

    let timestamps = sample_timestamps(&deps, &cancel, &input, MAX_FRAMES).await?;
    let mut frames = Vec::with_capacity(timestamps.len());
    for at in &timestamps {
        frames.push((format!("frame at {at:.1}s:"), grab_frame(&deps, &cancel, &input, *at).await?));
    }

    let answer = ask_with_frames(provider, frames, prompt).await?;
    Ok(ToolResult::ok_with_data(
        answer,
        json!({ "sampledTimestamps": timestamps }),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn analyze_video_content(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let question = opt_str(&args, "question")
        .unwrap_or("Describe what happens across these frames.")
        .to_string();
    sampled_frames_question(deps, cancel, args, question).await
}

async fn describe_scene(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let at = req_f64(&args, "timestamp")?;
    let provider = deps.vision_provider()?;

    let frame = grab_frame(&deps, &cancel, &input, at).await?;
    let answer = ask_with_frames(
        provider,
        vec![(format!("frame at {at:.1}s:"), frame)],
        "Describe this scene in detail: setting, subjects, lighting, composition.".into(),
    )
    .await?;
    Ok(ToolResult::ok_with_data(answer, json!({ "timestamp": at })))
}

async fn search_visual_content(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let query = req_str(&args, "query")?.to_string();
    let prompt = format!(
        "Which of these frames (if any) show: {query}? \
         Answer with the frame labels that match and why. If none match, say so."
    );
    sampled_frames_question(deps, cancel, args, prompt).await
}

async fn find_objects_in_video(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let object = req_str(&args, "object")?.to_string();
    let prompt = format!(
        "Look for \"{object}\" in each frame. For every frame state whether it is \
         present, and where in the frame if so."
    );
    sampled_frames_question(deps, cancel, args, prompt).await
}

async fn compare_video_frames(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let input = input_path(&args, "input")?;
    let t1 = req_f64(&args, "time1")?;
    let t2 = req_f64(&args, "time2")?;
    let provider = deps.vision_provider()?;

    let f1 = grab_frame(&deps, &cancel, &input, t1).await?;
    let f2 = grab_frame(&deps, &cancel, &input, t2).await?;
    let answer = ask_with_frames(
        provider,
        vec![
            (format!("frame A at {t1:.1}s:"), f1),
            (format!("frame B at {t2:.1}s:"), f2),
        ],
        "Compare frame A and frame B: what changed between them?".into(),
    )
    .await?;
    Ok(ToolResult::ok_with_data(
        answer,
        json!({ "time1": t1, "time2": t2 }),
    ))
}
