//! Multi-take project tools: thin adapters over the pipeline manager.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use cf_domain::config::QualityPreset;
use cf_domain::error::Result;
use cf_domain::tool::ToolResult;
use cf_media::WebResolution;
use cf_multitake::Project;

use crate::args::*;
use crate::registry::ToolRegistry;
use crate::video::register_tool_fn;
use crate::{tool_def, ToolDeps};

pub fn register(registry: &mut ToolRegistry, deps: &Arc<ToolDeps>) -> Result<()> {
    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "create_multi_take_project",
            "Create a multi-take project from a script. Sections are split on blank lines.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "script": { "type": "string" },
                    "root": { "type": "string", "description": "Optional project directory root" }
                },
                "required": ["name", "script"]
            })
        ),
        create_project
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "add_takes_to_project",
            "Register recorded takes with a project. Files are copied (or moved) into source/.",
            json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "paths": { "type": "array", "items": { "type": "string" }, "minItems": 1 },
                    "move": { "type": "boolean", "description": "Move instead of copy (default false)" }
                },
                "required": ["projectId", "paths"]
            })
        ),
        add_takes
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "analyze_takes",
            "Analyze every take: transcript, script matching, audio/video quality, issues.",
            json!({
                "type": "object",
                "properties": { "projectId": { "type": "string" } },
                "required": ["projectId"]
            })
        ),
        analyze_takes
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "get_project_analysis",
            "Get the project's per-take analysis results.",
            json!({
                "type": "object",
                "properties": { "projectId": { "type": "string" } },
                "required": ["projectId"]
            })
        ),
        get_analysis
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "select_best_takes",
            "Pick the best take per script section by composite rank.",
            json!({
                "type": "object",
                "properties": { "projectId": { "type": "string" } },
                "required": ["projectId"]
            })
        ),
        select_best
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "assemble_best_takes",
            "Cut and concatenate the selected takes into output/.",
            json!({
                "type": "object",
                "properties": { "projectId": { "type": "string" } },
                "required": ["projectId"]
            })
        ),
        assemble
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "export_final_video",
            "Transcode the assembled cut for web delivery into exports/.",
            json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "quality": { "type": "string", "enum": ["high", "medium", "low"] },
                    "resolution": { "type": "string", "enum": ["4k", "1080p", "720p", "480p"] }
                },
                "required": ["projectId"]
            })
        ),
        export_final
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "get_project_issues",
            "Aggregate take and project issues into a report under analysis/.",
            json!({
                "type": "object",
                "properties": { "projectId": { "type": "string" } },
                "required": ["projectId"]
            })
        ),
        project_issues
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "list_multi_take_projects",
            "List all multi-take projects.",
            json!({ "type": "object", "properties": {} })
        ),
        list_projects
    );

    register_tool_fn!(
        registry,
        deps,
        tool_def(
            "cleanup_project_temp",
            "Sweep aged files out of the project's temp/ directory.",
            json!({
                "type": "object",
                "properties": { "projectId": { "type": "string" } },
                "required": ["projectId"]
            })
        ),
        cleanup_temp
    );

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn project_summary(p: &Project) -> Value {
    json!({
        "projectId": p.id,
        "name": p.name,
        "phase": p.status.phase,
        "progress": p.status.progress,
        "sections": p.script.sections.len(),
        "takes": p.takes.len(),
        "errors": p.status.errors,
    })
}

async fn create_project(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let name = req_str(&args, "name")?;
    let script = req_str(&args, "script")?;
    let root = opt_str(&args, "root").map(PathBuf::from);

    let project = deps.multitake()?.create_project(name, script, root)?;
    Ok(ToolResult::ok_with_data(
        format!(
            "Created project \"{}\" ({}) with {} sections at {}",
            project.name,
            project.id,
            project.script.sections.len(),
            project.directories.root.display()
        ),
        project_summary(&project),
    ))
}

async fn add_takes(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let project_id = req_str(&args, "projectId")?;
    let paths = input_paths(&args, "paths")?;
    let move_files = opt_bool(&args, "move").unwrap_or(false);

    let project = deps
        .multitake()?
        .add_takes(&cancel, project_id, &paths, move_files)
        .await?;
    Ok(ToolResult::ok_with_data(
        format!(
            "Registered {} take(s); project now has {}",
            paths.len(),
            project.takes.len()
        ),
        project_summary(&project),
    ))
}

async fn analyze_takes(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    deps.require_transcription_key()?;
    let project_id = req_str(&args, "projectId")?;
    let project = deps.multitake()?.analyze(&cancel, project_id).await?;

    let lines: Vec<String> = project
        .takes
        .iter()
        .map(|t| {
            format!(
                "  {}: {:?}, score {:.0}, coverage {:.0}%, {} issue(s)",
                t.take_id,
                t.status,
                t.overall_score,
                t.coverage * 100.0,
                t.issues.len()
            )
        })
        .collect();
    Ok(ToolResult::ok_with_data(
        format!("Analysis complete:\n{}", lines.join("\n")),
        serde_json::to_value(&project)?,
    ))
}

async fn get_analysis(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let project_id = req_str(&args, "projectId")?;
    let project = deps.multitake()?.get_analysis(project_id)?;
    Ok(ToolResult::ok_with_data(
        format!(
            "Project \"{}\": phase {:?}, {} takes analyzed",
            project.name,
            project.status.phase,
            project
                .takes
                .iter()
                .filter(|t| t.status == cf_multitake::TakeStatus::Analyzed)
                .count()
        ),
        serde_json::to_value(&project)?,
    ))
}

async fn select_best(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let project_id = req_str(&args, "projectId")?;
    let project = deps.multitake()?.select_best(project_id)?;

    let lines: Vec<String> = project
        .best_takes
        .iter()
        .map(|s| match &s.take_id {
            Some(take) => format!("  {}: {} ({})", s.section_id, take, s.reason),
            None => format!("  {}: MISSING - no covering take", s.section_id),
        })
        .collect();
    Ok(ToolResult::ok_with_data(
        format!("Best takes:\n{}", lines.join("\n")),
        serde_json::to_value(&project.best_takes)?,
    ))
}

async fn assemble(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let project_id = req_str(&args, "projectId")?;
    let (project, output) = deps.multitake()?.assemble(&cancel, project_id).await?;
    Ok(ToolResult::ok_with_data(
        format!("Assembled -> {}", output.display()),
        json!({ "output": output, "project": project_summary(&project) }),
    ))
}

async fn export_final(
    deps: Arc<ToolDeps>,
    args: Value,
    cancel: CancellationToken,
) -> Result<ToolResult> {
    let project_id = req_str(&args, "projectId")?;
    let quality = match opt_str(&args, "quality") {
        Some("high") => QualityPreset::High,
        Some("low") => QualityPreset::Low,
        Some("medium") => QualityPreset::Medium,
        _ => deps.config.snapshot().default_quality,
    };
    let resolution = opt_str(&args, "resolution")
        .map(WebResolution::parse)
        .transpose()?;

    let (project, output) = deps
        .multitake()?
        .export(&cancel, project_id, quality, resolution)
        .await?;
    Ok(ToolResult::ok_with_data(
        format!("Exported -> {}", output.display()),
        json!({ "output": output, "project": project_summary(&project) }),
    ))
}

async fn project_issues(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let project_id = req_str(&args, "projectId")?;
    let report = deps.multitake()?.issues_report(project_id)?;
    let take_count = report["takes"].as_array().map(Vec::len).unwrap_or(0);
    Ok(ToolResult::ok_with_data(
        format!("Issues report for {take_count} take(s) written to analysis/"),
        report,
    ))
}

async fn list_projects(
    deps: Arc<ToolDeps>,
    _args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let projects = deps.multitake()?.list_projects()?;
    if projects.is_empty() {
        return Ok(ToolResult::ok_with_data(
            "No multi-take projects",
            json!({ "projects": [] }),
        ));
    }
    let lines: Vec<String> = projects
        .iter()
        .map(|p| {
            format!(
                "  {} \"{}\": {:?}, {} takes, {} sections",
                p.id,
                p.name,
                p.status.phase,
                p.takes.len(),
                p.script.sections.len()
            )
        })
        .collect();
    let summaries: Vec<Value> = projects.iter().map(project_summary).collect();
    Ok(ToolResult::ok_with_data(
        format!("{} project(s):\n{}", projects.len(), lines.join("\n")),
        json!({ "projects": summaries }),
    ))
}

async fn cleanup_temp(
    deps: Arc<ToolDeps>,
    args: Value,
    _cancel: CancellationToken,
) -> Result<ToolResult> {
    let project_id = req_str(&args, "projectId")?;
    let removed = deps.multitake()?.cleanup_temp(project_id)?;
    Ok(ToolResult::ok(format!(
        "Removed {removed} aged temp file(s)"
    )))
}
