//! Assembly and export: extract the selected ranges, concatenate in section
//! order, then transcode the result for delivery.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_media::fsops::StagedOutput;
use cf_media::{MediaRunner, WebProfile};

use crate::model::Project;
use crate::select::validate_plan;

/// Phase 6: cut every selected range to a temp clip and concatenate.
/// Clips are re-encoded to uniform parameters so heterogeneous takes can be
/// stream-copy concatenated; transitions are deliberately not inserted.
pub(crate) async fn assemble_project(
    runner: &MediaRunner,
    cancel: &CancellationToken,
    project: &Project,
) -> Result<PathBuf> {
    let validation = validate_plan(&project.best_takes)?;
    for warning in &validation.warnings {
        tracing::warn!(project = %project.id, "{warning}");
    }

    let mut clips: Vec<PathBuf> = Vec::new();
    for (i, selection) in project.best_takes.iter().enumerate() {
        let (Some(path), Some(range)) = (&selection.file_path, selection.time_range) else {
            continue;
        };
        cf_media::fsops::require_readable(path)?;

        let clip = project
            .directories
            .temp
            .join(format!("clip_{i:02}_{}.mp4", selection.section_id));
        let input_s = path.to_string_lossy();
        let clip_s = clip.to_string_lossy();
        runner
            .execute(
                cancel,
                &[
                    "-i", input_s.as_ref(),
                    "-ss", &format!("{:.3}", range.start),
                    "-to", &format!("{:.3}", range.end),
                    "-c:v", "libx264",
                    "-preset", "fast",
                    "-crf", "18",
                    "-pix_fmt", "yuv420p",
                    "-c:a", "aac",
                    "-b:a", "192k",
                    clip_s.as_ref(),
                ],
            )
            .await
            .map_err(|e| Error::Assembly(format!("clip for {}: {e}", selection.section_id)))?;
        clips.push(clip);
    }

    if clips.is_empty() {
        return Err(Error::Assembly("no clips were produced".into()));
    }

    // Concat demuxer over the uniform clips.
    let list_path = project.directories.temp.join("concat_list.txt");
    let mut list = String::new();
    for clip in &clips {
        list.push_str(&format!(
            "file '{}'\n",
            clip.to_string_lossy().replace('\'', "'\\''")
        ));
    }
    std::fs::write(&list_path, list)?;

    let target = project
        .directories
        .output
        .join(format!("{}_assembled.mp4", project.name));
    let stage = StagedOutput::new(&target)?;
    let list_s = list_path.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    runner
        .execute(
            cancel,
            &[
                "-f", "concat",
                "-safe", "0",
                "-i", list_s.as_ref(),
                "-c", "copy",
                "-f", "mp4",
                &out_s,
            ],
        )
        .await
        .map_err(|e| Error::Assembly(format!("concatenation: {e}")))?;
    let output = stage.commit()?;

    tracing::info!(
        project = %project.id,
        clips = clips.len(),
        duration = validation.total_duration,
        output = %output.display(),
        "assembly complete"
    );
    Ok(output)
}

/// Phase 7: transcode the assembled cut for web delivery.
pub(crate) async fn export_project(
    runner: &MediaRunner,
    cancel: &CancellationToken,
    project: &Project,
    assembled: &PathBuf,
    profile: WebProfile,
) -> Result<PathBuf> {
    cf_media::fsops::require_readable(assembled)?;

    let target = project
        .directories
        .exports
        .join(format!("{}_final.mp4", project.name));
    let stage = StagedOutput::new(&target)?;

    let input_s = assembled.to_string_lossy();
    let out_s = stage.path().to_string_lossy().into_owned();
    let encode = profile.encode_args();
    let mut args: Vec<&str> = vec!["-i", input_s.as_ref()];
    args.extend(encode.iter().map(String::as_str));
    args.push("-f");
    args.push("mp4");
    args.push(&out_s);

    runner
        .execute(cancel, &args)
        .await
        .map_err(|e| Error::Export(format!("web transcode: {e}")))?;
    let output = stage.commit()?;

    tracing::info!(project = %project.id, output = %output.display(), "export complete");
    Ok(output)
}
