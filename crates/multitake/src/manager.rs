//! Project-level orchestration of the seven pipeline phases.
//!
//! Every phase loads the project, does its work, writes status back, and
//! persists. Phases are idempotent; re-running one overwrites its own
//! output and leaves the rest of the record alone. A failing take never
//! aborts its siblings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use cf_analysis::{audio, issues, matching, scoring, video, Section};
use cf_domain::config::QualityPreset;
use cf_domain::error::{Error, Result};
use cf_media::{probe_media, MediaRunner, WebProfile, WebResolution};
use cf_transcribe::TranscriptPipeline;

use crate::layout;
use crate::model::{Phase, Project, ProjectSettings, TakeAnalysis, TakeStatus};
use crate::store::ProjectStore;
use crate::{assemble, select};

pub struct MultiTakeManager {
    store: Arc<ProjectStore>,
    runner: MediaRunner,
    transcripts: Arc<TranscriptPipeline>,
    /// Where project roots land when the caller does not name one.
    default_root: PathBuf,
}

impl MultiTakeManager {
    pub fn new(
        store: Arc<ProjectStore>,
        runner: MediaRunner,
        transcripts: Arc<TranscriptPipeline>,
        default_root: PathBuf,
    ) -> Self {
        Self {
            store,
            runner,
            transcripts,
            default_root,
        }
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    // ── Phase 1: project creation ──────────────────────────────────

    pub fn create_project(
        &self,
        name: &str,
        script: &str,
        root: Option<PathBuf>,
    ) -> Result<Project> {
        let safe_name = sanitize_name(name);
        if safe_name.is_empty() {
            return Err(Error::SchemaViolation("project name is empty".into()));
        }
        let root = root.unwrap_or_else(|| self.default_root.join(&safe_name));
        let mut project = Project::new(safe_name, script, root)?;
        layout::init_directories(&project.directories)?;
        project.set_status(Phase::Setup, 100, "project created");
        self.store.save(&project)?;
        tracing::info!(project = %project.id, sections = project.script.sections.len(), "project created");
        Ok(project)
    }

    // ── Phase 2: take registration ─────────────────────────────────

    pub async fn add_takes(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        paths: &[PathBuf],
        move_files: bool,
    ) -> Result<Project> {
        let mut project = self.store.load_by_str(project_id)?;
        layout::init_directories(&project.directories)?;

        for path in paths {
            cf_media::fsops::require_readable(path)?;
            let info = probe_media(&self.runner, cancel, path).await?;
            if !info.is_video() {
                return Err(Error::SchemaViolation(format!(
                    "{} has no video stream; takes must be video files",
                    path.display()
                )));
            }

            let file_name = path
                .file_name()
                .ok_or_else(|| Error::SchemaViolation(format!("not a file: {}", path.display())))?
                .to_string_lossy()
                .into_owned();
            let dest = cf_media::fsops::unique_destination(&project.directories.source, &file_name);

            if move_files {
                std::fs::rename(path, &dest)?;
            } else {
                // Copy never touches the original.
                std::fs::copy(path, &dest)?;
            }

            let take_id = dest
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_name.clone());
            let size = std::fs::metadata(&dest)?.len();
            project
                .takes
                .push(TakeAnalysis::registered(take_id, dest, size));
        }

        project.set_status(
            Phase::Setup,
            100,
            format!("{} takes registered", project.takes.len()),
        );
        self.store.save(&project)?;
        Ok(project)
    }

    // ── Phase 3: analysis ──────────────────────────────────────────

    pub async fn analyze(&self, cancel: &CancellationToken, project_id: &str) -> Result<Project> {
        let mut project = self.store.load_by_str(project_id)?;
        if project.takes.is_empty() {
            return Err(Error::ProjectInvalidState {
                expected: "at least one registered take".into(),
                actual: "no takes".into(),
            });
        }

        project.set_status(Phase::Analyzing, 0, "analyzing takes");
        for take in &mut project.takes {
            take.status = TakeStatus::Analyzing;
        }
        self.store.save(&project)?;

        let sections = Arc::new(project.script.sections.clone());
        let settings = Arc::new(project.settings.clone());
        let total = project.takes.len();
        let mut analyzed: Vec<TakeAnalysis> = Vec::with_capacity(total);

        if settings.stable_mode {
            for take in project.takes.clone() {
                analyzed.push(
                    analyze_one_take(
                        self.runner.clone(),
                        self.transcripts.clone(),
                        sections.clone(),
                        settings.clone(),
                        cancel.clone(),
                        take,
                    )
                    .await,
                );
            }
        } else {
            let mut set = JoinSet::new();
            for take in project.takes.clone() {
                set.spawn(analyze_one_take(
                    self.runner.clone(),
                    self.transcripts.clone(),
                    sections.clone(),
                    settings.clone(),
                    cancel.clone(),
                    take,
                ));
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(take) => analyzed.push(take),
                    Err(e) => tracing::error!(error = %e, "take analysis task panicked"),
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Merge back in registration order.
        for take in &mut project.takes {
            if let Some(result) = analyzed.iter().find(|a| a.take_id == take.take_id) {
                *take = result.clone();
            }
        }
        let failed: Vec<String> = project
            .takes
            .iter()
            .filter(|t| t.status == TakeStatus::Error)
            .map(|t| {
                format!(
                    "take {}: {}",
                    t.take_id,
                    t.error.as_deref().unwrap_or("analysis failed")
                )
            })
            .collect();
        for f in &failed {
            project.record_error(f.clone());
        }

        project.set_status(
            Phase::Analyzing,
            100,
            format!(
                "analyzed {} of {} takes",
                total - failed.len(),
                total
            ),
        );
        self.store.save(&project)?;
        Ok(project)
    }

    pub fn get_analysis(&self, project_id: &str) -> Result<Project> {
        self.store.load_by_str(project_id)
    }

    // ── Phase 4 + 5: selection ─────────────────────────────────────

    pub fn select_best(&self, project_id: &str) -> Result<Project> {
        let mut project = self.store.load_by_str(project_id)?;
        if !project
            .takes
            .iter()
            .any(|t| t.status == TakeStatus::Analyzed)
        {
            return Err(Error::ProjectInvalidState {
                expected: "analyzed takes".into(),
                actual: format!("phase {:?}", project.status.phase),
            });
        }

        project.set_status(Phase::Selecting, 0, "ranking takes per section");
        let (selections, coverage_issues) = select::select_best_takes(&project);
        for issue in &coverage_issues {
            project.record_error(issue.message.clone());
        }
        project.best_takes = selections;
        project.set_status(Phase::Selecting, 100, "best takes selected");
        self.store.save(&project)?;
        Ok(project)
    }

    // ── Phase 6: assembly ──────────────────────────────────────────

    pub async fn assemble(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<(Project, PathBuf)> {
        let mut project = self.store.load_by_str(project_id)?;
        if project.best_takes.is_empty() {
            return Err(Error::ProjectInvalidState {
                expected: "best-take selections".into(),
                actual: "selection has not run".into(),
            });
        }

        project.set_status(Phase::Assembling, 0, "cutting and concatenating");
        self.store.save(&project)?;

        match assemble::assemble_project(&self.runner, cancel, &project).await {
            Ok(output) => {
                project.set_status(Phase::Assembling, 100, "assembly complete");
                self.store.save(&project)?;
                Ok((project, output))
            }
            Err(e) => {
                project.record_error(e.to_string());
                project.set_status(Phase::Error, 100, "assembly failed");
                self.store.save(&project)?;
                Err(e)
            }
        }
    }

    // ── Phase 7: export ────────────────────────────────────────────

    pub async fn export(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        quality: QualityPreset,
        resolution: Option<WebResolution>,
    ) -> Result<(Project, PathBuf)> {
        let mut project = self.store.load_by_str(project_id)?;
        let assembled = project
            .directories
            .output
            .join(format!("{}_assembled.mp4", project.name));
        if !assembled.exists() {
            return Err(Error::ProjectInvalidState {
                expected: "assembled output".into(),
                actual: "assembly has not run".into(),
            });
        }

        let profile = WebProfile::new(quality, resolution.unwrap_or(WebResolution::Fhd1080));
        match assemble::export_project(&self.runner, cancel, &project, &assembled, profile).await {
            Ok(output) => {
                project.set_status(Phase::Complete, 100, "export complete");
                self.store.save(&project)?;
                Ok((project, output))
            }
            Err(e) => {
                project.record_error(e.to_string());
                project.set_status(Phase::Error, 100, "export failed");
                self.store.save(&project)?;
                Err(e)
            }
        }
    }

    // ── Reports, listing, cleanup ──────────────────────────────────

    /// Aggregate per-take and project-level issues, write the report under
    /// `analysis/`, and return it.
    pub fn issues_report(&self, project_id: &str) -> Result<serde_json::Value> {
        let project = self.store.load_by_str(project_id)?;
        let take_issues: Vec<serde_json::Value> = project
            .takes
            .iter()
            .map(|t| {
                serde_json::json!({
                    "takeId": t.take_id,
                    "status": t.status,
                    "overallScore": t.overall_score,
                    "coverage": t.coverage,
                    "issues": t.issues,
                    "error": t.error,
                })
            })
            .collect();
        let report = serde_json::json!({
            "projectId": project.id,
            "name": project.name,
            "phase": project.status.phase,
            "projectErrors": project.status.errors,
            "takes": take_issues,
        });

        let path = project.directories.analysis.join("issues_report.json");
        std::fs::create_dir_all(&project.directories.analysis)?;
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        Ok(report)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.store.list()
    }

    pub fn cleanup_temp(&self, project_id: &str) -> Result<usize> {
        let project = self.store.load_by_str(project_id)?;
        layout::sweep_temp(&project.directories, project.settings.temp_max_age_hours)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-take analysis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Analyze one take end to end. Failures are folded into the take record
/// (`status = Error`) so one bad file cannot sink the batch.
async fn analyze_one_take(
    runner: MediaRunner,
    transcripts: Arc<TranscriptPipeline>,
    sections: Arc<Vec<Section>>,
    settings: Arc<ProjectSettings>,
    cancel: CancellationToken,
    mut take: TakeAnalysis,
) -> TakeAnalysis {
    match analyze_take_inner(&runner, &transcripts, &sections, &settings, &cancel, &mut take).await
    {
        Ok(()) => {
            take.status = TakeStatus::Analyzed;
            take.error = None;
        }
        Err(e) => {
            tracing::warn!(take = %take.take_id, error = %e, "take analysis failed");
            take.status = TakeStatus::Error;
            take.error = Some(e.to_string());
        }
    }
    take
}

async fn analyze_take_inner(
    runner: &MediaRunner,
    transcripts: &TranscriptPipeline,
    sections: &[Section],
    settings: &ProjectSettings,
    cancel: &CancellationToken,
    take: &mut TakeAnalysis,
) -> Result<()> {
    let path: &Path = &take.file_path;
    cf_media::fsops::require_readable(path)?;

    let info = probe_media(runner, cancel, path).await?;
    take.metadata = Some(info.clone());

    let transcript = transcripts
        .extract(cancel, path, None)
        .await
        .map_err(|e| e.context(&format!("take {}", take.take_id)))?;

    let matches: Vec<_> = sections
        .iter()
        .map(|s| matching::match_section(s, &transcript, settings.similarity_threshold))
        .collect();

    let audio_quality = audio::measure_audio(runner, cancel, path, &transcript).await?;
    let video_quality = if info.is_video() {
        Some(video::measure_video(runner, cancel, path, &info).await?)
    } else {
        None
    };

    let overall = scoring::overall_score(
        audio_quality.score,
        video_quality.as_ref().map(|v| v.score),
        &matches,
    );
    let coverage = scoring::coverage_fraction(&matches);
    let take_issues = issues::detect_issues(
        &audio_quality,
        video_quality.as_ref(),
        &matches,
        overall,
        &settings.thresholds,
    );

    take.transcript = Some(transcript);
    take.script_matches = matches;
    take.audio_quality = Some(audio_quality);
    take.video_quality = video_quality;
    take.overall_score = overall;
    take.coverage = coverage;
    take.issues = take_issues;
    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else if c.is_whitespace() {
                '_'
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_sanitized_for_the_filesystem() {
        assert_eq!(sanitize_name("My Launch Video!"), "My_Launch_Video-");
        assert_eq!(sanitize_name("  demo_2 "), "demo_2");
    }
}
