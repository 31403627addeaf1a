//! Best-take selection and assembly-plan validation (pure logic).

use cf_analysis::scoring::selection_rank;
use cf_analysis::{Issue, IssueKind, Severity};
use cf_domain::error::{Error, Result};

use crate::model::{BestTakeSelection, Project, TakeStatus};

/// Minimum believable assembly length.
const MIN_PLAN_SECONDS: f64 = 5.0;

/// For each script section, rank the takes that cover it and pick the best.
/// Sections no take covers get a null selection plus a project-level
/// missing-coverage issue.
pub fn select_best_takes(project: &Project) -> (Vec<BestTakeSelection>, Vec<Issue>) {
    let mut selections = Vec::with_capacity(project.script.sections.len());
    let mut issues = Vec::new();

    for section in &project.script.sections {
        let mut best: Option<(f64, BestTakeSelection)> = None;

        for take in &project.takes {
            if take.status != TakeStatus::Analyzed {
                continue;
            }
            let Some(section_match) = take
                .script_matches
                .iter()
                .find(|m| m.section_id == section.id && m.covered)
            else {
                continue;
            };
            let Some(range) = section_match.time_range else {
                continue;
            };

            let rank = selection_rank(
                take.overall_score,
                take.error_count(),
                take.warning_count(),
                section_match.match_quality,
            );
            let replace = best.as_ref().map(|(r, _)| rank > *r).unwrap_or(true);
            if replace {
                best = Some((
                    rank,
                    BestTakeSelection {
                        section_id: section.id.clone(),
                        take_id: Some(take.take_id.clone()),
                        file_path: Some(take.file_path.clone()),
                        time_range: Some(range),
                        score: rank,
                        reason: format!(
                            "score {:.1} (overall {:.0}, match {:.0}, {} errors, {} warnings)",
                            rank,
                            take.overall_score,
                            section_match.match_quality,
                            take.error_count(),
                            take.warning_count()
                        ),
                    },
                ));
            }
        }

        match best {
            Some((_, selection)) => selections.push(selection),
            None => {
                issues.push(Issue {
                    kind: IssueKind::MissingCoverage,
                    severity: Severity::Error,
                    message: format!("no take covers {}", section.id),
                    section_id: Some(section.id.clone()),
                });
                selections.push(BestTakeSelection {
                    section_id: section.id.clone(),
                    take_id: None,
                    file_path: None,
                    time_range: None,
                    score: 0.0,
                    reason: "no covering take".into(),
                });
            }
        }
    }

    (selections, issues)
}

#[derive(Debug, Clone)]
pub struct PlanValidation {
    pub total_duration: f64,
    pub missing_sections: usize,
    pub warnings: Vec<String>,
}

/// Phase-5 gate before assembly. A minority of missing sections degrades to
/// warnings; an empty or majority-missing or sub-5-second plan is rejected.
pub fn validate_plan(selections: &[BestTakeSelection]) -> Result<PlanValidation> {
    let total_sections = selections.len();
    let missing: Vec<&BestTakeSelection> =
        selections.iter().filter(|s| s.take_id.is_none()).collect();

    if total_sections == 0 || missing.len() == total_sections {
        return Err(Error::NoSuitableTake(
            "no section has a covering take".into(),
        ));
    }
    if missing.len() * 2 > total_sections {
        return Err(Error::InsufficientCoverage(format!(
            "{} of {} sections have no covering take",
            missing.len(),
            total_sections
        )));
    }

    let total_duration: f64 = selections
        .iter()
        .filter_map(|s| s.time_range)
        .map(|r| r.duration())
        .sum();
    if total_duration < MIN_PLAN_SECONDS {
        return Err(Error::Assembly(format!(
            "planned duration {total_duration:.2}s is below the {MIN_PLAN_SECONDS}s minimum"
        )));
    }

    let warnings = missing
        .iter()
        .map(|s| format!("section {} will be skipped (no covering take)", s.section_id))
        .collect();

    Ok(PlanValidation {
        total_duration,
        missing_sections: missing.len(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::transcript::TimeRange;

    fn selection(section: &str, take: Option<&str>, range: Option<(f64, f64)>) -> BestTakeSelection {
        BestTakeSelection {
            section_id: section.into(),
            take_id: take.map(str::to_string),
            file_path: take.map(|t| format!("/takes/{t}.mp4").into()),
            time_range: range.map(|(s, e)| TimeRange { start: s, end: e }),
            score: 80.0,
            reason: String::new(),
        }
    }

    #[test]
    fn all_missing_is_rejected() {
        let plan = vec![selection("s1", None, None), selection("s2", None, None)];
        assert_eq!(
            validate_plan(&plan).unwrap_err().kind(),
            "no_suitable_take"
        );
    }

    #[test]
    fn majority_missing_is_rejected() {
        let plan = vec![
            selection("s1", Some("t1"), Some((0.0, 10.0))),
            selection("s2", None, None),
            selection("s3", None, None),
        ];
        assert_eq!(
            validate_plan(&plan).unwrap_err().kind(),
            "insufficient_coverage"
        );
    }

    #[test]
    fn short_plan_is_rejected() {
        let plan = vec![selection("s1", Some("t1"), Some((0.0, 2.0)))];
        assert_eq!(validate_plan(&plan).unwrap_err().kind(), "assembly_failed");
    }

    #[test]
    fn minority_missing_passes_with_warnings() {
        let plan = vec![
            selection("s1", Some("t1"), Some((0.0, 6.0))),
            selection("s2", Some("t2"), Some((3.0, 9.0))),
            selection("s3", None, None),
        ];
        let v = validate_plan(&plan).unwrap();
        assert_eq!(v.missing_sections, 1);
        assert_eq!(v.warnings.len(), 1);
        assert!((v.total_duration - 12.0).abs() < 1e-9);
    }
}
