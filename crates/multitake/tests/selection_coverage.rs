//! Selection over partially-overlapping takes: three takes that each cover
//! two of three sections must still yield a complete plan.

use std::path::PathBuf;

use cf_analysis::SectionMatch;
use cf_domain::transcript::TimeRange;
use cf_multitake::{select_best_takes, validate_plan, Project, TakeAnalysis, TakeStatus};

fn section_match(section_id: &str, covered: bool, quality: f64, range: (f64, f64)) -> SectionMatch {
    SectionMatch {
        section_id: section_id.into(),
        covered,
        match_quality: quality,
        line_matches: vec![],
        time_range: covered.then(|| TimeRange {
            start: range.0,
            end: range.1,
        }),
    }
}

fn take(id: &str, score: f64, matches: Vec<SectionMatch>) -> TakeAnalysis {
    let mut t = TakeAnalysis::registered(
        id.into(),
        PathBuf::from(format!("/project/source/{id}.mp4")),
        1024,
    );
    t.status = TakeStatus::Analyzed;
    t.overall_score = score;
    t.coverage = matches.iter().filter(|m| m.covered).count() as f64 / matches.len() as f64;
    t.script_matches = matches;
    t
}

fn project_with_three_takes() -> Project {
    let mut p = Project::new(
        "coverage".into(),
        "Section one text.\n\nSection two text.\n\nSection three text.",
        PathBuf::from("/project"),
    )
    .unwrap();

    // take1 covers {1,2}, take2 covers {2,3}, take3 covers {1,3}.
    p.takes = vec![
        take(
            "take1",
            82.0,
            vec![
                section_match("section_1", true, 95.0, (0.0, 8.0)),
                section_match("section_2", true, 88.0, (8.5, 16.0)),
                section_match("section_3", false, 0.0, (0.0, 0.0)),
            ],
        ),
        take(
            "take2",
            78.0,
            vec![
                section_match("section_1", false, 0.0, (0.0, 0.0)),
                section_match("section_2", true, 92.0, (1.0, 9.0)),
                section_match("section_3", true, 85.0, (9.5, 18.0)),
            ],
        ),
        take(
            "take3",
            74.0,
            vec![
                section_match("section_1", true, 80.0, (0.5, 7.5)),
                section_match("section_2", false, 0.0, (0.0, 0.0)),
                section_match("section_3", true, 90.0, (8.0, 15.0)),
            ],
        ),
    ];
    p
}

#[test]
fn overlapping_takes_cover_every_section() {
    let project = project_with_three_takes();
    let (selections, issues) = select_best_takes(&project);

    assert_eq!(selections.len(), 3);
    assert!(issues.is_empty(), "no missing-coverage issues expected");
    assert!(selections.iter().all(|s| s.take_id.is_some()));

    // The plan passes phase-5 validation with no gaps.
    let validation = validate_plan(&selections).unwrap();
    assert_eq!(validation.missing_sections, 0);
    assert!(validation.total_duration > 5.0);
}

#[test]
fn highest_rank_wins_each_section() {
    let project = project_with_three_takes();
    let (selections, _) = select_best_takes(&project);

    // section_1: take1 ranks 82 + 5 (match > 90) = 87, take3 ranks 74.
    assert_eq!(selections[0].take_id.as_deref(), Some("take1"));
    // section_2: take2 ranks 78 + 5 = 83, edging out take1's 82.
    assert_eq!(selections[1].take_id.as_deref(), Some("take2"));
    // section_3: take2 ranks 78, take3 ranks 74 (match 90 earns no bonus).
    assert_eq!(selections[2].take_id.as_deref(), Some("take2"));
}

#[test]
fn error_heavy_take_loses_despite_higher_score() {
    let mut project = project_with_three_takes();
    // Give take1 two error-severity issues: 87 - 30 = 57 effective.
    let t1 = project.take_mut("take1").unwrap();
    t1.issues = vec![
        cf_analysis::Issue {
            kind: cf_analysis::IssueKind::AudioClarity,
            severity: cf_analysis::Severity::Error,
            message: "clipping".into(),
            section_id: None,
        },
        cf_analysis::Issue {
            kind: cf_analysis::IssueKind::RetakeNeeded,
            severity: cf_analysis::Severity::Error,
            message: "low score".into(),
            section_id: None,
        },
    ];

    let (selections, _) = select_best_takes(&project);
    // section_1 now goes to take3 (74) over the penalized take1 (57).
    assert_eq!(selections[0].take_id.as_deref(), Some("take3"));
}
