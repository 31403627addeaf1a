//! Composite take scoring.

use crate::matching::SectionMatch;

/// Weighted overall score, 0-100: audio 35%, video 25%, script coverage
/// 30%, script-match average 10%. Every sub-score is clipped to [0, 100]
/// before weighting.
pub fn overall_score(
    audio_score: f64,
    video_score: Option<f64>,
    matches: &[SectionMatch],
) -> f64 {
    let audio = audio_score.clamp(0.0, 100.0);
    // Audio-only takes redistribute the video weight onto audio.
    let (video, video_weight, audio_weight) = match video_score {
        Some(v) => (v.clamp(0.0, 100.0), 0.25, 0.35),
        None => (0.0, 0.0, 0.60),
    };

    let coverage = coverage_fraction(matches) * 100.0;
    let match_avg = average_match_quality(matches).clamp(0.0, 100.0);

    (audio * audio_weight + video * video_weight + coverage * 0.30 + match_avg * 0.10)
        .clamp(0.0, 100.0)
}

/// Fraction of sections this take covers, in [0, 1].
pub fn coverage_fraction(matches: &[SectionMatch]) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }
    matches.iter().filter(|m| m.covered).count() as f64 / matches.len() as f64
}

/// Mean match quality over covered sections (0 when none are covered).
pub fn average_match_quality(matches: &[SectionMatch]) -> f64 {
    let covered: Vec<f64> = matches
        .iter()
        .filter(|m| m.covered)
        .map(|m| m.match_quality)
        .collect();
    if covered.is_empty() {
        return 0.0;
    }
    covered.iter().sum::<f64>() / covered.len() as f64
}

/// Composite rank used by best-take selection:
/// `overall - 15·errors - 5·warnings + 5·bonus_if_match_quality>90`.
pub fn selection_rank(
    overall: f64,
    error_count: usize,
    warning_count: usize,
    match_quality: f64,
) -> f64 {
    let bonus = if match_quality > 90.0 { 5.0 } else { 0.0 };
    overall - 15.0 * error_count as f64 - 5.0 * warning_count as f64 + bonus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(covered: bool, quality: f64) -> SectionMatch {
        SectionMatch {
            section_id: "s".into(),
            covered,
            match_quality: quality,
            line_matches: vec![],
            time_range: None,
        }
    }

    #[test]
    fn weights_sum_to_expected_total() {
        let matches = vec![m(true, 100.0), m(true, 100.0)];
        // Perfect everything: 35 + 25 + 30 + 10 = 100.
        assert!((overall_score(100.0, Some(100.0), &matches) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn audio_only_redistributes_video_weight() {
        let matches = vec![m(true, 100.0)];
        let s = overall_score(100.0, None, &matches);
        assert!((s - 100.0).abs() < 1e-9);
    }

    #[test]
    fn coverage_term_scales_with_covered_fraction() {
        let half = vec![m(true, 80.0), m(false, 0.0)];
        let full = vec![m(true, 80.0), m(true, 80.0)];
        let s_half = overall_score(70.0, Some(70.0), &half);
        let s_full = overall_score(70.0, Some(70.0), &full);
        assert!((s_full - s_half - 15.0 - 0.0).abs() < 1.0); // +0.5 coverage * 30
    }

    #[test]
    fn rank_penalties_and_bonus() {
        assert_eq!(selection_rank(80.0, 0, 0, 95.0), 85.0);
        assert_eq!(selection_rank(80.0, 1, 2, 50.0), 80.0 - 15.0 - 10.0);
    }

    #[test]
    fn sub_scores_are_clipped() {
        let matches = vec![m(true, 150.0)];
        let s = overall_score(150.0, Some(-20.0), &matches);
        assert!(s <= 100.0);
    }
}
