//! Issue detection against configured thresholds.

use serde::{Deserialize, Serialize};

use crate::audio::AudioQuality;
use crate::matching::SectionMatch;
use crate::video::VideoQuality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingCoverage,
    AudioClarity,
    ExcessiveFiller,
    PoorPacing,
    VideoClarity,
    RetakeNeeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
}

/// Quality thresholds a take is judged against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub min_clarity: f64,
    pub max_filler_per_minute: f64,
    pub min_pace_wpm: f64,
    pub max_pace_wpm: f64,
    pub min_sharpness: f64,
    pub min_brightness_pct: f64,
    pub max_brightness_pct: f64,
    pub min_overall_score: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_clarity: 40.0,
            max_filler_per_minute: 5.0,
            min_pace_wpm: 80.0,
            max_pace_wpm: 200.0,
            min_sharpness: 0.3,
            min_brightness_pct: 40.0,
            max_brightness_pct: 85.0,
            min_overall_score: 60.0,
        }
    }
}

/// Evaluate one analyzed take. Severity is graded: hard failures are
/// errors, borderline readings are warnings.
pub fn detect_issues(
    audio: &AudioQuality,
    video: Option<&VideoQuality>,
    matches: &[SectionMatch],
    overall_score: f64,
    thresholds: &Thresholds,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    for m in matches {
        if !m.covered {
            issues.push(Issue {
                kind: IssueKind::MissingCoverage,
                severity: Severity::Error,
                message: format!("section {} is not covered by this take", m.section_id),
                section_id: Some(m.section_id.clone()),
            });
        }
    }

    if audio.clarity_score < thresholds.min_clarity {
        issues.push(Issue {
            kind: IssueKind::AudioClarity,
            severity: if audio.clarity_score < thresholds.min_clarity / 2.0 {
                Severity::Error
            } else {
                Severity::Warning
            },
            message: format!(
                "audio clarity {:.0} below minimum {:.0} (mean {:.1} dB)",
                audio.clarity_score, thresholds.min_clarity, audio.mean_volume_db
            ),
            section_id: None,
        });
    }

    if audio.speech.filler_per_minute > thresholds.max_filler_per_minute {
        issues.push(Issue {
            kind: IssueKind::ExcessiveFiller,
            severity: Severity::Warning,
            message: format!(
                "{:.1} filler words per minute (limit {:.1})",
                audio.speech.filler_per_minute, thresholds.max_filler_per_minute
            ),
            section_id: None,
        });
    }

    let wpm = audio.speech.words_per_minute;
    if wpm > 0.0 && !(thresholds.min_pace_wpm..=thresholds.max_pace_wpm).contains(&wpm) {
        issues.push(Issue {
            kind: IssueKind::PoorPacing,
            severity: Severity::Warning,
            message: format!(
                "pace {:.0} wpm outside [{:.0}, {:.0}]",
                wpm, thresholds.min_pace_wpm, thresholds.max_pace_wpm
            ),
            section_id: None,
        });
    }

    if let Some(video) = video {
        let brightness_pct = video.brightness / 2.55;
        let too_dark_or_bright = brightness_pct < thresholds.min_brightness_pct
            || brightness_pct > thresholds.max_brightness_pct;
        if video.sharpness < thresholds.min_sharpness || too_dark_or_bright {
            issues.push(Issue {
                kind: IssueKind::VideoClarity,
                severity: Severity::Warning,
                message: format!(
                    "sharpness {:.2}, brightness {:.0}% (want sharpness >= {:.2}, brightness {:.0}-{:.0}%)",
                    video.sharpness,
                    brightness_pct,
                    thresholds.min_sharpness,
                    thresholds.min_brightness_pct,
                    thresholds.max_brightness_pct
                ),
                section_id: None,
            });
        }
    }

    if overall_score < thresholds.min_overall_score {
        issues.push(Issue {
            kind: IssueKind::RetakeNeeded,
            severity: Severity::Error,
            message: format!(
                "overall score {overall_score:.0} below minimum {:.0}; consider re-recording",
                thresholds.min_overall_score
            ),
            section_id: None,
        });
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{assess, VolumeStats};
    use cf_domain::transcript::{Segment, Transcript};

    fn decent_audio() -> AudioQuality {
        let t = Transcript {
            text: "ten words spoken at a comfortable steady pace here now".into(),
            segments: vec![Segment {
                text: "ten words spoken at a comfortable steady pace here now".into(),
                start: 0.0,
                end: 5.0,
                words: vec![],
            }],
            duration: 5.0,
            language: "en".into(),
        };
        assess(
            VolumeStats {
                mean_db: -17.0,
                peak_db: -3.0,
                min_db: -55.0,
                rms_db: -17.5,
            },
            &t,
        )
    }

    #[test]
    fn uncovered_sections_are_errors() {
        let matches = vec![SectionMatch {
            section_id: "section_2".into(),
            covered: false,
            match_quality: 0.0,
            line_matches: vec![],
            time_range: None,
        }];
        let issues = detect_issues(&decent_audio(), None, &matches, 80.0, &Thresholds::default());
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::MissingCoverage && i.severity == Severity::Error));
    }

    #[test]
    fn low_overall_score_flags_retake() {
        let issues = detect_issues(&decent_audio(), None, &[], 35.0, &Thresholds::default());
        assert!(issues.iter().any(|i| i.kind == IssueKind::RetakeNeeded));
    }

    #[test]
    fn clean_take_has_pacing_warning_only_when_pace_is_off() {
        // 10 words over 5 s is 120 wpm: inside the band, no pacing issue.
        let issues = detect_issues(&decent_audio(), None, &[], 85.0, &Thresholds::default());
        assert!(!issues.iter().any(|i| i.kind == IssueKind::PoorPacing));
    }
}
