//! Audio quality measurement.
//!
//! Volume statistics come from one ffmpeg pass through `volumedetect` and
//! `astats`, with the numbers routed through `ametadata=print` to stdout so
//! the runner can capture them. Speech metrics come from the transcript:
//! pace, pauses, and a fixed filler-word vocabulary.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use cf_domain::error::{Error, Result};
use cf_domain::transcript::Transcript;
use cf_media::MediaRunner;

use crate::matching::normalize;

/// Gap lengths that count as pauses.
const SEGMENT_PAUSE_SECS: f64 = 1.0;
const WORD_PAUSE_SECS: f64 = 0.8;

/// The fixed filler vocabulary, matched case-insensitively as whole words.
pub const FILLER_WORDS: &[&str] = &[
    "um", "uh", "like", "you know", "so", "well", "actually", "basically",
    "literally", "i mean", "right", "okay", "yeah", "sort of", "kind of",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioQuality {
    pub mean_volume_db: f64,
    pub peak_volume_db: f64,
    pub min_volume_db: f64,
    pub rms_db: f64,
    /// 0-1; how evenly the level sits between peak and floor.
    pub consistency: f64,
    /// 0-100.
    pub clarity_score: f64,
    pub speech: SpeechQuality,
    /// Composite 0-100 used as the audio term of the overall score.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechQuality {
    pub words_per_minute: f64,
    /// Gaps > 1.0 s between segments.
    pub segment_pauses: u32,
    /// Gaps > 0.8 s between words inside one segment.
    pub word_pauses: u32,
    pub filler_counts: BTreeMap<String, u32>,
    pub filler_per_minute: f64,
}

/// Raw numbers parsed from the stat filters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeStats {
    pub mean_db: f64,
    pub peak_db: f64,
    pub min_db: f64,
    pub rms_db: f64,
}

/// Measure audio quality for one file, given its transcript.
pub async fn measure_audio(
    runner: &MediaRunner,
    cancel: &CancellationToken,
    path: &Path,
    transcript: &Transcript,
) -> Result<AudioQuality> {
    let stats = run_volume_stats(runner, cancel, path).await?;
    Ok(assess(stats, transcript))
}

async fn run_volume_stats(
    runner: &MediaRunner,
    cancel: &CancellationToken,
    path: &Path,
) -> Result<VolumeStats> {
    let path_s = path.to_string_lossy();
    // Stat filters report on stderr; `-f null` discards samples. The
    // "failure" tail of a successful run is empty, so route stats through
    // metadata printing on stdout instead.
    let out = runner
        .execute_capturing_output(
            cancel,
            &[
                "-i", path_s.as_ref(),
                "-map", "0:a:0",
                "-af",
                "volumedetect,astats=metadata=1,ametadata=mode=print:file=-",
                "-f", "null", "-",
            ],
        )
        .await
        .map_err(|e| e.context("audio stats pass"))?;
    parse_volume_stats(&out)
        .ok_or_else(|| Error::Other("no volume statistics in ffmpeg output".into()))
}

/// Parse the combined volumedetect/astats printout.
pub fn parse_volume_stats(output: &str) -> Option<VolumeStats> {
    let grab = |key: &str| -> Option<f64> {
        output.lines().rev().find_map(|line| {
            let line = line.trim();
            line.find(key).and_then(|pos| {
                line[pos + key.len()..]
                    .trim_start_matches([':', '=', ' '])
                    .split_whitespace()
                    .next()
                    .and_then(|v| v.parse::<f64>().ok())
            })
        })
    };

    let mean = grab("mean_volume")
        .or_else(|| grab("lavfi.astats.Overall.RMS_level"))?;
    let peak = grab("max_volume")
        .or_else(|| grab("lavfi.astats.Overall.Peak_level"))?;
    let min = grab("lavfi.astats.Overall.Min_level")
        .map(linear_to_db)
        .or_else(|| grab("min_volume"))
        .unwrap_or(mean - 30.0);
    let rms = grab("lavfi.astats.Overall.RMS_level").unwrap_or(mean);

    Some(VolumeStats {
        mean_db: mean,
        peak_db: peak,
        min_db: min,
        rms_db: rms,
    })
}

fn linear_to_db(v: f64) -> f64 {
    let v = v.abs();
    if v <= 0.0 {
        -90.0
    } else if v > 1.0 {
        // Already in dB.
        -v.abs()
    } else {
        20.0 * v.log10()
    }
}

/// Fold raw stats and the transcript into the audio-quality record.
pub fn assess(stats: VolumeStats, transcript: &Transcript) -> AudioQuality {
    let consistency =
        (1.0 - (stats.peak_db - stats.min_db - 15.0) / 30.0).clamp(0.0, 1.0);
    let clarity_score = clarity(stats);
    let speech = speech_quality(transcript);

    // Pace inside the speakable band scores full marks, falling off
    // linearly outside it.
    let pace_score = pace_score(speech.words_per_minute);

    let score = (clarity_score * 0.55 + consistency * 100.0 * 0.25 + pace_score * 0.20)
        .clamp(0.0, 100.0);

    AudioQuality {
        mean_volume_db: stats.mean_db,
        peak_volume_db: stats.peak_db,
        min_volume_db: stats.min_db,
        rms_db: stats.rms_db,
        consistency,
        clarity_score,
        speech,
        score,
    }
}

/// Clarity, 0-100: start at 50, penalize too-quiet and too-hot means,
/// reward the broadcast band and a healthy SNR.
fn clarity(stats: VolumeStats) -> f64 {
    let mut score = 50.0;
    if stats.mean_db < -30.0 {
        score -= ((-30.0 - stats.mean_db) * 1.5).min(30.0);
    } else if stats.mean_db > -10.0 {
        score -= ((stats.mean_db + 10.0) * 2.0).min(30.0);
    }
    if (-20.0..=-15.0).contains(&stats.mean_db) {
        score += 20.0;
    }
    let snr = stats.mean_db - stats.min_db;
    if snr > 20.0 {
        score += 15.0;
    }
    score.clamp(0.0, 100.0)
}

pub fn pace_score(wpm: f64) -> f64 {
    if (80.0..=200.0).contains(&wpm) {
        100.0
    } else if wpm < 80.0 {
        (wpm / 80.0 * 100.0).max(0.0)
    } else {
        (100.0 - (wpm - 200.0) / 2.0).max(0.0)
    }
}

fn speech_quality(transcript: &Transcript) -> SpeechQuality {
    let word_count = transcript
        .text
        .split_whitespace()
        .count()
        .max(transcript.words().count());
    let minutes = (transcript.duration / 60.0).max(1.0 / 60.0);
    let words_per_minute = word_count as f64 / minutes;

    let mut segment_pauses = 0u32;
    for pair in transcript.segments.windows(2) {
        if pair[1].start - pair[0].end > SEGMENT_PAUSE_SECS {
            segment_pauses += 1;
        }
    }
    let mut word_pauses = 0u32;
    for seg in &transcript.segments {
        for pair in seg.words.windows(2) {
            if pair[1].start - pair[0].end > WORD_PAUSE_SECS {
                word_pauses += 1;
            }
        }
    }

    let filler_counts = count_fillers(&transcript.text);
    let filler_total: u32 = filler_counts.values().sum();
    let filler_per_minute = filler_total as f64 / minutes;

    SpeechQuality {
        words_per_minute,
        segment_pauses,
        word_pauses,
        filler_counts,
        filler_per_minute,
    }
}

/// Count filler-word occurrences, whole words only, case-insensitive.
/// Multi-word fillers ("you know") are matched as token bigrams.
pub fn count_fillers(text: &str) -> BTreeMap<String, u32> {
    let tokens: Vec<String> = normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let mut counts = BTreeMap::new();

    for filler in FILLER_WORDS {
        let parts: Vec<&str> = filler.split_whitespace().collect();
        let mut n = 0u32;
        if parts.len() == 1 {
            n = tokens.iter().filter(|t| t.as_str() == parts[0]).count() as u32;
        } else if tokens.len() >= parts.len() {
            for window in tokens.windows(parts.len()) {
                if window.iter().map(String::as_str).eq(parts.iter().copied()) {
                    n += 1;
                }
            }
        }
        if n > 0 {
            counts.insert((*filler).to_string(), n);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::transcript::{Segment, Word};

    fn stats(mean: f64, peak: f64, min: f64) -> VolumeStats {
        VolumeStats {
            mean_db: mean,
            peak_db: peak,
            min_db: min,
            rms_db: mean,
        }
    }

    fn flat_transcript(text: &str, duration: f64) -> Transcript {
        Transcript {
            text: text.into(),
            segments: vec![Segment {
                text: text.into(),
                start: 0.0,
                end: duration,
                words: vec![],
            }],
            duration,
            language: "en".into(),
        }
    }

    #[test]
    fn parses_volumedetect_lines() {
        let out = "\
[Parsed_volumedetect_0 @ 0x55] n_samples: 480000
[Parsed_volumedetect_0 @ 0x55] mean_volume: -18.3 dB
[Parsed_volumedetect_0 @ 0x55] max_volume: -2.1 dB
lavfi.astats.Overall.Min_level=0.000158
lavfi.astats.Overall.RMS_level=-17.9
";
        let s = parse_volume_stats(out).unwrap();
        assert!((s.mean_db + 18.3).abs() < 1e-9);
        assert!((s.peak_db + 2.1).abs() < 1e-9);
        assert!((s.rms_db + 17.9).abs() < 1e-9);
        assert!(s.min_db < -70.0); // 0.000158 linear is about -76 dB
    }

    #[test]
    fn consistency_formula_matches_contract() {
        // peak - min = 15 dB -> perfectly consistent.
        let q = assess(stats(-18.0, -5.0, -20.0), &flat_transcript("a", 10.0));
        assert!((q.consistency - 1.0).abs() < 1e-9);
        // peak - min = 45 dB -> floor.
        let q = assess(stats(-18.0, 0.0, -45.0), &flat_transcript("a", 10.0));
        assert!((q.consistency - 0.0).abs() < 1e-9);
    }

    #[test]
    fn clarity_rewards_broadcast_band_and_snr() {
        let good = clarity(stats(-17.0, -3.0, -60.0));
        let quiet = clarity(stats(-45.0, -30.0, -60.0));
        let hot = clarity(stats(-4.0, 0.0, -50.0));
        assert!(good > quiet);
        assert!(good > hot);
        assert_eq!(good, 85.0); // 50 + 20 (band) + 15 (snr)
    }

    #[test]
    fn pace_score_band() {
        assert_eq!(pace_score(120.0), 100.0);
        assert_eq!(pace_score(80.0), 100.0);
        assert!(pace_score(40.0) < 60.0);
        assert!(pace_score(260.0) < 100.0);
    }

    #[test]
    fn filler_counting_single_and_multi_word() {
        let counts =
            count_fillers("Um, so I was like, you know, actually trying. You know? Liked it.");
        assert_eq!(counts.get("um"), Some(&1));
        assert_eq!(counts.get("like"), Some(&1)); // "liked" must not count
        assert_eq!(counts.get("you know"), Some(&2));
        assert_eq!(counts.get("actually"), Some(&1));
        assert_eq!(counts.get("so"), Some(&1));
    }

    #[test]
    fn pauses_between_segments_and_words() {
        let t = Transcript {
            text: "a b c d".into(),
            segments: vec![
                Segment {
                    text: "a b".into(),
                    start: 0.0,
                    end: 2.0,
                    words: vec![
                        Word { word: "a".into(), start: 0.1, end: 0.3 },
                        Word { word: "b".into(), start: 1.5, end: 1.9 }, // 1.2 s gap
                    ],
                },
                Segment {
                    text: "c d".into(),
                    start: 3.5, // 1.5 s gap after previous segment
                    end: 5.0,
                    words: vec![],
                },
            ],
            duration: 5.0,
            language: "en".into(),
        };
        let speech = speech_quality(&t);
        assert_eq!(speech.segment_pauses, 1);
        assert_eq!(speech.word_pauses, 1);
    }
}
