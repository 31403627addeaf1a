use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A half-open-ish time window in seconds, `0 <= start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if start < 0.0 || end <= start {
            return Err(Error::SchemaViolation(format!(
                "invalid time range: start={start} end={end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `other` lies entirely within this range.
    pub fn contains(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

/// A word with its own start/end times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// One transcribed segment. Word arrays may be empty (not every response
/// carries word granularity); the segment list of a transcript may not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub words: Vec<Word>,
}

/// A word-timed transcript of one media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<Segment>,
    pub duration: f64,
    pub language: String,
}

impl Transcript {
    /// All words across all segments, in order.
    pub fn words(&self) -> impl Iterator<Item = &Word> {
        self.segments.iter().flat_map(|s| s.words.iter())
    }

    /// Validate the monotonic-timestamps invariant: segments strictly
    /// increasing and non-overlapping, words ordered within each segment.
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(Error::TranscriptExtraction("no segments".into()));
        }
        for pair in self.segments.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(Error::TranscriptExtraction(format!(
                    "segments overlap: [{:.3},{:.3}] then [{:.3},{:.3}]",
                    pair[0].start, pair[0].end, pair[1].start, pair[1].end
                )));
            }
        }
        for seg in &self.segments {
            for pair in seg.words.windows(2) {
                if pair[1].start < pair[0].end {
                    return Err(Error::TranscriptExtraction(format!(
                        "words overlap within segment at {:.3}",
                        pair[0].start
                    )));
                }
            }
        }
        Ok(())
    }

    /// Format as SubRip (SRT) text.
    pub fn format_srt(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.segments.iter().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                srt_timestamp(seg.start),
                srt_timestamp(seg.end),
                seg.text.trim()
            ));
        }
        out
    }

    /// Parse SubRip text back into a transcript. Word timing is not part of
    /// the SRT format, so segments come back with empty word arrays.
    pub fn parse_srt(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for block in input.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
            let mut lines = block.lines();
            // index line (ignored beyond existence)
            lines
                .next()
                .ok_or_else(|| Error::Other("empty SRT block".into()))?;
            let timing = lines
                .next()
                .ok_or_else(|| Error::Other("SRT block missing timing line".into()))?;
            let (start_s, end_s) = timing
                .split_once("-->")
                .ok_or_else(|| Error::Other(format!("bad SRT timing line: {timing}")))?;
            let start = parse_srt_timestamp(start_s.trim())?;
            let end = parse_srt_timestamp(end_s.trim())?;
            let text = lines.collect::<Vec<_>>().join("\n");
            segments.push(Segment {
                text,
                start,
                end,
                words: Vec::new(),
            });
        }
        if segments.is_empty() {
            return Err(Error::Other("no SRT entries found".into()));
        }
        let duration = segments.last().map(|s| s.end).unwrap_or(0.0);
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Self {
            text,
            segments,
            duration,
            language: String::new(),
        })
    }
}

fn srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let s = total_s % 60;
    let m = (total_s / 60) % 60;
    let h = total_s / 3600;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

fn parse_srt_timestamp(input: &str) -> Result<f64> {
    let (hms, ms) = input
        .split_once(',')
        .ok_or_else(|| Error::Other(format!("bad SRT timestamp: {input}")))?;
    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 {
        return Err(Error::Other(format!("bad SRT timestamp: {input}")));
    }
    let h: u64 = parts[0]
        .parse()
        .map_err(|_| Error::Other(format!("bad SRT timestamp: {input}")))?;
    let m: u64 = parts[1]
        .parse()
        .map_err(|_| Error::Other(format!("bad SRT timestamp: {input}")))?;
    let s: u64 = parts[2]
        .parse()
        .map_err(|_| Error::Other(format!("bad SRT timestamp: {input}")))?;
    let ms: u64 = ms
        .parse()
        .map_err(|_| Error::Other(format!("bad SRT timestamp: {input}")))?;
    Ok((h * 3600 + m * 60 + s) as f64 + ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transcript {
        Transcript {
            text: "the quick brown fox jumps over the lazy dog".into(),
            segments: vec![
                Segment {
                    text: "the quick brown fox".into(),
                    start: 0.0,
                    end: 2.5,
                    words: vec![],
                },
                Segment {
                    text: "jumps over the lazy dog".into(),
                    start: 2.5,
                    end: 5.25,
                    words: vec![],
                },
            ],
            duration: 5.25,
            language: "en".into(),
        }
    }

    #[test]
    fn srt_round_trip_is_idempotent() {
        let srt = sample().format_srt();
        let parsed = Transcript::parse_srt(&srt).unwrap();
        assert_eq!(parsed.format_srt(), srt);
        assert!((parsed.segments[1].end - 5.25).abs() < 1e-3);
    }

    #[test]
    fn srt_timestamps_are_millisecond_precise() {
        assert_eq!(srt_timestamp(3661.042), "01:01:01,042");
        assert!((parse_srt_timestamp("01:01:01,042").unwrap() - 3661.042).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_overlapping_segments() {
        let mut t = sample();
        t.segments[1].start = 2.0;
        assert!(t.validate().is_err());
    }

    #[test]
    fn time_range_rejects_inverted_bounds() {
        assert!(TimeRange::new(3.0, 2.0).is_err());
        assert!(TimeRange::new(-1.0, 2.0).is_err());
        assert!(TimeRange::new(1.0, 2.0).is_ok());
    }

    #[test]
    fn time_range_containment() {
        let outer = TimeRange::new(1.0, 5.0).unwrap();
        let inner = TimeRange::new(2.0, 3.0).unwrap();
        let straddling = TimeRange::new(4.0, 6.0).unwrap();
        assert!(outer.contains(&inner));
        assert!(!outer.contains(&straddling));
    }
}
