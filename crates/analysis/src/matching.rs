//! Script parsing and fuzzy transcript matching.
//!
//! A script splits into sections on blank lines. Matching is
//! case-insensitive with punctuation ignored; similarity is computed per
//! script line against windows of transcript segments, and a section counts
//! as covered when at least half its lines matched. Matched lines yield
//! time ranges from word timings when the transcript carries them, else
//! from segment bounds.

use serde::{Deserialize, Serialize};

use cf_domain::transcript::{TimeRange, Transcript};

/// One contiguous script paragraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub text: String,
    /// (first, last) 1-based line numbers in the source script.
    pub line_range: (usize, usize),
}

/// Split a script into ordered sections on blank-line separators.
pub fn parse_sections(script: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start_line = 0usize;

    for (i, line) in script.lines().enumerate() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                sections.push((start_line + 1, i, current.join("\n")));
                current.clear();
            }
        } else {
            if current.is_empty() {
                start_line = i;
            }
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        let end = script.lines().count();
        sections.push((start_line + 1, end, current.join("\n")));
    }

    sections
        .into_iter()
        .enumerate()
        .map(|(i, (first, last, text))| Section {
            id: format!("section_{}", i + 1),
            text: text.trim().to_string(),
            line_range: (first, last),
        })
        .collect()
}

/// Lowercase, strip punctuation, collapse whitespace into single spaces.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '\'' {
            for c in ch.to_lowercase() {
                out.push(c);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}

/// Token-based Dice similarity between two normalized strings, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta: Vec<&str> = a.split_whitespace().collect();
    let tb: Vec<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for t in &ta {
        *counts.entry(*t).or_insert(0i64) += 1;
    }
    let mut shared = 0i64;
    for t in &tb {
        if let Some(c) = counts.get_mut(*t) {
            if *c > 0 {
                *c -= 1;
                shared += 1;
            }
        }
    }
    (2.0 * shared as f64) / (ta.len() + tb.len()) as f64
}

/// How one script line matched the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineMatch {
    pub line: String,
    pub similarity: f64,
    pub time_range: Option<TimeRange>,
}

/// How one section matched the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionMatch {
    pub section_id: String,
    pub covered: bool,
    /// Average similarity of matched lines, on a 0-100 scale.
    pub match_quality: f64,
    pub line_matches: Vec<LineMatch>,
    /// Union of matched line ranges; `None` when nothing matched.
    pub time_range: Option<TimeRange>,
}

/// Match one section against a transcript.
///
/// `similarity_threshold` is the per-line cutoff (0-1); a section is
/// covered when at least half its lines clear it.
pub fn match_section(
    section: &Section,
    transcript: &Transcript,
    similarity_threshold: f64,
) -> SectionMatch {
    let lines: Vec<&str> = section
        .text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect();

    let mut line_matches = Vec::with_capacity(lines.len());
    let mut matched = 0usize;
    let mut quality_sum = 0.0;
    let mut range: Option<TimeRange> = None;

    for line in &lines {
        let best = best_line_match(line, transcript);
        let hit = best
            .as_ref()
            .map(|(sim, _)| *sim >= similarity_threshold)
            .unwrap_or(false);
        let (sim, line_range) = match best {
            Some((sim, r)) if hit => (sim, Some(r)),
            Some((sim, _)) => (sim, None),
            None => (0.0, None),
        };
        if hit {
            matched += 1;
            quality_sum += sim;
            if let Some(r) = line_range {
                range = Some(match range {
                    None => r,
                    Some(acc) => TimeRange {
                        start: acc.start.min(r.start),
                        end: acc.end.max(r.end),
                    },
                });
            }
        }
        line_matches.push(LineMatch {
            line: line.to_string(),
            similarity: sim,
            time_range: line_range,
        });
    }

    let covered = !lines.is_empty() && matched * 2 >= lines.len();
    let match_quality = if matched > 0 {
        quality_sum / matched as f64 * 100.0
    } else {
        0.0
    };

    SectionMatch {
        section_id: section.id.clone(),
        covered,
        match_quality,
        line_matches,
        time_range: range,
    }
}

/// Best match of one script line against windows of 1-3 consecutive
/// transcript segments. Returns (similarity, range).
fn best_line_match(line: &str, transcript: &Transcript) -> Option<(f64, TimeRange)> {
    let norm_line = normalize(line);
    if norm_line.is_empty() {
        return None;
    }

    let mut best: Option<(f64, usize, usize)> = None; // sim, first, last segment
    for first in 0..transcript.segments.len() {
        let mut window = String::new();
        for last in first..transcript.segments.len().min(first + 3) {
            if !window.is_empty() {
                window.push(' ');
            }
            window.push_str(&normalize(&transcript.segments[last].text));
            let sim = similarity(&norm_line, &window);
            if best.map(|(s, _, _)| sim > s).unwrap_or(true) {
                best = Some((sim, first, last));
            }
        }
    }

    let (sim, first, last) = best?;
    let range = refine_range(&norm_line, transcript, first, last);
    Some((sim, range))
}

/// Narrow the matched window to word timings when the segments carry them;
/// fall back to segment bounds.
fn refine_range(
    norm_line: &str,
    transcript: &Transcript,
    first: usize,
    last: usize,
) -> TimeRange {
    let segs = &transcript.segments[first..=last];
    let line_tokens: std::collections::HashSet<&str> = norm_line.split_whitespace().collect();

    let mut start: Option<f64> = None;
    let mut end: Option<f64> = None;
    for seg in segs {
        for word in &seg.words {
            if line_tokens.contains(normalize(&word.word).as_str()) {
                start = Some(start.map_or(word.start, |s: f64| s.min(word.start)));
                end = Some(end.map_or(word.end, |e: f64| e.max(word.end)));
            }
        }
    }

    match (start, end) {
        (Some(s), Some(e)) if e > s => TimeRange { start: s, end: e },
        _ => TimeRange {
            start: segs.first().map(|s| s.start).unwrap_or(0.0),
            end: segs.last().map(|s| s.end).unwrap_or(0.0),
        },
    }
}

/// Locate exact (normalized) occurrences of a phrase with word precision.
///
/// Slides a window the width of the phrase across the transcript's word
/// list; each hit yields `[first_word.start, last_word.end]`. Requires word
/// timings; transcripts without them cannot support word-level splicing.
pub fn find_phrase(transcript: &Transcript, phrase: &str) -> Vec<TimeRange> {
    let needle: Vec<String> = normalize(phrase)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if needle.is_empty() {
        return Vec::new();
    }

    let words: Vec<(&cf_domain::transcript::Word, String)> = transcript
        .words()
        .map(|w| (w, normalize(&w.word)))
        .filter(|(_, n)| !n.is_empty())
        .collect();

    let mut hits = Vec::new();
    if words.len() < needle.len() {
        return hits;
    }
    for start in 0..=(words.len() - needle.len()) {
        let matched = needle
            .iter()
            .enumerate()
            .all(|(i, n)| words[start + i].1 == *n);
        if matched {
            let first = words[start].0;
            let last = words[start + needle.len() - 1].0;
            hits.push(TimeRange {
                start: first.start,
                end: last.end,
            });
        }
    }
    hits.sort_by(|a, b| a.start.total_cmp(&b.start));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::transcript::{Segment, Word};

    fn transcript_with_words() -> Transcript {
        let words = |pairs: &[(&str, f64, f64)]| -> Vec<Word> {
            pairs
                .iter()
                .map(|(w, s, e)| Word {
                    word: (*w).into(),
                    start: *s,
                    end: *e,
                })
                .collect()
        };
        Transcript {
            text: "hello world this is a recording test hello world again".into(),
            segments: vec![
                Segment {
                    text: "hello world this is a recording".into(),
                    start: 0.0,
                    end: 4.0,
                    words: words(&[
                        ("hello", 0.2, 0.6),
                        ("world", 0.7, 1.2),
                        ("this", 1.4, 1.6),
                        ("is", 1.7, 1.8),
                        ("a", 1.9, 2.0),
                        ("recording", 2.1, 2.9),
                    ]),
                },
                Segment {
                    text: "test hello world again".into(),
                    start: 4.0,
                    end: 7.0,
                    words: words(&[
                        ("test", 4.1, 4.5),
                        ("hello", 4.8, 5.2),
                        ("world", 5.3, 5.8),
                        ("again", 5.9, 6.4),
                    ]),
                },
            ],
            duration: 7.0,
            language: "en".into(),
        }
    }

    #[test]
    fn sections_split_on_blank_lines() {
        let script = "Intro line one.\nIntro line two.\n\nMiddle part.\n\n\nOutro here.";
        let sections = parse_sections(script);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].id, "section_1");
        assert_eq!(sections[0].line_range, (1, 2));
        assert_eq!(sections[1].text, "Middle part.");
        assert_eq!(sections[2].text, "Outro here.");
    }

    #[test]
    fn empty_script_has_no_sections() {
        assert!(parse_sections("\n\n   \n").is_empty());
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize("Hello,   WORLD! It's fine."),
            "hello world it's fine"
        );
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let a = "the quick brown fox";
        let b = "the quick red fox";
        let s = similarity(a, b);
        assert!((similarity(b, a) - s).abs() < 1e-12);
        assert!(s > 0.5 && s < 1.0);
        assert_eq!(similarity(a, a), 1.0);
        assert_eq!(similarity(a, ""), 0.0);
    }

    #[test]
    fn covered_section_gets_word_precise_range() {
        let t = transcript_with_words();
        let section = Section {
            id: "section_1".into(),
            text: "hello world this is a recording".into(),
            line_range: (1, 1),
        };
        let m = match_section(&section, &t, 0.55);
        assert!(m.covered);
        assert!(m.match_quality > 90.0);
        let r = m.time_range.unwrap();
        // Word timings, not segment bounds.
        assert!(r.start > 0.0 && r.start < 0.3);
        assert!((r.end - 2.9).abs() < 1e-9);
    }

    #[test]
    fn unrelated_section_is_not_covered() {
        let t = transcript_with_words();
        let section = Section {
            id: "section_2".into(),
            text: "completely unrelated narration about sailboats".into(),
            line_range: (1, 1),
        };
        let m = match_section(&section, &t, 0.55);
        assert!(!m.covered);
    }

    #[test]
    fn half_line_rule_decides_coverage() {
        let t = transcript_with_words();
        let section = Section {
            id: "s".into(),
            text: "hello world this is a recording\nnothing like the audio at all".into(),
            line_range: (1, 2),
        };
        // 1 of 2 lines matched -> exactly half -> covered.
        let m = match_section(&section, &t, 0.55);
        assert!(m.covered);
    }

    #[test]
    fn find_phrase_returns_all_occurrences_in_order() {
        let t = transcript_with_words();
        let hits = find_phrase(&t, "Hello, World");
        assert_eq!(hits.len(), 2);
        assert!((hits[0].start - 0.2).abs() < 1e-9);
        assert!((hits[0].end - 1.2).abs() < 1e-9);
        assert!((hits[1].start - 4.8).abs() < 1e-9);
        assert!(hits[0].start < hits[1].start);
    }

    #[test]
    fn find_phrase_misses_cleanly() {
        let t = transcript_with_words();
        assert!(find_phrase(&t, "goodbye moon").is_empty());
    }
}
