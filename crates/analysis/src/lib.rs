//! Take-quality analyzers: audio statistics, frame-sampled visual
//! statistics, filler-word detection, script-to-transcript matching, and
//! composite scoring.

pub mod audio;
pub mod issues;
pub mod matching;
pub mod scoring;
pub mod video;

pub use audio::{AudioQuality, SpeechQuality};
pub use issues::{Issue, IssueKind, Severity, Thresholds};
pub use matching::{parse_sections, LineMatch, Section, SectionMatch};
pub use video::VideoQuality;
