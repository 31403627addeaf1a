//! Web-delivery transcode profiles.
//!
//! A profile is the quality x resolution grid from the tool contract: it
//! fixes codec, CRF, encoder preset, pixel format, and the fast-start flag
//! that makes the container streamable.

use cf_domain::config::QualityPreset;
use cf_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebResolution {
    Uhd4k,
    Fhd1080,
    Hd720,
    Sd480,
}

impl WebResolution {
    pub fn parse(input: &str) -> Result<Self> {
        match input.to_ascii_lowercase().as_str() {
            "4k" | "2160p" | "uhd" => Ok(Self::Uhd4k),
            "1080p" | "fhd" => Ok(Self::Fhd1080),
            "720p" | "hd" => Ok(Self::Hd720),
            "480p" | "sd" => Ok(Self::Sd480),
            other => Err(Error::SchemaViolation(format!(
                "unknown resolution \"{other}\" (expected 4k, 1080p, 720p or 480p)"
            ))),
        }
    }

    fn height(self) -> u32 {
        match self {
            Self::Uhd4k => 2160,
            Self::Fhd1080 => 1080,
            Self::Hd720 => 720,
            Self::Sd480 => 480,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WebProfile {
    pub quality: QualityPreset,
    pub resolution: WebResolution,
}

impl WebProfile {
    pub fn new(quality: QualityPreset, resolution: WebResolution) -> Self {
        Self {
            quality,
            resolution,
        }
    }

    fn crf(&self) -> u32 {
        match self.quality {
            QualityPreset::High => 18,
            QualityPreset::Medium => 23,
            QualityPreset::Low => 28,
        }
    }

    fn preset(&self) -> &'static str {
        match self.quality {
            QualityPreset::High => "slow",
            QualityPreset::Medium => "medium",
            QualityPreset::Low => "fast",
        }
    }

    /// Output-side ffmpeg arguments for this profile. The scale filter
    /// caps height while preserving aspect (never upscales width to odd
    /// values thanks to `-2`).
    pub fn encode_args(&self) -> Vec<String> {
        let height = self.resolution.height();
        vec![
            "-c:v".into(),
            "libx264".into(),
            "-crf".into(),
            self.crf().to_string(),
            "-preset".into(),
            self.preset().to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-vf".into(),
            format!("scale=-2:min({height}\\,ih)"),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
            "-movflags".into(),
            "+faststart".into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_aliases_parse() {
        assert_eq!(WebResolution::parse("4K").unwrap(), WebResolution::Uhd4k);
        assert_eq!(WebResolution::parse("1080p").unwrap(), WebResolution::Fhd1080);
        assert!(WebResolution::parse("8k").is_err());
    }

    #[test]
    fn quality_maps_to_crf_and_preset() {
        let high = WebProfile::new(QualityPreset::High, WebResolution::Fhd1080);
        let low = WebProfile::new(QualityPreset::Low, WebResolution::Sd480);
        let high_args = high.encode_args();
        let low_args = low.encode_args();
        assert!(high_args.contains(&"18".to_string()));
        assert!(high_args.contains(&"slow".to_string()));
        assert!(low_args.contains(&"28".to_string()));
        assert!(low_args.contains(&"fast".to_string()));
    }

    #[test]
    fn profiles_request_fast_start() {
        let args = WebProfile::new(QualityPreset::Medium, WebResolution::Hd720).encode_args();
        assert!(args.contains(&"+faststart".to_string()));
        assert!(args.iter().any(|a| a.contains("min(720")));
    }
}
