//! Media execution layer: ffmpeg/ffprobe subprocess control, probe-output
//! parsing, and the filesystem safety rules every tool relies on (inputs are
//! never written, outputs are staged to a temp path and renamed on success).

pub mod fsops;
pub mod probe;
pub mod runner;
pub mod transcode;

pub use probe::{probe_media, AudioStreamInfo, MediaInfo, VideoStreamInfo};
pub use runner::MediaRunner;
pub use transcode::{WebProfile, WebResolution};
