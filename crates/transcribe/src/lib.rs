//! Transcript pipeline: audio extraction, size-aware chunking,
//! word-timestamped remote transcription, and timestamp-adjusted reassembly.

mod cache;
mod client;
mod pipeline;

pub use cache::TranscriptCache;
pub use client::WhisperClient;
pub use pipeline::{TranscriptPipeline, CHUNK_SECONDS, CHUNK_THRESHOLD_BYTES};
