//! Voice synthesis: the remote cloning/TTS client, the persistent
//! sample-hash → voice-id cache, and the word-replacement splicer that ties
//! transcription, synthesis and audio surgery together.

mod cache;
mod elevenlabs;
pub mod splice;

pub use cache::{hash_sample, VoiceCache};
pub use elevenlabs::ElevenLabsClient;
pub use splice::{ReplaceRequest, ReplaceSummary, WordSplicer};
