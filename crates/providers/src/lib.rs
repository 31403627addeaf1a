//! LLM provider adapters.
//!
//! Two concrete adapters (OpenAI chat completions, Anthropic Messages) sit
//! behind the [`LlmProvider`] trait: each translates the shared message and
//! tool shapes to its wire format, decodes its streaming events into the
//! common [`cf_domain::stream::StreamEvent`] alphabet, and terminates the
//! sequence with an error on stream failure.

mod claude;
mod factory;
mod openai;
mod sse;
mod traits;
mod util;

pub use claude::ClaudeProvider;
pub use factory::provider_from_config;
pub use openai::OpenAiProvider;
pub use traits::{ChatRequest, LlmProvider};
