use cf_domain::error::Result;
use cf_domain::chat::Message;
use cf_domain::stream::{BoxStream, StreamEvent};
use cf_domain::tool::ToolDefinition;

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Model identifier override. When `None`, the adapter uses its default.
    pub model: Option<String>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
}

/// Trait that every LLM adapter must implement.
///
/// Implementations translate between the internal types and the wire format
/// of each provider's HTTP API. Streaming is the only completion mode the
/// orchestrator uses; non-streaming callers drain the stream.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat request and return a stream of events. The stream yields
    /// exactly one terminal `Done` or `Error` event (or an `Err` item on
    /// transport failure).
    async fn chat_stream(&self, req: ChatRequest)
        -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;

    /// Whether image content parts can be sent to this provider/model.
    fn supports_vision(&self) -> bool;
}
