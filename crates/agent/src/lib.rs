//! Agent orchestrator: the bounded multi-turn loop that streams model
//! output, dispatches tool calls, and feeds results back until the model
//! stops asking for tools.

mod conversation;
mod orchestrator;

pub use conversation::Conversation;
pub use orchestrator::Orchestrator;
