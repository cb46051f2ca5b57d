//! A small LLM agent runtime: agent trees, tools, sessions and the runner
//! that drives them against a chat-completions backend.

pub mod definition;
pub mod llm;
pub mod runner;
pub mod session;
pub mod tool;

pub use definition::{LlmAgent, LlmAgentBuilder, RetryPolicy};
pub use llm::{ChatMessage, LlmBackend, LlmRequest, LlmResponse, OpenAiBackend, ToolCall, ToolSpec};
pub use runner::{Runner, TRANSFER_TOOL};
pub use session::{Content, Event, Part, Session, SessionService};
pub use tool::{State, Tool, ToolContext, ToolRegistry};
