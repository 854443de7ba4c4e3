//! Convenience re-exports for common use.

pub use crate::agent::{Agent, ModelClient};
pub use crate::agent_loop::{RunResult, RunStreamEvent};
pub use crate::config::TesseraConfig;
pub use crate::error::{Result, TesseraError};
pub use crate::provider::{AsyncTransport, ProviderAdapter, RunInput, StreamNormalizer, Transport};
pub use crate::tools::{Tool, ToolArguments, ToolExecutionContext, ToolRegistry};
pub use crate::types::{
    ContentBlock, Conversation, GenerationSettings, Message, Role, RunItem, StreamEvent,
    StreamEventKind, TokenUsage, ToolChoice,
};
