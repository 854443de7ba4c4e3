//! Provider adapter and stream normalizer traits, plus implementations.
//!
//! A [`ProviderAdapter`] owns the bidirectional mapping between the
//! canonical model and one wire protocol. Moving bytes is left to a
//! [`transport`]; the agent loop only ever talks to these two seams.

pub mod format;
pub mod transport;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

pub use transport::{AsyncTransport, RawEventIter, RawEventStream, Transport};

use serde_json::Value;

use crate::error::{Result, TesseraError};
use crate::tools::ToolDefinition;
use crate::types::{
    Conversation, GenerationSettings, RawUsage, RunItem, StreamEvent, StreamEventKind,
    ToolCallItem, ToolCallOutputItem, ToolChoice, TokenUsage,
};

/// Caller input accepted by a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    /// Wrapped into a single user text block.
    Text(String),
    /// Provider-native input items, passed through unvalidated.
    Native(Vec<Value>),
    /// Canonical conversation, serialized block by block.
    Conversation(Conversation),
}

impl From<&str> for RunInput {
    fn from(text: &str) -> Self {
        RunInput::Text(text.to_string())
    }
}

impl From<String> for RunInput {
    fn from(text: String) -> Self {
        RunInput::Text(text)
    }
}

impl From<Vec<Value>> for RunInput {
    fn from(items: Vec<Value>) -> Self {
        RunInput::Native(items)
    }
}

impl From<Conversation> for RunInput {
    fn from(conversation: Conversation) -> Self {
        RunInput::Conversation(conversation)
    }
}

impl From<&Conversation> for RunInput {
    fn from(conversation: &Conversation) -> Self {
        RunInput::Conversation(conversation.clone())
    }
}

/// Everything besides history needed to build one request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub model: &'a str,
    pub settings: &'a GenerationSettings,
    pub instructions: Option<&'a str>,
    pub tools: &'a [ToolDefinition],
    pub tool_choice: ToolChoice,
    pub parallel_tool_calls: bool,
    pub stream: bool,
}

/// A non-streaming response mapped onto run items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub items: Vec<RunItem>,
    pub raw_usage: Option<RawUsage>,
    /// Output nodes with no canonical mapping, kept verbatim.
    pub unrecognized: Vec<Value>,
}

impl ParsedResponse {
    /// Unblended usage of this response.
    pub fn usage(&self) -> TokenUsage {
        self.raw_usage.map(|u| u.unblend()).unwrap_or_default()
    }

    /// Concatenated assistant text.
    pub fn output_text(&self) -> String {
        self.items
            .iter()
            .filter_map(RunItem::as_message)
            .map(|m| m.content.as_str())
            .collect()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallItem> {
        self.items.iter().filter_map(RunItem::as_tool_call)
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }
}

/// Maps the canonical model onto one wire protocol.
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    /// Provider key used for configuration lookup and error context.
    fn provider_name(&self) -> &'static str;

    /// Turn caller input into wire-ready history items.
    fn normalize_input(&self, input: RunInput) -> Result<Vec<Value>>;

    /// Build a complete request body.
    fn build_request(&self, history: &[Value], ctx: &RequestContext<'_>) -> Result<Value>;

    fn parse_response(&self, raw: &Value) -> Result<ParsedResponse>;

    /// History items replaying the assistant turn of a raw response.
    fn continuation_items(&self, raw: &Value) -> Vec<Value>;

    /// History items replaying a streamed assistant turn: text first, then calls.
    fn stream_continuation_items(&self, text: &str, calls: &[ToolCallItem]) -> Vec<Value>;

    /// History item carrying one tool result back to the model.
    fn tool_output_item(&self, output: &ToolCallOutputItem) -> Value;

    /// Fresh normalizer for one stream.
    fn new_stream_normalizer(&self) -> Box<dyn StreamNormalizer>;
}

/// Turns raw provider stream events into [`StreamEvent`]s, one for one.
pub trait StreamNormalizer: Send {
    fn process(&mut self, raw: Value) -> StreamEvent;

    /// Usage reported since the last call, if any.
    fn take_usage(&mut self) -> Option<RawUsage>;

    /// Tool calls announced in the current turn and not yet completed.
    fn pending_tool_calls(&self) -> usize;

    /// History items of the current turn that must precede its tool calls
    /// when the turn is replayed, such as reasoning. Drains them.
    fn take_replay_items(&mut self) -> Vec<Value> {
        Vec::new()
    }

    /// Wrap a transport or loop error as an in-band event.
    fn error_event(&self, err: &TesseraError) -> StreamEvent {
        StreamEvent::new(StreamEventKind::StreamError {
            error: err.to_string(),
            code: err.code(),
        })
    }
}
