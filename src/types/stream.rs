//! Normalized streaming events.

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::usage::TokenUsage;
use crate::error::ErrorCode;

/// One provider-agnostic stream event.
///
/// Every event carries the provider item id it belongs to (if any), the
/// raw provider event it was derived from, and token usage when the
/// provider reported it on that event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    #[serde(flatten)]
    pub kind: StreamEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_event: Option<serde_json::Value>,
}

/// The closed set of stream event variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, IntoStaticStr)]
#[serde(tag = "type")]
pub enum StreamEventKind {
    #[serde(rename = "stream.start")]
    #[strum(serialize = "stream.start")]
    StreamStart,
    #[serde(rename = "message.output.delta")]
    #[strum(serialize = "message.output.delta")]
    MessageOutputDelta { delta: String },
    #[serde(rename = "message.output.done")]
    #[strum(serialize = "message.output.done")]
    MessageOutputDone { output: String },
    #[serde(rename = "tool.call.delta")]
    #[strum(serialize = "tool.call.delta")]
    ToolCallDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        delta: String,
    },
    #[serde(rename = "tool.call.done")]
    #[strum(serialize = "tool.call.done")]
    ToolCallDone {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    #[serde(rename = "tool.output.done")]
    #[strum(serialize = "tool.output.done")]
    ToolOutputDone {
        call_id: String,
        name: String,
        output: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "reasoning.delta")]
    #[strum(serialize = "reasoning.delta")]
    ReasoningDelta { delta: String },
    #[serde(rename = "reasoning.done")]
    #[strum(serialize = "reasoning.done")]
    ReasoningDone { output: String },
    #[serde(rename = "stream.error")]
    #[strum(serialize = "stream.error")]
    StreamError { error: String, code: ErrorCode },
    #[serde(rename = "stream.end")]
    #[strum(serialize = "stream.end")]
    StreamEnd,
    #[serde(rename = "other.event")]
    #[strum(serialize = "other.event")]
    Other,
}

impl StreamEvent {
    pub fn new(kind: StreamEventKind) -> Self {
        Self {
            kind,
            id: None,
            token_usage: None,
            raw_event: None,
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.token_usage = usage;
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw_event = Some(raw);
        self
    }

    /// Stable event type name, e.g. `"tool.call.done"`.
    pub fn event_type(&self) -> &'static str {
        (&self.kind).into()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            StreamEventKind::StreamEnd | StreamEventKind::StreamError { .. }
        )
    }
}
