//! Core run types for the agent loop.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    Conversation, MessageOutputItem, RunItem, StreamEvent, Timing, TokenUsage, ToolCallItem,
    ToolCallOutputItem,
};

/// Unique run identifier.
pub type RunId = Uuid;

/// Execution mode of a run, as reported in logs and loop-safety errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum RunMode {
    #[strum(serialize = "run_sync")]
    RunSync,
    #[strum(serialize = "run_async")]
    RunAsync,
    #[strum(serialize = "stream_sync")]
    StreamSync,
    #[strum(serialize = "stream_async")]
    StreamAsync,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, Self::StreamSync | Self::StreamAsync)
    }
}

/// Loop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    AwaitingModel,
    HasPendingToolCalls,
    ExecutingTools,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    /// Final assistant text.
    pub output: String,
    /// Every item produced during the run, in order.
    pub items: Vec<RunItem>,
    pub token_usage: TokenUsage,
    pub timing: Timing,
    /// Model calls made.
    pub iterations: usize,
}

impl RunResult {
    pub fn messages(&self) -> impl Iterator<Item = &MessageOutputItem> {
        self.items.iter().filter_map(RunItem::as_message)
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallItem> {
        self.items.iter().filter_map(RunItem::as_tool_call)
    }

    pub fn tool_outputs(&self) -> impl Iterator<Item = &ToolCallOutputItem> {
        self.items.iter().filter_map(RunItem::as_tool_output)
    }

    /// Rebuild the run trace as a canonical conversation.
    pub fn to_conversation(&self) -> Result<Conversation> {
        let mut conversation = Conversation::new();
        conversation.add_items(&self.items)?;
        Ok(conversation)
    }
}

/// One event of a streaming run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStreamEvent {
    /// Assistant text streamed so far in the run.
    pub output: String,
    pub event: StreamEvent,
    /// Cumulative usage, present when this event reported usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub timing: Timing,
}

impl RunStreamEvent {
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_names_are_stable() {
        assert_eq!(RunMode::RunSync.as_str(), "run_sync");
        assert_eq!(RunMode::StreamAsync.to_string(), "stream_async");
        assert!(RunMode::StreamSync.is_streaming());
        assert!(!RunMode::RunAsync.is_streaming());
    }

    #[test]
    fn terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::ExecutingTools.is_terminal());
        assert_eq!(RunState::HasPendingToolCalls.to_string(), "has_pending_tool_calls");
    }

    #[test]
    fn result_filters_items() {
        let result = RunResult {
            run_id: Uuid::new_v4(),
            output: "22C in Paris".into(),
            items: vec![
                RunItem::ToolCall(ToolCallItem {
                    id: None,
                    call_id: "call_1".into(),
                    name: "get_weather".into(),
                    arguments: json!({"location": "Paris"}),
                    raw: json!(null),
                }),
                RunItem::ToolCallOutput(ToolCallOutputItem {
                    call_id: "call_1".into(),
                    name: "get_weather".into(),
                    result: "22C".into(),
                    is_error: false,
                    raw: json!(null),
                }),
                RunItem::MessageOutput(MessageOutputItem {
                    id: None,
                    content: "22C in Paris".into(),
                    raw: json!(null),
                }),
            ],
            token_usage: TokenUsage::default(),
            timing: Timing::start(),
            iterations: 2,
        };
        assert_eq!(result.tool_calls().count(), 1);
        assert_eq!(result.tool_outputs().count(), 1);
        assert_eq!(result.messages().count(), 1);
        assert_eq!(result.to_conversation().unwrap().len(), 3);
    }
}
