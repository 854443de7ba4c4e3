//! Run items: the canonical record of what happened during a run.

use serde::{Deserialize, Serialize};

/// One item produced by a run, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RunItem {
    #[serde(rename = "message.output.item")]
    MessageOutput(MessageOutputItem),
    #[serde(rename = "tool.call.item")]
    ToolCall(ToolCallItem),
    #[serde(rename = "tool.call.output.item")]
    ToolCallOutput(ToolCallOutputItem),
    #[serde(rename = "reasoning.item")]
    Reasoning(ReasoningItem),
}

impl RunItem {
    pub fn as_message(&self) -> Option<&MessageOutputItem> {
        match self {
            RunItem::MessageOutput(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallItem> {
        match self {
            RunItem::ToolCall(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_tool_output(&self) -> Option<&ToolCallOutputItem> {
        match self {
            RunItem::ToolCallOutput(item) => Some(item),
            _ => None,
        }
    }

    /// Provider payload this item was built from.
    pub fn raw(&self) -> &serde_json::Value {
        match self {
            RunItem::MessageOutput(item) => &item.raw,
            RunItem::ToolCall(item) => &item.raw,
            RunItem::ToolCallOutput(item) => &item.raw,
            RunItem::Reasoning(item) => &item.raw,
        }
    }
}

/// Assistant text output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageOutputItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    pub name: String,
    /// Decoded arguments; the raw string if decoding failed.
    pub arguments: serde_json::Value,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallOutputItem {
    pub call_id: String,
    pub name: String,
    pub result: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Provider reasoning metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}
