//! Ordered, validated conversation history.

use serde::{Deserialize, Serialize};

use super::items::RunItem;
use super::message::{Message, ReasoningBlock, ToolCallBlock, ToolOutputBlock};
use crate::error::Result;

/// An ordered list of canonical messages with fluent builder methods.
///
/// ```
/// use serde_json::json;
/// use tessera::types::Conversation;
///
/// # fn main() -> tessera::error::Result<()> {
/// let mut conversation = Conversation::new();
/// conversation
///     .add_system("You are terse.")
///     .add_user("Weather in Paris?")
///     .add_tool_call("get_weather", json!({"location": "Paris"}), "call_1")?
///     .add_tool_output("call_1", "Sunny, 24C", Some("get_weather"), None);
/// assert_eq!(conversation.len(), 4);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_system(&mut self, text: impl Into<String>) -> &mut Self {
        self.messages.push(Message::system(text));
        self
    }

    pub fn add_user(&mut self, text: impl Into<String>) -> &mut Self {
        self.messages.push(Message::user(text));
        self
    }

    pub fn add_assistant(&mut self, text: impl Into<String>) -> &mut Self {
        self.messages.push(Message::assistant(text));
        self
    }

    /// Append an assistant tool call.
    ///
    /// `arguments` may be an object or a JSON string that decodes to one;
    /// anything else is a serialization error.
    pub fn add_tool_call(
        &mut self,
        name: impl Into<String>,
        arguments: impl Into<serde_json::Value>,
        call_id: impl Into<String>,
    ) -> Result<&mut Self> {
        let block = ToolCallBlock::new(call_id, name, arguments)?;
        self.messages.push(Message::tool_call(block));
        Ok(self)
    }

    pub fn add_tool_output(
        &mut self,
        call_id: impl Into<String>,
        output: impl Into<serde_json::Value>,
        name: Option<&str>,
        is_error: Option<bool>,
    ) -> &mut Self {
        self.messages.push(Message::tool_output(ToolOutputBlock {
            call_id: call_id.into(),
            name: name.map(str::to_string),
            output: output.into(),
            is_error,
        }));
        self
    }

    /// Append assistant reasoning metadata. At least one field must be set.
    pub fn add_reasoning(
        &mut self,
        summary: Option<String>,
        signature: Option<String>,
        reasoning_id: Option<String>,
    ) -> Result<&mut Self> {
        let message = Message::reasoning(ReasoningBlock {
            reasoning_id,
            summary,
            signature,
        })?;
        self.messages.push(message);
        Ok(self)
    }

    pub fn add_message(&mut self, message: Message) -> &mut Self {
        self.messages.push(message);
        self
    }

    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = Message>) -> &mut Self {
        self.messages.extend(messages);
        self
    }

    /// Append the messages equivalent to a run's items, preserving order.
    ///
    /// Empty assistant text is skipped so that history rebuilt from a
    /// run's items serializes the same way as the run's own continuation.
    pub fn add_items(&mut self, items: &[RunItem]) -> Result<&mut Self> {
        for item in items {
            match item {
                RunItem::MessageOutput(msg) => {
                    if !msg.content.is_empty() {
                        self.add_assistant(msg.content.clone());
                    }
                }
                RunItem::ToolCall(call) => {
                    self.add_tool_call(
                        call.name.clone(),
                        call.arguments.clone(),
                        call.call_id.clone(),
                    )?;
                }
                RunItem::ToolCallOutput(out) => {
                    self.add_tool_output(
                        out.call_id.clone(),
                        out.result.clone(),
                        Some(&out.name),
                        Some(out.is_error),
                    );
                }
                RunItem::Reasoning(reasoning) => {
                    self.add_reasoning(
                        reasoning.summary.clone(),
                        reasoning.signature.clone(),
                        reasoning.id.clone(),
                    )?;
                }
            }
        }
        Ok(self)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
