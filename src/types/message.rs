//! Canonical message and content-block types.
//!
//! A [`Message`] can only be constructed with blocks its role permits, so
//! every conversation handed to a provider adapter is structurally
//! serializable:
//!
//! | role      | legal blocks                         |
//! |-----------|--------------------------------------|
//! | system    | text                                 |
//! | user      | text, tool output                    |
//! | assistant | text, tool call, reasoning           |

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, TesseraError};

/// Conversation role.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Whether a block of this kind may appear in a message with this role.
    pub fn allows(self, block: &ContentBlock) -> bool {
        matches!(
            (self, block),
            (Role::System, ContentBlock::Text(_))
                | (Role::User, ContentBlock::Text(_) | ContentBlock::ToolOutput(_))
                | (
                    Role::Assistant,
                    ContentBlock::Text(_) | ContentBlock::ToolCall(_) | ContentBlock::Reasoning(_)
                )
        )
    }
}

/// A single block of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    ToolCall(ToolCallBlock),
    ToolOutput(ToolOutputBlock),
    Reasoning(ReasoningBlock),
}

impl ContentBlock {
    /// Short name of the block variant, as used in error context.
    pub fn kind(&self) -> &'static str {
        match self {
            ContentBlock::Text(_) => "text",
            ContentBlock::ToolCall(_) => "tool_call",
            ContentBlock::ToolOutput(_) => "tool_output",
            ContentBlock::Reasoning(_) => "reasoning",
        }
    }
}

/// Plain text content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextBlock {
    pub text: String,
}

/// Assistant-emitted tool call.
///
/// `arguments` is normally a JSON object. A string holding arguments the
/// model produced but that do not decode to an object is kept verbatim, so
/// a run trace can be replayed exactly as it was sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallBlock {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallBlock {
    /// Build a tool-call block. String arguments that decode to a JSON
    /// object are stored decoded; any other string is stored as-is.
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<serde_json::Value>,
    ) -> Result<Self> {
        let arguments = match arguments.into() {
            serde_json::Value::String(raw) => match serde_json::from_str(&raw) {
                Ok(parsed @ serde_json::Value::Object(_)) => parsed,
                _ => serde_json::Value::String(raw),
            },
            value @ serde_json::Value::Object(_) => value,
            other => {
                return Err(TesseraError::input(format!(
                    "tool call arguments must be an object or JSON string, got {other}"
                )))
            }
        };
        Ok(Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        })
    }
}

/// User-side tool output, answering an earlier [`ToolCallBlock`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutputBlock {
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Provider-agnostic reasoning metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReasoningBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ReasoningBlock {
    fn validate(&self) -> Result<()> {
        if self.reasoning_id.is_none() && self.summary.is_none() && self.signature.is_none() {
            return Err(TesseraError::input(
                "reasoning block requires at least one of summary, signature or reasoning_id",
            ));
        }
        Ok(())
    }
}

/// A canonical conversation message.
///
/// Fields are private; every constructor enforces the role/block table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "UncheckedMessage")]
pub struct Message {
    role: Role,
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct UncheckedMessage {
    role: Role,
    content: Vec<ContentBlock>,
}

impl TryFrom<UncheckedMessage> for Message {
    type Error = TesseraError;

    fn try_from(raw: UncheckedMessage) -> Result<Self> {
        Message::new(raw.role, raw.content)
    }
}

impl Message {
    /// Build a message, rejecting blocks the role does not permit.
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Result<Self> {
        if content.is_empty() {
            return Err(TesseraError::input("message content cannot be empty")
                .with_context("role", role.to_string()));
        }
        for block in &content {
            if !role.allows(block) {
                return Err(TesseraError::input(format!(
                    "block type '{}' is not valid for role '{role}'",
                    block.kind()
                ))
                .with_context("role", role.to_string())
                .with_context("block_type", block.kind()));
            }
            if let ContentBlock::Reasoning(reasoning) = block {
                reasoning.validate()?;
            }
        }
        Ok(Self { role, content })
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Create an assistant tool-call message.
    pub fn tool_call(block: ToolCallBlock) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolCall(block)],
        }
    }

    /// Create a user tool-output message.
    pub fn tool_output(block: ToolOutputBlock) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::ToolOutput(block)],
        }
    }

    /// Create an assistant reasoning message.
    pub fn reasoning(block: ReasoningBlock) -> Result<Self> {
        block.validate()?;
        Ok(Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Reasoning(block)],
        })
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text(TextBlock { text: text.into() })],
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    /// Concatenated text of all text blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls carried by this message.
    pub fn tool_calls(&self) -> Vec<&ToolCallBlock> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect()
    }
}
