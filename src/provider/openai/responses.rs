//! Non-streaming Responses payload parsing.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{assistant_text, function_call, summary_parts};
use crate::error::{Result, TesseraError};
use crate::provider::format::str_field;
use crate::provider::ParsedResponse;
use crate::types::{
    MessageOutputItem, RawUsage, ReasoningItem, RunItem, ToolCallItem,
};

#[derive(Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    input_tokens_details: Option<InputTokensDetails>,
    #[serde(default)]
    output_tokens_details: Option<OutputTokensDetails>,
}

#[derive(Deserialize)]
struct InputTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct OutputTokensDetails {
    #[serde(default)]
    reasoning_tokens: Option<u64>,
}

/// Map a Responses `usage` object onto provider-neutral raw counters.
pub(super) fn map_usage(usage: &Value) -> Option<RawUsage> {
    if usage.is_null() {
        return None;
    }
    let u: ResponsesUsage = serde_json::from_value(usage.clone()).ok()?;
    Some(RawUsage {
        combined_input: u.input_tokens,
        combined_output: u.output_tokens,
        cached_input: u.input_tokens_details.and_then(|d| d.cached_tokens),
        reasoning_output: u.output_tokens_details.and_then(|d| d.reasoning_tokens),
        total: u.total_tokens,
        ..Default::default()
    })
}

/// Concatenate the `output_text` parts of a message node.
pub(super) fn message_text(node: &Value) -> String {
    node.get("content")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p.get("type").and_then(Value::as_str) == Some("output_text"))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Join the `summary_text` parts of a reasoning node.
///
/// A present but empty `summary` array yields an empty string, so the
/// node can still be replayed; `None` only when the array is missing.
fn reasoning_summary(node: &Value) -> Option<String> {
    let parts: Vec<&str> = node
        .get("summary")?
        .as_array()?
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Some(parts.join("\n"))
}

/// Decode a function call's argument string; undecodable or non-object
/// arguments are kept as the raw string.
pub(super) fn decode_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn function_call_item(node: &Value) -> Result<ToolCallItem> {
    let call_id = str_field(node, &["call_id", "id"]).ok_or_else(|| {
        TesseraError::parsing("function_call output is missing call_id", Some(node.clone()))
    })?;
    let name = str_field(node, &["name"]).ok_or_else(|| {
        TesseraError::parsing("function_call output is missing name", Some(node.clone()))
    })?;
    let arguments = match node.get("arguments") {
        Some(Value::String(raw)) => decode_arguments(raw),
        Some(value @ Value::Object(_)) => value.clone(),
        _ => Value::String(String::new()),
    };
    Ok(ToolCallItem {
        id: str_field(node, &["id"]).map(str::to_string),
        call_id: call_id.to_string(),
        name: name.to_string(),
        arguments,
        raw: node.clone(),
    })
}

pub(super) fn parse_response(raw: &Value) -> Result<ParsedResponse> {
    let output = raw.get("output").and_then(Value::as_array).ok_or_else(|| {
        TesseraError::parsing("response has no output array", Some(raw.clone()))
    })?;

    let mut parsed = ParsedResponse {
        raw_usage: raw.get("usage").and_then(map_usage),
        ..Default::default()
    };

    for node in output {
        match node.get("type").and_then(Value::as_str) {
            Some("message") => parsed.items.push(RunItem::MessageOutput(MessageOutputItem {
                id: str_field(node, &["id"]).map(str::to_string),
                content: message_text(node),
                raw: node.clone(),
            })),
            Some("function_call") => parsed.items.push(RunItem::ToolCall(function_call_item(node)?)),
            Some("reasoning") => parsed.items.push(RunItem::Reasoning(ReasoningItem {
                id: str_field(node, &["id"]).map(str::to_string),
                summary: reasoning_summary(node),
                signature: str_field(node, &["encrypted_content"]).map(str::to_string),
                raw: node.clone(),
            })),
            _ => parsed.unrecognized.push(node.clone()),
        }
    }

    Ok(parsed)
}

/// Input item replaying a reasoning output node on the next turn.
pub(super) fn reasoning_replay(node: &Value) -> Value {
    let summary = reasoning_summary(node);
    let mut payload = json!({
        "type": "reasoning",
        "summary": summary_parts(summary.as_deref().unwrap_or_default()),
    });
    if let Some(obj) = payload.as_object_mut() {
        for key in ["id", "encrypted_content"] {
            if let Some(value) = node.get(key).filter(|v| !v.is_null()) {
                obj.insert(key.into(), value.clone());
            }
        }
    }
    payload
}

pub(super) fn continuation_items(raw: &Value) -> Vec<Value> {
    let Some(output) = raw.get("output").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for node in output {
        match node.get("type").and_then(Value::as_str) {
            Some("message") => {
                let text = message_text(node);
                if !text.is_empty() {
                    items.push(assistant_text(&text));
                }
            }
            Some("function_call") => {
                if let Ok(call) = function_call_item(node) {
                    items.push(function_call(&call.call_id, &call.name, &call.arguments));
                }
            }
            Some("reasoning") => items.push(reasoning_replay(node)),
            _ => {}
        }
    }
    items
}
