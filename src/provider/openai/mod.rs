//! OpenAI Responses API adapter.

mod responses;
mod stream;

pub use stream::OpenAiStreamNormalizer;

use std::collections::HashSet;

use serde_json::{json, Value};

use super::format::{arguments_to_string, tool_result_to_string};
use super::{ParsedResponse, ProviderAdapter, RequestContext, RunInput, StreamNormalizer};
use crate::error::{Result, TesseraError};
use crate::tools::ToolDefinition;
use crate::types::{ContentBlock, Conversation, Role, ToolCallItem, ToolCallOutputItem};

pub const PROVIDER_NAME: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for the OpenAI Responses wire protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponsesAdapter;

impl OpenAiResponsesAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ProviderAdapter for OpenAiResponsesAdapter {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn normalize_input(&self, input: RunInput) -> Result<Vec<Value>> {
        match input {
            RunInput::Text(text) => {
                let mut conversation = Conversation::new();
                conversation.add_user(text);
                serialize_conversation(&conversation)
            }
            RunInput::Native(items) => Ok(items),
            RunInput::Conversation(conversation) => serialize_conversation(&conversation),
        }
    }

    fn build_request(&self, history: &[Value], ctx: &RequestContext<'_>) -> Result<Value> {
        build_request_body(history, ctx)
    }

    fn parse_response(&self, raw: &Value) -> Result<ParsedResponse> {
        responses::parse_response(raw)
    }

    fn continuation_items(&self, raw: &Value) -> Vec<Value> {
        responses::continuation_items(raw)
    }

    fn stream_continuation_items(&self, text: &str, calls: &[ToolCallItem]) -> Vec<Value> {
        let mut items = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            items.push(assistant_text(text));
        }
        items.extend(
            calls
                .iter()
                .map(|call| function_call(&call.call_id, &call.name, &call.arguments)),
        );
        items
    }

    fn tool_output_item(&self, output: &ToolCallOutputItem) -> Value {
        json!({
            "type": "function_call_output",
            "call_id": output.call_id,
            "output": output.result,
        })
    }

    fn new_stream_normalizer(&self) -> Box<dyn StreamNormalizer> {
        Box::new(OpenAiStreamNormalizer::new())
    }
}

fn assistant_text(text: &str) -> Value {
    json!({
        "role": "assistant",
        "content": [{"type": "output_text", "text": text}],
    })
}

fn function_call(call_id: &str, name: &str, arguments: &Value) -> Value {
    json!({
        "type": "function_call",
        "call_id": call_id,
        "name": name,
        "arguments": arguments_to_string(arguments),
    })
}

/// Summary parts of a reasoning node; an empty summary is sent as `[]`.
fn summary_parts(summary: &str) -> Vec<Value> {
    if summary.is_empty() {
        return Vec::new();
    }
    vec![json!({"type": "summary_text", "text": summary})]
}

fn reasoning_node(id: &str, summary: &str, signature: Option<&str>) -> Value {
    let mut node = json!({
        "type": "reasoning",
        "id": id,
        "summary": summary_parts(summary),
    });
    if let (Some(sig), Some(obj)) = (signature, node.as_object_mut()) {
        obj.insert("encrypted_content".into(), sig.into());
    }
    node
}

/// Serialize a canonical conversation into Responses input items.
///
/// Fails on tool outputs whose call id was never emitted earlier in the
/// conversation, and on reasoning blocks lacking an id or summary.
pub fn serialize_conversation(conversation: &Conversation) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut known_calls: HashSet<&str> = HashSet::new();

    for message in conversation {
        let role = message.role();
        for block in message.content() {
            match block {
                ContentBlock::Text(t) => match role {
                    Role::Assistant => items.push(assistant_text(&t.text)),
                    Role::System | Role::User => items.push(json!({
                        "role": role.to_string(),
                        "content": [{"type": "input_text", "text": t.text}],
                    })),
                },
                ContentBlock::ToolCall(call) => {
                    known_calls.insert(call.call_id.as_str());
                    items.push(function_call(&call.call_id, &call.name, &call.arguments));
                }
                ContentBlock::ToolOutput(out) => {
                    if !known_calls.contains(out.call_id.as_str()) {
                        return Err(TesseraError::OrphanToolOutput {
                            call_id: out.call_id.clone(),
                        });
                    }
                    items.push(json!({
                        "type": "function_call_output",
                        "call_id": out.call_id,
                        "output": tool_result_to_string(&out.output),
                    }));
                }
                ContentBlock::Reasoning(reasoning) => {
                    let (Some(id), Some(summary)) = (&reasoning.reasoning_id, &reasoning.summary)
                    else {
                        return Err(TesseraError::serialization(
                            "OpenAI reasoning replay requires reasoning_id and summary",
                        )
                        .with_context("provider", PROVIDER_NAME)
                        .with_context("role", role.to_string())
                        .with_context("block_type", block.kind()));
                    };
                    items.push(reasoning_node(id, summary, reasoning.signature.as_deref()));
                }
            }
        }
    }

    Ok(items)
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    let mut def = json!({
        "type": "function",
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    });
    if let (Some(strict), Some(obj)) = (tool.strict, def.as_object_mut()) {
        obj.insert("strict".into(), strict.into());
    }
    def
}

fn build_request_body(history: &[Value], ctx: &RequestContext<'_>) -> Result<Value> {
    let settings = ctx.settings;
    let mut obj = serde_json::Map::new();
    obj.insert("model".into(), ctx.model.into());
    obj.insert("input".into(), Value::Array(history.to_vec()));
    obj.insert("stream".into(), ctx.stream.into());
    obj.insert("store".into(), settings.store.into());

    if let Some(instructions) = ctx.instructions {
        obj.insert("instructions".into(), instructions.into());
    }
    if let Some(temp) = settings.temperature {
        obj.insert("temperature".into(), temp.into());
    }
    if let Some(max) = settings.max_output_tokens {
        obj.insert("max_output_tokens".into(), max.into());
    }

    let mut reasoning = serde_json::Map::new();
    if let Some(effort) = settings.reasoning_effort {
        reasoning.insert("effort".into(), effort.to_string().into());
    }
    if let Some(summary) = settings.reasoning_summary {
        reasoning.insert("summary".into(), summary.to_string().into());
    }
    if !reasoning.is_empty() {
        obj.insert("reasoning".into(), Value::Object(reasoning));
    }

    let mut text = serde_json::Map::new();
    if let Some(verbosity) = settings.text_verbosity {
        text.insert("verbosity".into(), verbosity.to_string().into());
    }
    if let Some(format) = &settings.text_format {
        text.insert("format".into(), serde_json::to_value(format)?);
    }
    if !text.is_empty() {
        obj.insert("text".into(), Value::Object(text));
    }

    if !ctx.tools.is_empty() {
        let tools: Vec<Value> = ctx.tools.iter().map(tool_to_wire).collect();
        obj.insert("tools".into(), tools.into());
        obj.insert("tool_choice".into(), ctx.tool_choice.to_string().into());
        obj.insert("parallel_tool_calls".into(), ctx.parallel_tool_calls.into());
    }

    for (key, value) in &settings.extra {
        obj.insert(key.clone(), value.clone());
    }

    Ok(Value::Object(obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolParameters;
    use crate::types::{GenerationSettings, ReasoningEffort, TextFormat, ToolChoice};
    use pretty_assertions::assert_eq;

    fn ctx<'a>(settings: &'a GenerationSettings, tools: &'a [ToolDefinition]) -> RequestContext<'a> {
        RequestContext {
            model: "gpt-5-nano",
            settings,
            instructions: Some("Be brief."),
            tools,
            tool_choice: ToolChoice::Auto,
            parallel_tool_calls: true,
            stream: false,
        }
    }

    fn weather_tool() -> ToolDefinition {
        ToolDefinition {
            name: "get_weather".into(),
            description: "Look up weather".into(),
            parameters: ToolParameters::object()
                .string("location", "City", true)
                .build()
                .schema,
            strict: Some(true),
        }
    }

    #[test]
    fn text_input_wraps_into_user_input_text() {
        let items = OpenAiResponsesAdapter
            .normalize_input(RunInput::from("ping"))
            .unwrap();
        assert_eq!(
            items,
            vec![json!({"role": "user", "content": [{"type": "input_text", "text": "ping"}]})]
        );
    }

    #[test]
    fn native_input_passes_through() {
        let native = vec![json!({"role": "user", "content": "raw"}), json!({"weird": true})];
        let items = OpenAiResponsesAdapter
            .normalize_input(RunInput::from(native.clone()))
            .unwrap();
        assert_eq!(items, native);
    }

    #[test]
    fn conversation_follows_wire_mapping() {
        let mut conv = Conversation::new();
        conv.add_system("sys")
            .add_user("Weather?")
            .add_tool_call("get_weather", json!({"location": "Paris"}), "call_1")
            .unwrap()
            .add_tool_output("call_1", json!({"temp": 22}), Some("get_weather"), None)
            .add_assistant("22C in Paris.");
        let items = serialize_conversation(&conv).unwrap();
        assert_eq!(
            items,
            vec![
                json!({"role": "system", "content": [{"type": "input_text", "text": "sys"}]}),
                json!({"role": "user", "content": [{"type": "input_text", "text": "Weather?"}]}),
                json!({
                    "type": "function_call",
                    "call_id": "call_1",
                    "name": "get_weather",
                    "arguments": "{\"location\":\"Paris\"}",
                }),
                json!({"type": "function_call_output", "call_id": "call_1", "output": "{\"temp\":22}"}),
                json!({"role": "assistant", "content": [{"type": "output_text", "text": "22C in Paris."}]}),
            ]
        );
    }

    #[test]
    fn orphan_tool_output_fails_serialization() {
        let mut conv = Conversation::new();
        conv.add_user("hi").add_tool_output("call_x", "ok", None, None);
        let err = serialize_conversation(&conv).unwrap_err();
        assert!(matches!(err, TesseraError::OrphanToolOutput { ref call_id } if call_id == "call_x"));
    }

    #[test]
    fn tool_output_after_later_call_is_still_orphan() {
        let mut conv = Conversation::new();
        conv.add_tool_output("call_1", "early", None, None)
            .add_tool_call("f", json!({}), "call_1")
            .unwrap();
        assert!(serialize_conversation(&conv).is_err());
    }

    #[test]
    fn reasoning_requires_id_and_summary() {
        let mut conv = Conversation::new();
        conv.add_reasoning(Some("thinking".into()), None, None).unwrap();
        let err = serialize_conversation(&conv).unwrap_err();
        assert!(matches!(err, TesseraError::Serialization { .. }));
        assert_eq!(err.context()["provider"], "openai");

        let mut conv = Conversation::new();
        conv.add_reasoning(Some("thinking".into()), Some("enc".into()), Some("rs_1".into()))
            .unwrap();
        let items = serialize_conversation(&conv).unwrap();
        assert_eq!(
            items[0],
            json!({
                "type": "reasoning",
                "id": "rs_1",
                "summary": [{"type": "summary_text", "text": "thinking"}],
                "encrypted_content": "enc",
            })
        );
    }

    #[test]
    fn request_body_includes_settings() {
        let settings = GenerationSettings::builder()
            .temperature(0.2)
            .max_output_tokens(256)
            .reasoning_effort(ReasoningEffort::Minimal)
            .text_format(TextFormat::JsonObject)
            .build();
        let body = build_request_body(&[], &ctx(&settings, &[])).unwrap();
        assert_eq!(body["model"], "gpt-5-nano");
        assert_eq!(body["instructions"], "Be brief.");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_output_tokens"], 256);
        assert_eq!(body["reasoning"], json!({"effort": "minimal"}));
        assert_eq!(body["text"], json!({"format": {"type": "json_object"}}));
        assert_eq!(body["store"], false);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn tool_fields_only_sent_with_tools() {
        let settings = GenerationSettings::default();
        let body = build_request_body(&[], &ctx(&settings, &[])).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("parallel_tool_calls").is_none());

        let tools = [weather_tool()];
        let body = build_request_body(&[], &ctx(&settings, &tools)).unwrap();
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["parallel_tool_calls"], true);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["strict"], true);
        assert_eq!(body["tools"][0]["parameters"]["additionalProperties"], false);
    }

    #[test]
    fn extra_settings_are_merged_last() {
        let mut extra = serde_json::Map::new();
        extra.insert("metadata".into(), json!({"k": "v"}));
        extra.insert("store".into(), json!(true));
        let settings = GenerationSettings::builder().extra(extra).build();
        let body = build_request_body(&[], &ctx(&settings, &[])).unwrap();
        assert_eq!(body["metadata"], json!({"k": "v"}));
        assert_eq!(body["store"], true);
    }

    #[test]
    fn stream_continuation_puts_text_before_calls() {
        let calls = vec![ToolCallItem {
            id: Some("fc_1".into()),
            call_id: "call_1".into(),
            name: "get_weather".into(),
            arguments: json!({"location": "Paris"}),
            raw: Value::Null,
        }];
        let items = OpenAiResponsesAdapter.stream_continuation_items("Checking.", &calls);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["role"], "assistant");
        assert_eq!(items[1]["type"], "function_call");
        assert_eq!(items[1]["arguments"], "{\"location\":\"Paris\"}");

        let items = OpenAiResponsesAdapter.stream_continuation_items("", &calls);
        assert_eq!(items.len(), 1);
    }
}
