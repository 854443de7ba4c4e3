//! Responses SSE event normalization.
//!
//! One normalizer lives for a whole streaming run, across every network
//! turn of the agent loop. `response.created` opens a turn and resets the
//! per-turn state; `stream.start` is emitted only for the first one.
//!
//! Tool-call fragments are correlated by provider item id. A call's
//! arguments are parsed exactly once, when the arguments are complete, and
//! `tool.call.done` is held back until the call id and name are both
//! known, whichever event delivers them last.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::responses::{decode_arguments, map_usage, reasoning_replay};
use crate::error::ErrorCode;
use crate::provider::format::str_field;
use crate::provider::StreamNormalizer;
use crate::types::{RawUsage, StreamEvent, StreamEventKind};

#[derive(Debug, Default)]
struct CallBuffer {
    call_id: Option<String>,
    name: Option<String>,
    arguments: String,
    /// Parsed arguments waiting for the call id or name to arrive.
    parsed: Option<Value>,
}

impl CallBuffer {
    fn absorb_identity(&mut self, item: &Value) {
        if self.call_id.is_none() {
            self.call_id = str_field(item, &["call_id"]).map(str::to_string);
        }
        if self.name.is_none() {
            self.name = str_field(item, &["name"]).map(str::to_string);
        }
    }
}

/// Stream normalizer for the OpenAI Responses protocol.
#[derive(Debug, Default)]
pub struct OpenAiStreamNormalizer {
    calls: HashMap<String, CallBuffer>,
    retired: HashSet<String>,
    text: String,
    reasoning: String,
    started: bool,
    ended: bool,
    turn_has_tool_calls: bool,
    usage: Option<RawUsage>,
    /// Completed reasoning items of the current turn, ready to replay.
    replay: Vec<Value>,
}

impl OpenAiStreamNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset_turn(&mut self) {
        self.calls.clear();
        self.text.clear();
        self.reasoning.clear();
        self.replay.clear();
        self.turn_has_tool_calls = false;
    }

    fn error(code: ErrorCode, message: impl Into<String>) -> StreamEvent {
        StreamEvent::new(StreamEventKind::StreamError {
            error: message.into(),
            code,
        })
    }

    fn other(id: Option<String>) -> StreamEvent {
        StreamEvent::new(StreamEventKind::Other).with_id(id)
    }

    /// Emit `tool.call.done` if the entry for `item_id` is parsed and
    /// identified; otherwise leave it registered.
    fn try_complete(&mut self, item_id: &str) -> Option<StreamEvent> {
        let entry = self.calls.get(item_id)?;
        if entry.parsed.is_none() || entry.call_id.is_none() || entry.name.is_none() {
            return None;
        }
        let entry = self.calls.remove(item_id)?;
        self.retired.insert(item_id.to_string());
        Some(
            StreamEvent::new(StreamEventKind::ToolCallDone {
                call_id: entry.call_id?,
                name: entry.name?,
                arguments: entry.parsed?,
            })
            .with_id(Some(item_id.to_string())),
        )
    }

    /// Parse the complete argument text of a call, or retire it with an error.
    fn finish_arguments(&mut self, item_id: &str, fallback: Option<&str>) -> StreamEvent {
        let entry = self.calls.entry(item_id.to_string()).or_default();
        let text = if entry.arguments.is_empty() {
            fallback.unwrap_or_default().to_string()
        } else {
            std::mem::take(&mut entry.arguments)
        };

        match decode_arguments(&text) {
            value @ Value::Object(_) => {
                entry.parsed = Some(value);
                self.try_complete(item_id)
                    .unwrap_or_else(|| Self::other(Some(item_id.to_string())))
            }
            _ => {
                let call_id = entry.call_id.clone();
                self.calls.remove(item_id);
                self.retired.insert(item_id.to_string());
                tracing::warn!(item_id, ?call_id, "tool call arguments did not parse");
                Self::error(
                    ErrorCode::AgentParsingFailed,
                    format!("tool call arguments for item '{item_id}' are not a JSON object: {text:?}"),
                )
                .with_id(Some(item_id.to_string()))
            }
        }
    }

    fn on_item_added(&mut self, item: &Value) -> StreamEvent {
        let item_id = str_field(item, &["id"]).map(str::to_string);
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            return Self::other(item_id);
        }
        let Some(item_id) = item_id else {
            return Self::other(None);
        };
        if self.retired.contains(&item_id) {
            return Self::other(Some(item_id));
        }
        self.turn_has_tool_calls = true;
        self.calls
            .entry(item_id.clone())
            .or_default()
            .absorb_identity(item);
        self.try_complete(&item_id)
            .unwrap_or_else(|| Self::other(Some(item_id)))
    }

    fn on_item_done(&mut self, item: &Value) -> StreamEvent {
        let item_id = str_field(item, &["id"]).map(str::to_string);
        match item.get("type").and_then(Value::as_str) {
            Some("function_call") => {}
            Some("reasoning") if item_id.is_some() => {
                self.replay.push(reasoning_replay(item));
                return Self::other(item_id);
            }
            _ => return Self::other(item_id),
        }
        let Some(item_id) = item_id else {
            return Self::other(None);
        };
        if self.retired.contains(&item_id) {
            return Self::other(Some(item_id));
        }
        self.turn_has_tool_calls = true;
        let entry = self.calls.entry(item_id.clone()).or_default();
        entry.absorb_identity(item);
        if entry.parsed.is_some() {
            return self
                .try_complete(&item_id)
                .unwrap_or_else(|| Self::other(Some(item_id)));
        }
        let fallback = str_field(item, &["arguments"]).map(str::to_string);
        self.finish_arguments(&item_id, fallback.as_deref())
    }

    fn on_arguments_delta(&mut self, event: &Value) -> StreamEvent {
        let Some(item_id) = str_field(event, &["item_id"]).map(str::to_string) else {
            return Self::other(None);
        };
        if self.retired.contains(&item_id) {
            return Self::other(Some(item_id));
        }
        self.turn_has_tool_calls = true;
        let delta = str_field(event, &["delta"]).unwrap_or_default().to_string();
        let entry = self.calls.entry(item_id.clone()).or_default();
        entry.arguments.push_str(&delta);
        StreamEvent::new(StreamEventKind::ToolCallDelta {
            call_id: entry.call_id.clone(),
            name: entry.name.clone(),
            delta,
        })
        .with_id(Some(item_id))
    }

    fn on_arguments_done(&mut self, event: &Value) -> StreamEvent {
        let Some(item_id) = str_field(event, &["item_id"]).map(str::to_string) else {
            return Self::other(None);
        };
        if self.retired.contains(&item_id) {
            return Self::other(Some(item_id));
        }
        self.turn_has_tool_calls = true;
        if let Some(name) = str_field(event, &["name"]) {
            let entry = self.calls.entry(item_id.clone()).or_default();
            entry.name.get_or_insert_with(|| name.to_string());
        }
        let fallback = str_field(event, &["arguments"]).map(str::to_string);
        self.finish_arguments(&item_id, fallback.as_deref())
    }

    fn on_turn_complete(&mut self, event: &Value) -> StreamEvent {
        let response = event.get("response");
        let response_id = response
            .and_then(|r| str_field(r, &["id"]))
            .map(str::to_string);
        let usage = response.and_then(|r| r.get("usage")).and_then(map_usage);
        if usage.is_some() {
            self.usage = usage;
        }
        let token_usage = usage.map(|u| u.unblend());

        // A turn that requested tools is only paused; the loop will continue it.
        let kind = if self.turn_has_tool_calls || self.ended {
            StreamEventKind::Other
        } else {
            self.ended = true;
            StreamEventKind::StreamEnd
        };
        StreamEvent::new(kind)
            .with_id(response_id)
            .with_usage(token_usage)
    }

    fn failure_message(event: &Value) -> String {
        let error = event
            .get("response")
            .and_then(|r| r.get("error"))
            .filter(|e| !e.is_null())
            .unwrap_or(event);
        str_field(error, &["message"])
            .map(str::to_string)
            .unwrap_or_else(|| "provider reported a failed response".to_string())
    }

    fn error_code(event: &Value) -> ErrorCode {
        match str_field(event, &["code"]) {
            Some("rate_limit_exceeded") => ErrorCode::ApiRateLimited,
            Some("invalid_api_key") => ErrorCode::ApiAuthFailed,
            _ => ErrorCode::ApiStatusError,
        }
    }
}

impl StreamNormalizer for OpenAiStreamNormalizer {
    fn process(&mut self, raw: Value) -> StreamEvent {
        let Some(event_type) = raw.get("type").and_then(Value::as_str).map(str::to_string) else {
            return Self::error(
                ErrorCode::AgentParsingFailed,
                "malformed stream chunk: missing event type",
            )
            .with_raw(raw);
        };
        let item_id = str_field(&raw, &["item_id"]).map(str::to_string);

        let event = match event_type.as_str() {
            "response.created" => {
                self.reset_turn();
                let id = raw
                    .get("response")
                    .and_then(|r| str_field(r, &["id"]))
                    .map(str::to_string);
                if self.started {
                    Self::other(id)
                } else {
                    self.started = true;
                    StreamEvent::new(StreamEventKind::StreamStart).with_id(id)
                }
            }
            "response.output_item.added" => match raw.get("item") {
                Some(item) => self.on_item_added(item),
                None => Self::other(None),
            },
            "response.output_item.done" => match raw.get("item") {
                Some(item) => self.on_item_done(item),
                None => Self::other(None),
            },
            "response.function_call_arguments.delta" => self.on_arguments_delta(&raw),
            "response.function_call_arguments.done" => self.on_arguments_done(&raw),
            "response.output_text.delta" => {
                let delta = str_field(&raw, &["delta"]).unwrap_or_default().to_string();
                self.text.push_str(&delta);
                StreamEvent::new(StreamEventKind::MessageOutputDelta { delta }).with_id(item_id)
            }
            "response.output_text.done" => {
                let buffered = std::mem::take(&mut self.text);
                let output = if buffered.is_empty() {
                    str_field(&raw, &["text"]).unwrap_or_default().to_string()
                } else {
                    buffered
                };
                StreamEvent::new(StreamEventKind::MessageOutputDone { output }).with_id(item_id)
            }
            "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
                let delta = str_field(&raw, &["delta"]).unwrap_or_default().to_string();
                self.reasoning.push_str(&delta);
                StreamEvent::new(StreamEventKind::ReasoningDelta { delta }).with_id(item_id)
            }
            "response.reasoning_summary_text.done" | "response.reasoning_text.done" => {
                let buffered = std::mem::take(&mut self.reasoning);
                let output = if buffered.is_empty() {
                    str_field(&raw, &["text"]).unwrap_or_default().to_string()
                } else {
                    buffered
                };
                StreamEvent::new(StreamEventKind::ReasoningDone { output }).with_id(item_id)
            }
            "response.completed" | "response.incomplete" => self.on_turn_complete(&raw),
            "response.failed" => {
                let code = raw
                    .get("response")
                    .and_then(|r| r.get("error"))
                    .map(Self::error_code)
                    .unwrap_or(ErrorCode::ApiStatusError);
                Self::error(code, Self::failure_message(&raw))
            }
            "error" => Self::error(Self::error_code(&raw), Self::failure_message(&raw)),
            _ => Self::other(item_id.or_else(|| {
                raw.get("response")
                    .and_then(|r| str_field(r, &["id"]))
                    .map(str::to_string)
            })),
        };

        event.with_raw(raw)
    }

    fn take_usage(&mut self) -> Option<RawUsage> {
        self.usage.take()
    }

    fn pending_tool_calls(&self) -> usize {
        self.calls.len()
    }

    fn take_replay_items(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn created(id: &str) -> Value {
        json!({"type": "response.created", "response": {"id": id, "status": "in_progress"}})
    }

    fn completed(id: &str) -> Value {
        json!({
            "type": "response.completed",
            "response": {
                "id": id,
                "status": "completed",
                "usage": {
                    "input_tokens": 50,
                    "input_tokens_details": {"cached_tokens": 10},
                    "output_tokens": 5,
                    "total_tokens": 55
                }
            }
        })
    }

    fn call_added(item_id: &str, call_id: Option<&str>, name: Option<&str>) -> Value {
        let mut item = json!({"type": "function_call", "id": item_id, "arguments": ""});
        if let Some(call_id) = call_id {
            item["call_id"] = json!(call_id);
        }
        if let Some(name) = name {
            item["name"] = json!(name);
        }
        json!({"type": "response.output_item.added", "item": item})
    }

    fn args_delta(item_id: &str, delta: &str) -> Value {
        json!({"type": "response.function_call_arguments.delta", "item_id": item_id, "delta": delta})
    }

    fn args_done(item_id: &str) -> Value {
        json!({"type": "response.function_call_arguments.done", "item_id": item_id})
    }

    fn types(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_type).collect()
    }

    fn run(normalizer: &mut OpenAiStreamNormalizer, raw: Vec<Value>) -> Vec<StreamEvent> {
        raw.into_iter().map(|r| normalizer.process(r)).collect()
    }

    #[test]
    fn fragments_are_concatenated_and_parsed_once() {
        let mut n = OpenAiStreamNormalizer::new();
        let events = run(
            &mut n,
            vec![
                created("resp_1"),
                call_added("fc_1", Some("call_1"), Some("get_weather")),
                args_delta("fc_1", "{\"loc"),
                args_delta("fc_1", "ation\":\"Pa"),
                args_delta("fc_1", "ris\"}"),
                args_done("fc_1"),
                completed("resp_1"),
            ],
        );
        assert_eq!(
            types(&events),
            vec![
                "stream.start",
                "other.event",
                "tool.call.delta",
                "tool.call.delta",
                "tool.call.delta",
                "tool.call.done",
                "other.event",
            ]
        );
        assert_eq!(
            events[5].kind,
            StreamEventKind::ToolCallDone {
                call_id: "call_1".into(),
                name: "get_weather".into(),
                arguments: json!({"location": "Paris"}),
            }
        );
        assert_eq!(events[5].id.as_deref(), Some("fc_1"));
        assert_eq!(n.pending_tool_calls(), 0);
    }

    #[test]
    fn deltas_carry_raw_fragments_only() {
        let mut n = OpenAiStreamNormalizer::new();
        n.process(call_added("fc_1", Some("call_1"), Some("f")));
        let ev = n.process(args_delta("fc_1", "{\"a\":"));
        assert_eq!(
            ev.kind,
            StreamEventKind::ToolCallDelta {
                call_id: Some("call_1".into()),
                name: Some("f".into()),
                delta: "{\"a\":".into(),
            }
        );
    }

    #[test]
    fn interleaved_calls_are_keyed_by_item_id() {
        let mut n = OpenAiStreamNormalizer::new();
        let events = run(
            &mut n,
            vec![
                created("resp_1"),
                call_added("fc_a", Some("call_a"), Some("first")),
                call_added("fc_b", Some("call_b"), Some("second")),
                args_delta("fc_b", "{\"n\":"),
                args_delta("fc_a", "{\"m\":"),
                args_delta("fc_a", "1}"),
                args_delta("fc_b", "2}"),
                args_done("fc_b"),
                args_done("fc_a"),
            ],
        );
        assert_eq!(
            events[7].kind,
            StreamEventKind::ToolCallDone {
                call_id: "call_b".into(),
                name: "second".into(),
                arguments: json!({"n": 2}),
            }
        );
        assert_eq!(
            events[8].kind,
            StreamEventKind::ToolCallDone {
                call_id: "call_a".into(),
                name: "first".into(),
                arguments: json!({"m": 1}),
            }
        );
    }

    #[test]
    fn empty_argument_stream_is_a_parse_failure() {
        let mut n = OpenAiStreamNormalizer::new();
        n.process(created("resp_1"));
        n.process(call_added("fc_1", Some("call_1"), Some("f")));
        let ev = n.process(args_done("fc_1"));
        assert!(matches!(
            ev.kind,
            StreamEventKind::StreamError {
                code: ErrorCode::AgentParsingFailed,
                ..
            }
        ));
        assert_eq!(n.pending_tool_calls(), 0);
    }

    #[test]
    fn name_arriving_after_fragments_still_completes() {
        let mut n = OpenAiStreamNormalizer::new();
        let events = run(
            &mut n,
            vec![
                created("resp_1"),
                args_delta("fc_1", "{\"q\":"),
                args_delta("fc_1", "\"rust\"}"),
                args_done("fc_1"),
                json!({
                    "type": "response.output_item.done",
                    "item": {
                        "type": "function_call",
                        "id": "fc_1",
                        "call_id": "call_1",
                        "name": "search",
                        "arguments": "{\"q\":\"rust\"}"
                    }
                }),
            ],
        );
        assert_eq!(
            types(&events),
            vec![
                "stream.start",
                "tool.call.delta",
                "tool.call.delta",
                "other.event",
                "tool.call.done"
            ]
        );
        assert_eq!(
            events[4].kind,
            StreamEventKind::ToolCallDone {
                call_id: "call_1".into(),
                name: "search".into(),
                arguments: json!({"q": "rust"}),
            }
        );
    }

    #[test]
    fn item_done_after_call_done_does_not_repeat() {
        let mut n = OpenAiStreamNormalizer::new();
        let events = run(
            &mut n,
            vec![
                call_added("fc_1", Some("call_1"), Some("f")),
                args_delta("fc_1", "{}"),
                args_done("fc_1"),
                json!({
                    "type": "response.output_item.done",
                    "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "f", "arguments": "{}"}
                }),
            ],
        );
        let done_count = events
            .iter()
            .filter(|e| e.event_type() == "tool.call.done")
            .count();
        assert_eq!(done_count, 1);
    }

    #[test]
    fn item_done_without_argument_events_uses_item_arguments() {
        let mut n = OpenAiStreamNormalizer::new();
        let ev = n.process(json!({
            "type": "response.output_item.done",
            "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "f", "arguments": "{\"x\":1}"}
        }));
        assert_eq!(
            ev.kind,
            StreamEventKind::ToolCallDone {
                call_id: "call_1".into(),
                name: "f".into(),
                arguments: json!({"x": 1}),
            }
        );
    }

    #[test]
    fn tool_turn_completion_is_not_stream_end() {
        let mut n = OpenAiStreamNormalizer::new();
        let events = run(
            &mut n,
            vec![
                created("resp_1"),
                call_added("fc_1", Some("call_1"), Some("f")),
                args_delta("fc_1", "{}"),
                args_done("fc_1"),
                completed("resp_1"),
                created("resp_2"),
                json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "Done"}),
                json!({"type": "response.output_text.done", "item_id": "msg_1", "text": "Done"}),
                completed("resp_2"),
            ],
        );
        assert_eq!(
            types(&events),
            vec![
                "stream.start",
                "other.event",
                "tool.call.delta",
                "tool.call.done",
                "other.event",
                "other.event",
                "message.output.delta",
                "message.output.done",
                "stream.end",
            ]
        );
        let ends = events
            .iter()
            .filter(|e| e.event_type() == "stream.end")
            .count();
        assert_eq!(ends, 1);
        assert_eq!(events[8].token_usage.unwrap().input_tokens, 40);
    }

    #[test]
    fn text_done_carries_full_buffer() {
        let mut n = OpenAiStreamNormalizer::new();
        n.process(json!({"type": "response.output_text.delta", "item_id": "m", "delta": "Hel"}));
        n.process(json!({"type": "response.output_text.delta", "item_id": "m", "delta": "lo"}));
        let ev = n.process(json!({"type": "response.output_text.done", "item_id": "m", "text": "ignored"}));
        assert_eq!(
            ev.kind,
            StreamEventKind::MessageOutputDone {
                output: "Hello".into()
            }
        );
    }

    #[test]
    fn reasoning_buffer_is_independent() {
        let mut n = OpenAiStreamNormalizer::new();
        n.process(json!({"type": "response.output_text.delta", "item_id": "m", "delta": "text"}));
        n.process(json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs", "delta": "think"}));
        let ev = n.process(json!({"type": "response.reasoning_summary_text.done", "item_id": "rs"}));
        assert_eq!(
            ev.kind,
            StreamEventKind::ReasoningDone {
                output: "think".into()
            }
        );
    }

    #[test]
    fn completed_reasoning_items_are_kept_for_replay() {
        let mut n = OpenAiStreamNormalizer::new();
        n.process(created("resp_1"));
        let ev = n.process(json!({
            "type": "response.output_item.done",
            "item": {
                "type": "reasoning",
                "id": "rs_1",
                "summary": [{"type": "summary_text", "text": "Need weather."}],
                "encrypted_content": "gAAA"
            }
        }));
        assert_eq!(ev.event_type(), "other.event");
        assert_eq!(
            n.take_replay_items(),
            vec![json!({
                "type": "reasoning",
                "id": "rs_1",
                "summary": [{"type": "summary_text", "text": "Need weather."}],
                "encrypted_content": "gAAA"
            })]
        );
        assert!(n.take_replay_items().is_empty());

        n.process(json!({"type": "response.output_item.done", "item": {"type": "reasoning", "summary": []}}));
        n.process(created("resp_2"));
        assert!(n.take_replay_items().is_empty());
    }

    #[test]
    fn usage_is_reported_once_per_completion() {
        let mut n = OpenAiStreamNormalizer::new();
        n.process(created("resp_1"));
        n.process(completed("resp_1"));
        let usage = n.take_usage().unwrap();
        assert_eq!(usage.combined_input, 50);
        assert_eq!(usage.cached_input, Some(10));
        assert!(n.take_usage().is_none());
    }

    #[test]
    fn failures_and_malformed_chunks_become_stream_errors() {
        let mut n = OpenAiStreamNormalizer::new();
        let ev = n.process(json!({
            "type": "response.failed",
            "response": {"id": "resp_1", "error": {"code": "server_error", "message": "boom"}}
        }));
        assert_eq!(
            ev.kind,
            StreamEventKind::StreamError {
                error: "boom".into(),
                code: ErrorCode::ApiStatusError,
            }
        );

        let ev = n.process(json!({"type": "error", "code": "rate_limit_exceeded", "message": "slow down"}));
        assert!(matches!(
            ev.kind,
            StreamEventKind::StreamError {
                code: ErrorCode::ApiRateLimited,
                ..
            }
        ));

        let ev = n.process(json!(["not", "an", "event"]));
        assert_eq!(ev.event_type(), "stream.error");
        assert!(ev.raw_event.is_some());
    }

    #[test]
    fn unknown_events_are_preserved() {
        let mut n = OpenAiStreamNormalizer::new();
        let raw = json!({"type": "response.web_search_call.searching", "item_id": "ws_1"});
        let ev = n.process(raw.clone());
        assert_eq!(ev.event_type(), "other.event");
        assert_eq!(ev.id.as_deref(), Some("ws_1"));
        assert_eq!(ev.raw_event, Some(raw));
    }
}
