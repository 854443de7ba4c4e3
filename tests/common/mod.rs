//! Shared test helpers: a scripted transport and canned Responses payloads.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use tessera::agent::{Agent, ModelClient};
use tessera::error::{Result, TesseraError};
use tessera::provider::openai::OpenAiResponsesAdapter;
use tessera::provider::{AsyncTransport, RawEventIter, RawEventStream, Transport};
use tessera::tools::{Tool, ToolParameters};

#[derive(Default)]
struct Script {
    responses: VecDeque<Value>,
    streams: VecDeque<Vec<Value>>,
    requests: Vec<Value>,
}

/// In-memory transport replaying queued responses and event streams.
///
/// Clones share one script, so a test can keep a handle to inspect the
/// recorded requests after handing the transport to a client.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a non-streaming response body.
    pub fn push_response(&self, response: Value) -> &Self {
        self.script.lock().unwrap().responses.push_back(response);
        self
    }

    /// Queue the raw events of one streamed turn.
    pub fn push_stream(&self, events: Vec<Value>) -> &Self {
        self.script.lock().unwrap().streams.push_back(events);
        self
    }

    /// Request bodies received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    fn next_response(&self, body: &Value) -> Result<Value> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(body.clone());
        script
            .responses
            .pop_front()
            .ok_or_else(|| TesseraError::Connection("script exhausted".into()))
    }

    fn next_stream(&self, body: &Value) -> Result<Vec<Value>> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(body.clone());
        script
            .streams
            .pop_front()
            .ok_or_else(|| TesseraError::Connection("script exhausted".into()))
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, body: &Value) -> Result<Value> {
        self.next_response(body)
    }

    fn open_stream(&self, body: &Value) -> Result<RawEventIter> {
        let events = self.next_stream(body)?;
        Ok(Box::new(events.into_iter().map(Ok)))
    }
}

#[async_trait]
impl AsyncTransport for ScriptedTransport {
    async fn send(&self, body: &Value) -> Result<Value> {
        self.next_response(body)
    }

    async fn open_stream(&self, body: &Value) -> Result<RawEventStream> {
        let events = self.next_stream(body)?;
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}

/// Agent over the OpenAI adapter and a scripted transport.
pub fn agent(transport: &ScriptedTransport) -> Agent {
    let client = ModelClient::new(OpenAiResponsesAdapter::new(), "gpt-5-nano")
        .with_shared_transport(transport.clone());
    Agent::new(client)
}

pub fn weather_tool() -> Tool {
    Tool::new_sync(
        "get_weather",
        "Current weather for a city",
        ToolParameters::object()
            .string("location", "City name", true)
            .build(),
        |args, _ctx| match args.get_str("location")? {
            "Paris" => Ok(json!("22C")),
            other => Ok(json!(format!("no data for {other}"))),
        },
    )
}

pub fn usage(input: u64, cached: u64, output: u64, reasoning: u64) -> Value {
    json!({
        "input_tokens": input,
        "input_tokens_details": {"cached_tokens": cached},
        "output_tokens": output,
        "output_tokens_details": {"reasoning_tokens": reasoning},
        "total_tokens": input + output
    })
}

// Non-streaming payloads.

pub fn text_response(text: &str) -> Value {
    json!({
        "id": "resp_text",
        "status": "completed",
        "output": [{
            "type": "message",
            "id": "msg_1",
            "role": "assistant",
            "content": [{"type": "output_text", "text": text, "annotations": []}]
        }],
        "usage": usage(10, 0, 5, 0)
    })
}

pub fn tool_call_response(call_id: &str, name: &str, arguments: Value) -> Value {
    json!({
        "id": "resp_tool",
        "status": "completed",
        "output": [{
            "type": "function_call",
            "id": format!("fc_{call_id}"),
            "call_id": call_id,
            "name": name,
            "arguments": arguments.to_string(),
            "status": "completed"
        }],
        "usage": usage(20, 5, 8, 3)
    })
}

// Streaming events.

pub fn created(id: &str) -> Value {
    json!({"type": "response.created", "response": {"id": id, "status": "in_progress"}})
}

pub fn completed(id: &str, usage: Value) -> Value {
    json!({"type": "response.completed", "response": {"id": id, "status": "completed", "usage": usage}})
}

pub fn text_turn(id: &str, chunks: &[&str]) -> Vec<Value> {
    let mut events = vec![created(id)];
    for chunk in chunks {
        events.push(json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": chunk}));
    }
    events.push(json!({
        "type": "response.output_text.done",
        "item_id": "msg_1",
        "text": chunks.concat()
    }));
    events.push(completed(id, usage(10, 0, 5, 0)));
    events
}

pub fn tool_turn(id: &str, call_id: &str, name: &str, fragments: &[&str]) -> Vec<Value> {
    let item_id = format!("fc_{call_id}");
    let mut events = vec![
        created(id),
        json!({
            "type": "response.output_item.added",
            "output_index": 0,
            "item": {"type": "function_call", "id": item_id, "call_id": call_id, "name": name, "arguments": ""}
        }),
    ];
    for fragment in fragments {
        events.push(json!({
            "type": "response.function_call_arguments.delta",
            "item_id": item_id,
            "delta": fragment
        }));
    }
    events.push(json!({
        "type": "response.function_call_arguments.done",
        "item_id": item_id,
        "arguments": fragments.concat()
    }));
    events.push(json!({
        "type": "response.output_item.done",
        "output_index": 0,
        "item": {
            "type": "function_call",
            "id": item_id,
            "call_id": call_id,
            "name": name,
            "arguments": fragments.concat()
        }
    }));
    events.push(completed(id, usage(20, 5, 8, 3)));
    events
}
