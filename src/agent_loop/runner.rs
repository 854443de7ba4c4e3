//! The agent loop: model turn, tool execution, repeat until the model
//! answers without requesting tools.
//!
//! The loop owns nothing shared. Each run gets its own history, item trace
//! and token ledger; the tool registry and adapter are only read.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::tooling;
use super::types::{RunId, RunMode, RunResult, RunState, RunStreamEvent};
use crate::error::{log_error, ErrorCode, Result, TesseraError};
use crate::provider::{
    AsyncTransport, ProviderAdapter, RawEventIter, RequestContext, RunInput, StreamNormalizer,
    Transport,
};
use crate::tools::{SchemaValidator, ToolRegistry};
use crate::types::{
    GenerationSettings, RunItem, StreamEvent, StreamEventKind, Timing, TokenUsage, ToolCallItem,
    ToolCallOutputItem, ToolChoice,
};
use crate::util::TokenLedger;

/// Stream of run events produced by an async streaming run.
pub type RunEventStream = BoxStream<'static, Result<RunStreamEvent>>;

/// Everything a run reads: adapter, tools and request parameters.
#[derive(Clone)]
pub(crate) struct AgentLoop {
    pub(crate) adapter: Arc<dyn ProviderAdapter>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) validator: Arc<dyn SchemaValidator>,
    pub(crate) model: String,
    pub(crate) settings: GenerationSettings,
    pub(crate) instructions: Option<String>,
    pub(crate) tool_choice: ToolChoice,
    pub(crate) parallel_tool_calls: bool,
    pub(crate) max_iterations: usize,
    /// Caller context handed to every tool call.
    pub(crate) runtime: Value,
}

/// Mutable state of one run.
struct Trace {
    run_id: RunId,
    history: Vec<Value>,
    items: Vec<RunItem>,
    ledger: TokenLedger,
    timing: Timing,
    iterations: usize,
    state: RunState,
}

/// Accumulated output of the streamed turn in progress.
#[derive(Default)]
struct TurnBuffer {
    text: String,
    saw_delta: bool,
    calls: Vec<ToolCallItem>,
}

struct StreamRun {
    trace: Trace,
    normalizer: Box<dyn StreamNormalizer>,
    turn: TurnBuffer,
    /// Assistant text across every turn.
    output: String,
    ended: bool,
    failed: bool,
}

enum TurnEnd {
    Tools(Vec<ToolCallItem>),
    Finished(Option<RunStreamEvent>),
}

impl AgentLoop {
    fn start(&self, input: RunInput, mode: RunMode) -> Result<Trace> {
        let history = self.adapter.normalize_input(input)?;
        let trace = Trace {
            run_id: Uuid::new_v4(),
            history,
            items: Vec::new(),
            ledger: TokenLedger::new(),
            timing: Timing::start(),
            iterations: 0,
            state: RunState::AwaitingModel,
        };
        tracing::debug!(
            run_id = %trace.run_id,
            mode = mode.as_str(),
            model = %self.model,
            tools = self.tools.len(),
            provider = self.adapter.provider_name(),
            "run started"
        );
        Ok(trace)
    }

    fn request(&self, history: &[Value], stream: bool) -> Result<Value> {
        let definitions = self.tools.definitions();
        let ctx = RequestContext {
            model: &self.model,
            settings: &self.settings,
            instructions: self.instructions.as_deref(),
            tools: &definitions,
            tool_choice: self.tool_choice,
            parallel_tool_calls: self.parallel_tool_calls,
            stream,
        };
        self.adapter.build_request(history, &ctx)
    }

    /// Count a model call, failing once the cap is spent.
    fn next_iteration(&self, trace: &mut Trace, mode: RunMode) -> Result<()> {
        if trace.iterations >= self.max_iterations {
            return Err(TesseraError::MaxIterations {
                max_iterations: self.max_iterations,
                mode: mode.as_str(),
            });
        }
        trace.iterations += 1;
        trace.state = RunState::AwaitingModel;
        tracing::debug!(
            run_id = %trace.run_id,
            iteration = trace.iterations,
            mode = mode.as_str(),
            "calling model"
        );
        Ok(())
    }

    /// Record a non-streaming response; returns its text and tool calls.
    fn absorb_response(&self, trace: &mut Trace, raw: &Value) -> Result<(String, Vec<ToolCallItem>)> {
        let parsed = self.adapter.parse_response(raw)?;
        if let Some(usage) = &parsed.raw_usage {
            trace.ledger.ingest(usage);
        }
        if !parsed.unrecognized.is_empty() {
            tracing::debug!(
                run_id = %trace.run_id,
                count = parsed.unrecognized.len(),
                "ignoring unrecognized output items"
            );
        }
        let text = parsed.output_text();
        let calls: Vec<ToolCallItem> = parsed.tool_calls().cloned().collect();
        trace.items.extend(parsed.items);
        if !calls.is_empty() {
            trace.history.extend(self.adapter.continuation_items(raw));
            trace.state = RunState::HasPendingToolCalls;
        }
        Ok((text, calls))
    }

    fn record_output(&self, trace: &mut Trace, output: ToolCallOutputItem) -> ToolCallOutputItem {
        trace.history.push(self.adapter.tool_output_item(&output));
        trace.items.push(RunItem::ToolCallOutput(output.clone()));
        output
    }

    fn finish(&self, mut trace: Trace, output: String) -> RunResult {
        trace.state = RunState::Done;
        let timing = trace.timing.finished();
        let token_usage = trace.ledger.snapshot();
        tracing::debug!(
            run_id = %trace.run_id,
            state = %trace.state,
            iterations = trace.iterations,
            items = trace.items.len(),
            usage_turns = trace.ledger.turns(),
            total_tokens = token_usage.resolved_total(),
            "run completed"
        );
        RunResult {
            run_id: trace.run_id,
            output,
            items: trace.items,
            token_usage,
            timing,
            iterations: trace.iterations,
        }
    }

    fn failed(&self, trace: &mut Trace, mode: RunMode, err: TesseraError) -> TesseraError {
        let state = std::mem::replace(&mut trace.state, RunState::Failed).to_string();
        let run_id = trace.run_id.to_string();
        log_error(
            &err,
            &[
                ("run_id", run_id.as_str()),
                ("mode", mode.as_str()),
                ("state", state.as_str()),
                ("provider", self.adapter.provider_name()),
            ],
        );
        err
    }

    // Non-streaming runs.

    pub(crate) fn run_blocking(&self, transport: &dyn Transport, input: RunInput) -> Result<RunResult> {
        let mode = RunMode::RunSync;
        let mut trace = self.start(input, mode)?;
        loop {
            let turn = self.blocking_turn(transport, &mut trace, mode);
            match turn {
                Ok(Some(output)) => return Ok(self.finish(trace, output)),
                Ok(None) => continue,
                Err(err) => return Err(self.failed(&mut trace, mode, err)),
            }
        }
    }

    /// One model call plus its tool executions; `Some(text)` when done.
    fn blocking_turn(
        &self,
        transport: &dyn Transport,
        trace: &mut Trace,
        mode: RunMode,
    ) -> Result<Option<String>> {
        self.next_iteration(trace, mode)?;
        let body = self.request(&trace.history, false)?;
        let raw = transport.send(&body)?;
        let (text, calls) = self.absorb_response(trace, &raw)?;
        if calls.is_empty() {
            return Ok(Some(text));
        }
        trace.state = RunState::ExecutingTools;
        for call in &calls {
            let output = tooling::execute_blocking(&self.tools, self.validator.as_ref(), call, &self.runtime)?;
            self.record_output(trace, output);
        }
        Ok(None)
    }

    pub(crate) async fn run(&self, transport: &dyn AsyncTransport, input: RunInput) -> Result<RunResult> {
        let mode = RunMode::RunAsync;
        let mut trace = self.start(input, mode)?;
        loop {
            let turn = self.async_turn(transport, &mut trace, mode).await;
            match turn {
                Ok(Some(output)) => return Ok(self.finish(trace, output)),
                Ok(None) => continue,
                Err(err) => return Err(self.failed(&mut trace, mode, err)),
            }
        }
    }

    async fn async_turn(
        &self,
        transport: &dyn AsyncTransport,
        trace: &mut Trace,
        mode: RunMode,
    ) -> Result<Option<String>> {
        self.next_iteration(trace, mode)?;
        let body = self.request(&trace.history, false)?;
        let raw = transport.send(&body).await?;
        let (text, calls) = self.absorb_response(trace, &raw)?;
        if calls.is_empty() {
            return Ok(Some(text));
        }
        trace.state = RunState::ExecutingTools;
        for call in &calls {
            let output = tooling::execute(&self.tools, self.validator.as_ref(), call, &self.runtime).await?;
            self.record_output(trace, output);
        }
        Ok(None)
    }

    // Streaming runs.

    fn start_stream(&self, input: RunInput, mode: RunMode) -> Result<StreamRun> {
        Ok(StreamRun {
            trace: self.start(input, mode)?,
            normalizer: self.adapter.new_stream_normalizer(),
            turn: TurnBuffer::default(),
            output: String::new(),
            ended: false,
            failed: false,
        })
    }

    fn open_turn(&self, run: &mut StreamRun, mode: RunMode) -> Result<Value> {
        self.next_iteration(&mut run.trace, mode)?;
        run.turn = TurnBuffer::default();
        self.request(&run.trace.history, true)
    }

    fn wrap(&self, run: &StreamRun, event: StreamEvent, token_usage: Option<TokenUsage>) -> RunStreamEvent {
        RunStreamEvent {
            output: run.output.clone(),
            event,
            token_usage,
            timing: run.trace.timing.finished(),
        }
    }

    /// Normalize one raw event and fold it into the run.
    fn observe(&self, run: &mut StreamRun, raw: Value) -> RunStreamEvent {
        let event = run.normalizer.process(raw);
        let token_usage = run.normalizer.take_usage().map(|usage| {
            run.trace.ledger.ingest(&usage);
            run.trace.ledger.snapshot()
        });

        match &event.kind {
            StreamEventKind::MessageOutputDelta { delta } => {
                run.turn.saw_delta = true;
                run.turn.text.push_str(delta);
                run.output.push_str(delta);
            }
            StreamEventKind::MessageOutputDone { output } if !run.turn.saw_delta => {
                run.turn.text.push_str(output);
                run.output.push_str(output);
            }
            StreamEventKind::ToolCallDone {
                call_id,
                name,
                arguments,
            } => {
                run.trace.state = RunState::HasPendingToolCalls;
                run.turn.calls.push(ToolCallItem {
                    id: event.id.clone(),
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                    raw: event.raw_event.clone().unwrap_or(Value::Null),
                });
            }
            StreamEventKind::StreamEnd => run.ended = true,
            StreamEventKind::StreamError { error, code } => {
                run.failed = true;
                run.trace.state = RunState::Failed;
                tracing::warn!(
                    run_id = %run.trace.run_id,
                    code = %code,
                    error = %error,
                    "stream reported an error"
                );
            }
            _ => {}
        }

        self.wrap(run, event, token_usage)
    }

    /// Turn a transport failure into the terminal in-band event.
    fn transport_failure(&self, run: &mut StreamRun, mode: RunMode, err: &TesseraError) -> RunStreamEvent {
        run.failed = true;
        run.trace.state = RunState::Failed;
        let run_id = run.trace.run_id.to_string();
        log_error(
            err,
            &[("run_id", run_id.as_str()), ("mode", mode.as_str())],
        );
        let event = run.normalizer.error_event(err);
        self.wrap(run, event, None)
    }

    /// Decide what follows a drained turn.
    fn close_turn(&self, run: &mut StreamRun) -> TurnEnd {
        if run.failed {
            return TurnEnd::Finished(None);
        }
        let calls = std::mem::take(&mut run.turn.calls);
        if !calls.is_empty() {
            let mut replay = run.normalizer.take_replay_items();
            replay.extend(
                self.adapter
                    .stream_continuation_items(&run.turn.text, &calls),
            );
            run.trace.history.extend(replay);
            run.trace.state = RunState::ExecutingTools;
            return TurnEnd::Tools(calls);
        }

        let pending = run.normalizer.pending_tool_calls();
        if pending > 0 {
            run.failed = true;
            run.trace.state = RunState::Failed;
            let event = StreamEvent::new(StreamEventKind::StreamError {
                error: format!("stream ended with {pending} incomplete tool call(s)"),
                code: ErrorCode::AgentParsingFailed,
            });
            return TurnEnd::Finished(Some(self.wrap(run, event, None)));
        }

        run.trace.state = RunState::Done;
        tracing::debug!(
            run_id = %run.trace.run_id,
            iterations = run.trace.iterations,
            usage_turns = run.trace.ledger.turns(),
            "stream run completed"
        );
        if run.ended {
            return TurnEnd::Finished(None);
        }
        // The provider closed the stream without a completion event.
        run.ended = true;
        let usage = run.trace.ledger.has_usage().then(|| run.trace.ledger.snapshot());
        let event = StreamEvent::new(StreamEventKind::StreamEnd).with_usage(usage);
        TurnEnd::Finished(Some(self.wrap(run, event, usage)))
    }

    fn tool_output_event(&self, run: &mut StreamRun, output: ToolCallOutputItem) -> RunStreamEvent {
        let output = self.record_output(&mut run.trace, output);
        let event = StreamEvent::new(StreamEventKind::ToolOutputDone {
            call_id: output.call_id.clone(),
            name: output.name.clone(),
            output: output.result,
            is_error: output.is_error,
        })
        .with_id(Some(output.call_id));
        self.wrap(run, event, None)
    }

    pub(crate) fn stream(
        self,
        transport: Arc<dyn AsyncTransport>,
        input: RunInput,
        cancel: CancellationToken,
    ) -> RunEventStream {
        let mode = RunMode::StreamAsync;
        let stream = async_stream::stream! {
            let mut run = match self.start_stream(input, mode) {
                Ok(run) => run,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            loop {
                if cancel.is_cancelled() {
                    tracing::debug!(run_id = %run.trace.run_id, "stream run cancelled");
                    return;
                }
                let body = match self.open_turn(&mut run, mode) {
                    Ok(body) => body,
                    Err(err) => {
                        yield Err(self.failed(&mut run.trace, mode, err));
                        return;
                    }
                };
                let mut events = match transport.open_stream(&body).await {
                    Ok(events) => events,
                    Err(err) => {
                        yield Ok(self.transport_failure(&mut run, mode, &err));
                        return;
                    }
                };

                while let Some(raw) = events.next().await {
                    if cancel.is_cancelled() {
                        tracing::debug!(run_id = %run.trace.run_id, "stream run cancelled");
                        return;
                    }
                    match raw {
                        Ok(raw) => {
                            yield Ok(self.observe(&mut run, raw));
                        }
                        Err(err) => {
                            yield Ok(self.transport_failure(&mut run, mode, &err));
                        }
                    }
                    if run.failed {
                        return;
                    }
                }

                match self.close_turn(&mut run) {
                    TurnEnd::Tools(calls) => {
                        for call in &calls {
                            let output = tooling::execute(
                                &self.tools,
                                self.validator.as_ref(),
                                call,
                                &self.runtime,
                            )
                            .await;
                            match output {
                                Ok(output) => {
                                    yield Ok(self.tool_output_event(&mut run, output));
                                }
                                Err(err) => {
                                    yield Err(self.failed(&mut run.trace, mode, err));
                                    return;
                                }
                            }
                        }
                    }
                    TurnEnd::Finished(event) => {
                        if let Some(event) = event {
                            yield Ok(event);
                        }
                        return;
                    }
                }
            }
        };
        Box::pin(stream)
    }

    pub(crate) fn stream_blocking(
        self,
        transport: Arc<dyn Transport>,
        input: RunInput,
    ) -> Result<BlockingRunStream> {
        let run = self.start_stream(input, RunMode::StreamSync)?;
        Ok(BlockingRunStream {
            agent_loop: self,
            transport,
            run: Some(run),
            events: None,
            queue: VecDeque::new(),
        })
    }
}

/// Iterator over the events of a blocking streaming run.
///
/// Each `next` call may block on the network or on a tool. The iterator
/// is finite and ends after `stream.end`, a `stream.error` event, or an
/// `Err` item.
pub struct BlockingRunStream {
    agent_loop: AgentLoop,
    transport: Arc<dyn Transport>,
    run: Option<StreamRun>,
    events: Option<RawEventIter>,
    queue: VecDeque<Result<RunStreamEvent>>,
}

impl std::fmt::Debug for BlockingRunStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingRunStream")
            .field("active", &self.run.is_some())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Iterator for BlockingRunStream {
    type Item = Result<RunStreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let mode = RunMode::StreamSync;
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Some(item);
            }
            let run = self.run.as_mut()?;

            if self.events.is_none() {
                let opened = self
                    .agent_loop
                    .open_turn(run, mode)
                    .map_err(|err| self.agent_loop.failed(&mut run.trace, mode, err));
                match opened.map(|body| self.transport.open_stream(&body)) {
                    Ok(Ok(events)) => self.events = Some(events),
                    Ok(Err(err)) => {
                        let event = self.agent_loop.transport_failure(run, mode, &err);
                        self.run = None;
                        return Some(Ok(event));
                    }
                    Err(err) => {
                        self.run = None;
                        return Some(Err(err));
                    }
                }
                continue;
            }

            let next = self.events.as_mut().and_then(|events| events.next());
            match next {
                Some(Ok(raw)) => {
                    let event = self.agent_loop.observe(run, raw);
                    if run.failed {
                        self.run = None;
                        self.events = None;
                    }
                    return Some(Ok(event));
                }
                Some(Err(err)) => {
                    let event = self.agent_loop.transport_failure(run, mode, &err);
                    self.run = None;
                    self.events = None;
                    return Some(Ok(event));
                }
                None => {
                    self.events = None;
                    match self.agent_loop.close_turn(run) {
                        TurnEnd::Tools(calls) => {
                            let mut stop = false;
                            for call in &calls {
                                let output = tooling::execute_blocking(
                                    &self.agent_loop.tools,
                                    self.agent_loop.validator.as_ref(),
                                    call,
                                    &self.agent_loop.runtime,
                                );
                                match output {
                                    Ok(output) => {
                                        let event = self.agent_loop.tool_output_event(run, output);
                                        self.queue.push_back(Ok(event));
                                    }
                                    Err(err) => {
                                        let err = self.agent_loop.failed(&mut run.trace, mode, err);
                                        self.queue.push_back(Err(err));
                                        stop = true;
                                        break;
                                    }
                                }
                            }
                            if stop {
                                self.run = None;
                            }
                        }
                        TurnEnd::Finished(event) => {
                            self.run = None;
                            return event.map(Ok);
                        }
                    }
                }
            }
        }
    }
}
