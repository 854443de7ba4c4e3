//! Per-call tool handling: lookup, argument validation, execution and
//! conversion of the outcome into a tool output item.
//!
//! Only an unregistered tool name is a hard failure. Everything else that
//! goes wrong for a known call id is turned into an error-flagged output
//! the model can read and react to.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, TesseraError};
use crate::provider::format::tool_result_to_string;
use crate::tools::{SchemaValidator, Tool, ToolArguments, ToolExecutionContext, ToolRegistry};
use crate::types::{ToolCallItem, ToolCallOutputItem};

/// What to do with one requested call.
pub(crate) enum Dispatch {
    Execute {
        tool: Arc<Tool>,
        args: ToolArguments,
        ctx: ToolExecutionContext,
    },
    /// Arguments were rejected before execution.
    Rejected(ToolCallOutputItem),
}

/// Resolve and validate a call against the registry.
pub(crate) fn dispatch(
    tools: &ToolRegistry,
    validator: &dyn SchemaValidator,
    call: &ToolCallItem,
    runtime: &Value,
) -> Result<Dispatch> {
    let tool = tools.get(&call.name).ok_or_else(|| TesseraError::ToolCall {
        tool_name: call.name.clone(),
        message: format!("tool '{}' is not registered", call.name),
    })?;

    if !call.arguments.is_object() {
        return Ok(Dispatch::Rejected(error_output(
            call,
            &format!("arguments are not a JSON object: {}", call.arguments),
        )));
    }
    if let Err(cause) = validator.validate(&call.arguments, &tool.parameters().schema) {
        return Ok(Dispatch::Rejected(error_output(
            call,
            &format!("invalid arguments: {cause}"),
        )));
    }

    Ok(Dispatch::Execute {
        tool: Arc::clone(tool),
        args: ToolArguments::new(call.arguments.clone()),
        ctx: ToolExecutionContext {
            call_id: call.call_id.clone(),
            tool_name: call.name.clone(),
            runtime: runtime.clone(),
        },
    })
}

/// Turn a callable's outcome into an output item.
///
/// `Execution` errors come from the executor, not the tool, and fail the run.
pub(crate) fn complete(
    tool: &Tool,
    validator: &dyn SchemaValidator,
    call: &ToolCallItem,
    outcome: Result<Value>,
) -> Result<ToolCallOutputItem> {
    let value = match outcome {
        Ok(value) => value,
        Err(err @ TesseraError::Execution { .. }) => return Err(err),
        Err(err) => return Ok(error_output(call, &fault_message(&err))),
    };
    if let Some(schema) = tool.output_schema() {
        if let Err(cause) = validator.validate(&value, schema) {
            return Ok(error_output(call, &format!("output failed validation: {cause}")));
        }
    }
    Ok(ToolCallOutputItem {
        call_id: call.call_id.clone(),
        name: call.name.clone(),
        result: tool_result_to_string(&value),
        is_error: false,
        raw: value,
    })
}

/// Run one call on the current thread.
pub(crate) fn execute_blocking(
    tools: &ToolRegistry,
    validator: &dyn SchemaValidator,
    call: &ToolCallItem,
    runtime: &Value,
) -> Result<ToolCallOutputItem> {
    let output = match dispatch(tools, validator, call, runtime)? {
        Dispatch::Rejected(output) => output,
        Dispatch::Execute { tool, args, ctx } => {
            let outcome = tool.call_blocking(args, ctx);
            complete(&tool, validator, call, outcome)?
        }
    };
    log_output(&output);
    Ok(output)
}

/// Run one call from async code.
pub(crate) async fn execute(
    tools: &ToolRegistry,
    validator: &dyn SchemaValidator,
    call: &ToolCallItem,
    runtime: &Value,
) -> Result<ToolCallOutputItem> {
    let output = match dispatch(tools, validator, call, runtime)? {
        Dispatch::Rejected(output) => output,
        Dispatch::Execute { tool, args, ctx } => {
            let outcome = tool.call(args, ctx).await;
            complete(&tool, validator, call, outcome)?
        }
    };
    log_output(&output);
    Ok(output)
}

fn error_output(call: &ToolCallItem, message: &str) -> ToolCallOutputItem {
    let result = format!("Error executing tool '{}': {message}", call.name);
    ToolCallOutputItem {
        call_id: call.call_id.clone(),
        name: call.name.clone(),
        raw: Value::String(result.clone()),
        result,
        is_error: true,
    }
}

fn fault_message(err: &TesseraError) -> String {
    match err {
        TesseraError::ToolExecution { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn log_output(output: &ToolCallOutputItem) {
    if output.is_error {
        tracing::warn!(
            tool = %output.name,
            call_id = %output.call_id,
            error = %output.result,
            "tool call failed; returning error output to model"
        );
    } else {
        tracing::debug!(tool = %output.name, call_id = %output.call_id, "tool call completed");
    }
}
