//! Tool descriptors with sync or async callables.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::arguments::ToolArguments;
use super::types::{ToolDefinition, ToolParameters};
use crate::error::{Result, TesseraError};

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    pub call_id: String,
    pub tool_name: String,
    /// Caller-supplied runtime context passed through the run unchanged.
    pub runtime: serde_json::Value,
}

pub type SyncToolFn =
    dyn Fn(ToolArguments, ToolExecutionContext) -> Result<serde_json::Value> + Send + Sync;

pub type AsyncToolFn = dyn Fn(ToolArguments, ToolExecutionContext) -> BoxFuture<'static, Result<serde_json::Value>>
    + Send
    + Sync;

/// The callable behind a tool, tagged with the execution modes it supports.
#[derive(Clone)]
pub enum ToolHandler {
    Sync(Arc<SyncToolFn>),
    Async(Arc<AsyncToolFn>),
}

/// A tool the model can call.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    parameters: ToolParameters,
    output_schema: Option<serde_json::Value>,
    strict: Option<bool>,
    handler: ToolHandler,
}

impl Tool {
    /// Create a tool from an async closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self::with_handler(
            name,
            description,
            parameters,
            ToolHandler::Async(Arc::new(move |args, ctx| Box::pin(handler(args, ctx)))),
        )
    }

    /// Create a tool from a blocking closure.
    ///
    /// Sync tools also run in async mode, on the blocking thread pool.
    pub fn new_sync<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Result<serde_json::Value>
            + Send
            + Sync
            + 'static,
    {
        Self::with_handler(name, description, parameters, ToolHandler::Sync(Arc::new(handler)))
    }

    fn with_handler(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            output_schema: None,
            strict: None,
            handler,
        }
    }

    /// Validate successful outputs against this schema.
    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    pub fn output_schema(&self) -> Option<&serde_json::Value> {
        self.output_schema.as_ref()
    }

    pub fn is_async(&self) -> bool {
        matches!(self.handler, ToolHandler::Async(_))
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.schema.clone(),
            strict: self.strict,
        }
    }

    /// Run the tool on the current thread.
    ///
    /// Async-only tools cannot run here and fail with a tool execution error.
    pub fn call_blocking(
        &self,
        args: ToolArguments,
        ctx: ToolExecutionContext,
    ) -> Result<serde_json::Value> {
        match &self.handler {
            ToolHandler::Sync(f) => catch_unwind(AssertUnwindSafe(|| f(args, ctx)))
                .unwrap_or_else(|panic| Err(self.panicked(panic))),
            ToolHandler::Async(_) => Err(TesseraError::ToolExecution {
                tool_name: self.name.clone(),
                message: format!("tool '{}' has no synchronous implementation", self.name),
            }),
        }
    }

    /// Run the tool from async code.
    pub async fn call(
        &self,
        args: ToolArguments,
        ctx: ToolExecutionContext,
    ) -> Result<serde_json::Value> {
        match &self.handler {
            ToolHandler::Async(f) => AssertUnwindSafe(f(args, ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(self.panicked(panic))),
            ToolHandler::Sync(f) => {
                let f = Arc::clone(f);
                match tokio::task::spawn_blocking(move || f(args, ctx)).await {
                    Ok(result) => result,
                    Err(join) if join.is_panic() => Err(self.panicked(join.into_panic())),
                    Err(join) => Err(TesseraError::execution(format!(
                        "blocking task for tool '{}' did not complete: {join}",
                        self.name
                    ))
                    .with_context("tool", self.name.clone())),
                }
            }
        }
    }

    fn panicked(&self, payload: Box<dyn Any + Send>) -> TesseraError {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "tool panicked".to_string());
        TesseraError::ToolExecution {
            tool_name: self.name.clone(),
            message,
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("is_async", &self.is_async())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_sync() -> Tool {
        Tool::new_sync("echo", "Echo input", ToolParameters::empty(), |args, _ctx| {
            Ok(args.into_value())
        })
    }

    fn echo_async() -> Tool {
        Tool::new("echo", "Echo input", ToolParameters::empty(), |args, _ctx| async move {
            Ok(args.into_value())
        })
    }

    #[test]
    fn sync_tool_runs_blocking() {
        let out = echo_sync()
            .call_blocking(ToolArguments::new(json!({"x": 1})), Default::default())
            .unwrap();
        assert_eq!(out, json!({"x": 1}));
    }

    #[test]
    fn async_tool_rejects_blocking_call() {
        let err = echo_async()
            .call_blocking(ToolArguments::new(json!({})), Default::default())
            .unwrap_err();
        assert!(err.to_string().contains("has no synchronous implementation"));
    }

    #[tokio::test]
    async fn sync_tool_runs_from_async() {
        let out = echo_sync()
            .call(ToolArguments::new(json!({"y": 2})), Default::default())
            .await
            .unwrap();
        assert_eq!(out, json!({"y": 2}));
    }

    #[tokio::test]
    async fn panics_become_tool_errors() {
        let tool = Tool::new_sync("boom", "Panics", ToolParameters::empty(), |_, _| {
            panic!("kaboom")
        });
        let err = tool
            .call(ToolArguments::new(json!({})), Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TesseraError::ToolExecution { .. }));
        assert!(err.to_string().contains("kaboom"));
    }

    #[test]
    fn definition_carries_strict_flag() {
        let def = echo_sync().with_strict(true).definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.strict, Some(true));
        assert_eq!(def.parameters["additionalProperties"], false);
    }
}
