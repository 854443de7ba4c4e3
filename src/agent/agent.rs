//! Agent configuration and run entry points.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::client::ModelClient;
use crate::agent_loop::{AgentLoop, BlockingRunStream, RunEventStream, RunResult};
use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::error::{Result, TesseraError};
use crate::provider::RunInput;
use crate::tools::{BasicSchemaValidator, SchemaValidator, Tool, ToolRegistry};
use crate::types::{GenerationSettings, ToolChoice};

/// An agent: a model client, instructions and tools, run to completion
/// by the agent loop.
///
/// Agents hold no per-run state and can run concurrently; each run owns
/// its own history and token ledger.
#[derive(Clone)]
pub struct Agent {
    name: String,
    description: Option<String>,
    client: ModelClient,
    system_instruction: Option<String>,
    tools: Arc<ToolRegistry>,
    tool_choice: ToolChoice,
    parallel_tool_calls: bool,
    max_iterations: usize,
    settings: GenerationSettings,
    validator: Arc<dyn SchemaValidator>,
}

impl Agent {
    pub fn new(client: ModelClient) -> Self {
        Self {
            name: "agent".to_string(),
            description: None,
            client,
            system_instruction: None,
            tools: Arc::new(ToolRegistry::new()),
            tool_choice: ToolChoice::default(),
            parallel_tool_calls: true,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            settings: GenerationSettings::default(),
            validator: Arc::new(BasicSchemaValidator),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the system instruction sent with every request.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Register a tool; duplicate names are rejected.
    pub fn with_tool(mut self, tool: Tool) -> Result<Self> {
        Arc::make_mut(&mut self.tools).register(tool)?;
        Ok(self)
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    /// Cap on model calls per run; must be at least 1.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the validator used for tool inputs and outputs.
    pub fn with_validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn client(&self) -> &ModelClient {
        &self.client
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Model used for requests: the settings override, else the client default.
    pub fn model(&self) -> &str {
        self.settings
            .model
            .as_deref()
            .unwrap_or_else(|| self.client.model())
    }

    /// Check the configuration; every run entry point calls this first.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations < 1 {
            return Err(TesseraError::input("max_iterations must be >= 1")
                .with_context("agent", self.name.clone()));
        }
        if self.model().is_empty() {
            return Err(TesseraError::Configuration(format!(
                "agent '{}' has no model configured",
                self.name
            )));
        }
        Ok(())
    }

    fn agent_loop(&self, runtime: Value) -> Result<AgentLoop> {
        self.validate()?;
        Ok(AgentLoop {
            adapter: Arc::clone(self.client.adapter()),
            tools: Arc::clone(&self.tools),
            validator: Arc::clone(&self.validator),
            model: self.model().to_string(),
            settings: self.settings.clone(),
            instructions: self.system_instruction.clone(),
            tool_choice: self.tool_choice,
            parallel_tool_calls: self.parallel_tool_calls,
            max_iterations: self.max_iterations,
            runtime,
        })
    }

    /// Run to completion on the caller's async runtime.
    pub async fn run(&self, input: impl Into<RunInput>) -> Result<RunResult> {
        self.run_with_context(input, Value::Null).await
    }

    /// [`Agent::run`] with a runtime context handed to every tool call.
    pub async fn run_with_context(
        &self,
        input: impl Into<RunInput>,
        runtime: Value,
    ) -> Result<RunResult> {
        let agent_loop = self.agent_loop(runtime)?;
        let transport = self.client.async_transport()?;
        agent_loop.run(transport.as_ref(), input.into()).await
    }

    /// Run to completion on the calling thread.
    pub fn run_blocking(&self, input: impl Into<RunInput>) -> Result<RunResult> {
        self.run_blocking_with_context(input, Value::Null)
    }

    pub fn run_blocking_with_context(
        &self,
        input: impl Into<RunInput>,
        runtime: Value,
    ) -> Result<RunResult> {
        let agent_loop = self.agent_loop(runtime)?;
        let transport = self.client.transport()?;
        agent_loop.run_blocking(transport.as_ref(), input.into())
    }

    /// Stream a run as normalized events.
    pub fn stream(&self, input: impl Into<RunInput>) -> Result<RunEventStream> {
        self.stream_with_context(input, Value::Null, CancellationToken::new())
    }

    /// [`Agent::stream`] with a runtime context and a cancellation token.
    ///
    /// Cancelling stops the run before its next network turn or raw event.
    pub fn stream_with_context(
        &self,
        input: impl Into<RunInput>,
        runtime: Value,
        cancel: CancellationToken,
    ) -> Result<RunEventStream> {
        let agent_loop = self.agent_loop(runtime)?;
        let transport = self.client.async_transport()?;
        Ok(agent_loop.stream(transport, input.into(), cancel))
    }

    /// Stream a run from blocking code.
    pub fn stream_blocking(&self, input: impl Into<RunInput>) -> Result<BlockingRunStream> {
        self.stream_blocking_with_context(input, Value::Null)
    }

    pub fn stream_blocking_with_context(
        &self,
        input: impl Into<RunInput>,
        runtime: Value,
    ) -> Result<BlockingRunStream> {
        let agent_loop = self.agent_loop(runtime)?;
        let transport = self.client.transport()?;
        agent_loop.stream_blocking(transport, input.into())
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("client", &self.client)
            .field("tools", &self.tools.len())
            .field("tool_choice", &self.tool_choice)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "openai"))]
mod tests {
    use super::*;
    use crate::provider::openai::OpenAiResponsesAdapter;
    use crate::tools::ToolParameters;

    fn agent() -> Agent {
        Agent::new(ModelClient::new(OpenAiResponsesAdapter::new(), "gpt-5-nano"))
    }

    #[test]
    fn defaults() {
        let agent = agent();
        assert_eq!(agent.max_iterations(), 20);
        assert_eq!(agent.model(), "gpt-5-nano");
        assert!(agent.tools().is_empty());
        assert!(agent.validate().is_ok());
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let err = agent().with_max_iterations(0).validate().unwrap_err();
        assert_eq!(err.code().to_string(), "agent.input.invalid");
        assert!(agent()
            .with_max_iterations(0)
            .run_blocking("ping")
            .is_err());
    }

    #[test]
    fn settings_model_overrides_client_model() {
        let agent = agent().with_settings(GenerationSettings::builder().model("gpt-5").build());
        assert_eq!(agent.model(), "gpt-5");
    }

    #[test]
    fn duplicate_tools_are_rejected() {
        let tool = || Tool::new_sync("t", "t", ToolParameters::empty(), |_, _| Ok(Value::Null));
        let result = agent().with_tool(tool()).unwrap().with_tool(tool());
        assert!(result.is_err());
    }

    #[test]
    fn missing_transport_fails_before_any_call() {
        let err = agent().run_blocking("ping").unwrap_err();
        assert!(matches!(err, TesseraError::Configuration(_)));
    }
}
