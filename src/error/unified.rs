//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Machine-stable error code.
///
/// The string form is part of the public contract and safe to match on
/// in logs and telemetry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
pub enum ErrorCode {
    #[serde(rename = "unknown")]
    #[strum(serialize = "unknown")]
    Unknown,
    #[serde(rename = "agent.input.invalid")]
    #[strum(serialize = "agent.input.invalid")]
    AgentInputInvalid,
    #[serde(rename = "agent.serialization.failed")]
    #[strum(serialize = "agent.serialization.failed")]
    AgentSerializationFailed,
    #[serde(rename = "agent.parsing.failed")]
    #[strum(serialize = "agent.parsing.failed")]
    AgentParsingFailed,
    #[serde(rename = "agent.execution.failed")]
    #[strum(serialize = "agent.execution.failed")]
    AgentExecutionFailed,
    #[serde(rename = "agent.max_iterations")]
    #[strum(serialize = "agent.max_iterations")]
    AgentMaxIterations,
    #[serde(rename = "tool.call.invalid")]
    #[strum(serialize = "tool.call.invalid")]
    ToolCallInvalid,
    #[serde(rename = "tool.execution.failed")]
    #[strum(serialize = "tool.execution.failed")]
    ToolExecutionFailed,
    #[serde(rename = "api.connection.failed")]
    #[strum(serialize = "api.connection.failed")]
    ApiConnectionFailed,
    #[serde(rename = "api.status.error")]
    #[strum(serialize = "api.status.error")]
    ApiStatusError,
    #[serde(rename = "api.invalid_request")]
    #[strum(serialize = "api.invalid_request")]
    ApiInvalidRequest,
    #[serde(rename = "api.auth.failed")]
    #[strum(serialize = "api.auth.failed")]
    ApiAuthFailed,
    #[serde(rename = "api.rate_limited")]
    #[strum(serialize = "api.rate_limited")]
    ApiRateLimited,
    #[serde(rename = "config.invalid")]
    #[strum(serialize = "config.invalid")]
    ConfigInvalid,
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Parsing,
    ToolBoundary,
    LoopSafety,
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    FixInput,
    RaiseIterationLimit,
    CheckToolImplementation,
    ContactSupport,
}
