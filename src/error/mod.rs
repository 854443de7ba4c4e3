//! Error types for tessera.

pub mod unified;

pub use unified::{ErrorCategory, ErrorCode, RecoverySuggestion};

use std::collections::BTreeMap;

use thiserror::Error;

/// Free-form key/value context attached to an error.
pub type ErrorContext = BTreeMap<String, String>;

/// Primary error type for all tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("Invalid input: {message}")]
    Input {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        context: ErrorContext,
    },

    #[error("Tool output references call id '{call_id}' with no preceding tool call")]
    OrphanToolOutput { call_id: String },

    #[error("Parsing error: {message}")]
    Parsing {
        message: String,
        raw: Option<serde_json::Value>,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Invalid tool call: {tool_name} - {message}")]
    ToolCall { tool_name: String, message: String },

    #[error("Tool execution error: {tool_name} - {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Agent exceeded max iterations ({max_iterations}) without completing")]
    MaxIterations {
        max_iterations: usize,
        mode: &'static str,
    },

    #[error("Execution error: {message}")]
    Execution {
        message: String,
        context: ErrorContext,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TesseraError {
    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a parsing error carrying the offending payload.
    pub fn parsing(message: impl Into<String>, raw: Option<serde_json::Value>) -> Self {
        Self::Parsing {
            message: message.into(),
            raw,
            source: None,
        }
    }

    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            context: ErrorContext::new(),
            source: None,
        }
    }

    /// Attach a context entry. Variants without a context map ignore it.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Input { context, .. }
            | Self::Serialization { context, .. }
            | Self::Execution { context, .. } => {
                context.insert(key.into(), value.into());
            }
            _ => {}
        }
        self
    }

    /// Machine-stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Input { .. } => ErrorCode::AgentInputInvalid,
            Self::Serialization { .. } | Self::OrphanToolOutput { .. } => {
                ErrorCode::AgentSerializationFailed
            }
            Self::Parsing { .. } | Self::Json(_) => ErrorCode::AgentParsingFailed,
            Self::ToolCall { .. } => ErrorCode::ToolCallInvalid,
            Self::ToolExecution { .. } => ErrorCode::ToolExecutionFailed,
            Self::MaxIterations { .. } => ErrorCode::AgentMaxIterations,
            Self::Execution { .. } | Self::Stream(_) => ErrorCode::AgentExecutionFailed,
            Self::Configuration(_) => ErrorCode::ConfigInvalid,
            Self::Authentication(_) => ErrorCode::ApiAuthFailed,
            Self::RateLimited { .. } => ErrorCode::ApiRateLimited,
            Self::InvalidRequest(_) => ErrorCode::ApiInvalidRequest,
            Self::Api { .. } => ErrorCode::ApiStatusError,
            Self::Network(_) | Self::Connection(_) | Self::Timeout(_) => {
                ErrorCode::ApiConnectionFailed
            }
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Input { .. } | Self::Serialization { .. } | Self::OrphanToolOutput { .. } => {
                ErrorCategory::Input
            }
            Self::Parsing { .. } | Self::Json(_) => ErrorCategory::Parsing,
            Self::ToolCall { .. } | Self::ToolExecution { .. } => ErrorCategory::ToolBoundary,
            Self::MaxIterations { .. } => ErrorCategory::LoopSafety,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Connection(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::InvalidRequest(_) => ErrorCategory::Api,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Execution { .. } | Self::Stream(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Server faults are left to the caller's discretion and report `false`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Timeout
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit | ErrorCategory::Network => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Input => RecoverySuggestion::FixInput,
            ErrorCategory::LoopSafety => RecoverySuggestion::RaiseIterationLimit,
            ErrorCategory::ToolBoundary => RecoverySuggestion::CheckToolImplementation,
            _ => RecoverySuggestion::ContactSupport,
        }
    }

    /// Structured context for logs, including variant-specific fields.
    pub fn context(&self) -> ErrorContext {
        let mut context = match self {
            Self::Input { context, .. }
            | Self::Serialization { context, .. }
            | Self::Execution { context, .. } => context.clone(),
            _ => ErrorContext::new(),
        };
        match self {
            Self::OrphanToolOutput { call_id } => {
                context.insert("call_id".into(), call_id.clone());
            }
            Self::ToolCall { tool_name, .. } | Self::ToolExecution { tool_name, .. } => {
                context.insert("tool_name".into(), tool_name.clone());
            }
            Self::MaxIterations {
                max_iterations,
                mode,
            } => {
                context.insert("max_iterations".into(), max_iterations.to_string());
                context.insert("mode".into(), (*mode).to_string());
            }
            Self::Api { status, .. } => {
                context.insert("status".into(), status.to_string());
            }
            _ => {}
        }
        context
    }
}

/// Emit one structured log record for an error.
///
/// Retryable errors log at `warn`, everything else at `error`.
pub fn log_error(err: &TesseraError, extra: &[(&str, &str)]) {
    let mut context = err.context();
    for (key, value) in extra {
        context.insert((*key).to_string(), (*value).to_string());
    }
    let code: &'static str = err.code().into();
    let source = std::error::Error::source(err).map(|s| s.to_string());
    if err.is_retryable() {
        tracing::warn!(
            code,
            retryable = true,
            category = ?err.category(),
            context = ?context,
            cause = ?source,
            "{err}"
        );
    } else {
        tracing::error!(
            code,
            retryable = false,
            category = ?err.category(),
            context = ?context,
            cause = ?source,
            "{err}"
        );
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TesseraError>;
