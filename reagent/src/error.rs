//! Error types for the reagent core.
//!
//! Errors fall into two families: those that are reified into observations
//! and keep the reasoning loop alive (tool and interpreter failures), and
//! those that terminate the run (configuration, authentication, exhausted
//! resilience). See [`AgentError::is_recoverable`].

use serde_json::Value;
use thiserror::Error;

/// A type alias for `Result<T, AgentError>`.
pub type Result<T> = std::result::Result<T, AgentError>;

/// The main error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Invalid configuration, rejected at construction time.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration issue.
        message: String,
    },

    /// The model returned structurally malformed output.
    #[error("model returned malformed output: {message}")]
    Generation {
        /// Description of what was malformed.
        message: String,
    },

    /// Model output could not be parsed into an action.
    #[error("parsing error: {message}")]
    Parsing {
        /// The raw output that failed to parse.
        output: String,
        /// The parsing error message.
        message: String,
    },

    /// A tool invocation failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The code-action sandbox violated one of its limits.
    #[error("interpreter error: {reason}")]
    Interpreter {
        /// Which limit or rule was violated.
        reason: String,
    },

    /// The model provider call failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The prompt sanitizer matched an injection pattern.
    #[error("prompt injection detected: matched pattern {pattern:?}")]
    PromptInjection {
        /// The pattern that matched.
        pattern: String,
    },

    /// The step budget was exhausted.
    #[error("reached maximum steps ({steps}/{max_steps})")]
    MaxSteps {
        /// Number of steps taken.
        steps: usize,
        /// Maximum allowed steps.
        max_steps: usize,
    },

    /// A wall-clock deadline expired.
    #[error("deadline exceeded after {elapsed_secs:.1}s")]
    Timeout {
        /// Seconds elapsed when the deadline fired.
        elapsed_secs: f64,
    },

    /// The orchestrator refused to spawn a sub-agent.
    #[error("spawn rejected: {reason}")]
    Spawn {
        /// Why the spawn was refused.
        reason: String,
    },

    /// A control request was issued with no parent attached.
    #[error("environment error: {reason}")]
    Environment {
        /// What the environment was missing.
        reason: String,
    },

    /// A circuit breaker is open and the call failed fast.
    #[error("service '{key}' unavailable: circuit open")]
    ServiceUnavailable {
        /// Model id or tool name the circuit guards.
        key: String,
    },

    /// A callback was registered for an unknown event name.
    #[error("invalid callback: unknown event {name:?}")]
    InvalidCallback {
        /// The event name that failed to resolve.
        name: String,
    },

    /// Execution was interrupted by the caller.
    #[error("agent execution was interrupted")]
    Interrupted,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Create a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new generation error.
    #[must_use]
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a new parsing error.
    #[must_use]
    pub fn parsing(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parsing {
            output: output.into(),
            message: message.into(),
        }
    }

    /// Create a new interpreter error.
    #[must_use]
    pub fn interpreter(reason: impl Into<String>) -> Self {
        Self::Interpreter {
            reason: reason.into(),
        }
    }

    /// Create a new spawn error.
    #[must_use]
    pub fn spawn(reason: impl Into<String>) -> Self {
        Self::Spawn {
            reason: reason.into(),
        }
    }

    /// Create a new environment error.
    #[must_use]
    pub fn environment(reason: impl Into<String>) -> Self {
        Self::Environment {
            reason: reason.into(),
        }
    }

    /// Stable kind tag for event payloads and logs.
    #[must_use]
    pub const fn class_name(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Generation { .. } => "generation",
            Self::Parsing { .. } => "parsing",
            Self::Tool(_) => "tool_execution",
            Self::Interpreter { .. } => "interpreter",
            Self::Model(_) => "model",
            Self::PromptInjection { .. } => "prompt_injection",
            Self::MaxSteps { .. } => "max_steps_reached",
            Self::Timeout { .. } => "timeout",
            Self::Spawn { .. } => "spawn",
            Self::Environment { .. } => "environment",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::InvalidCallback { .. } => "invalid_callback",
            Self::Interrupted => "interrupted",
            Self::Json(_) => "json",
        }
    }

    /// Whether the reasoning loop can observe this error and keep going.
    ///
    /// Tool, interpreter, and parsing errors become observations; everything
    /// else unwinds into the run's outcome.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Tool(_) | Self::Interpreter { .. } | Self::Parsing { .. }
        )
    }
}

/// Errors raised by tool resolution and invocation.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// No tool registered under the requested name.
    #[error("tool '{0}' not found")]
    NotFound(String),

    /// A required argument was absent.
    #[error("missing required argument '{argument}' for tool '{tool_name}'")]
    MissingArgument {
        /// The tool being invoked.
        tool_name: String,
        /// The missing parameter name.
        argument: String,
    },

    /// Arguments did not match the tool's input schema.
    #[error("invalid arguments for tool '{tool_name}': {message}")]
    InvalidArguments {
        /// The tool being invoked.
        tool_name: String,
        /// What was wrong with the arguments.
        message: String,
    },

    /// The tool itself raised during execution.
    #[error("tool '{tool_name}' failed: {message}")]
    Execution {
        /// The tool that failed.
        tool_name: String,
        /// The arguments it was called with.
        arguments: Value,
        /// The underlying error message.
        message: String,
    },

    /// The tool (or its backing service) signalled a rate limit.
    #[error("rate limited: retry after {retry_after_secs}s ({message})")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: f64,
        /// The underlying error message.
        message: String,
    },

    /// The tool needed a parent/environment facility that is not attached.
    #[error("environment error: {0}")]
    Environment(String),
}

impl ToolError {
    /// Create a new execution error.
    #[must_use]
    pub fn execution(
        tool_name: impl Into<String>,
        arguments: Value,
        message: impl Into<String>,
    ) -> Self {
        Self::Execution {
            tool_name: tool_name.into(),
            arguments,
            message: message.into(),
        }
    }
}

/// Error from a model provider call, carrying enough detail for the
/// resilience layer to classify it (HTTP status, message, retry-after).
#[derive(Debug, Clone, Error)]
#[error("model '{model_id}' request failed: {message}")]
pub struct ModelError {
    /// The model that failed.
    pub model_id: String,
    /// The underlying error message.
    pub message: String,
    /// HTTP status code, when the transport exposed one.
    pub status: Option<u16>,
    /// Server-suggested retry delay in seconds, when present.
    pub retry_after_secs: Option<f64>,
}

impl ModelError {
    /// Create a new model error.
    #[must_use]
    pub fn new(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            message: message.into(),
            status: None,
            retry_after_secs: None,
        }
    }

    /// Attach an HTTP status code.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a retry-after hint in seconds.
    #[must_use]
    pub const fn with_retry_after(mut self, secs: f64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}
