//! Tool registry and the invocation pipeline.
//!
//! The registry maps names to tools and owns the full invocation contract:
//! argument validation against the input schema, event emission, rate-limit
//! and transient-error retry, and rendering of token-bounded observations.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ToolError;
use crate::event::{EventBus, EventKind};
use crate::resilience::{ErrorCategory, RetryPolicy};
use crate::sanitize::{OBSERVATION_WITHHELD, Sanitizer, SanitizerMode};

use super::{BoxedTool, DynTool, FINAL_ANSWER_TOOL, Tool, ToolDefinition, WEB_SEARCH_ALIAS};

/// Marker appended to truncated observations.
pub(crate) const TRUNCATION_MARKER: &str = "... [output truncated]";

/// Result of one tool invocation through the registry.
#[derive(Debug)]
pub struct ToolInvocation {
    /// Correlation id for the invocation's events.
    pub request_id: String,
    /// The tool name as requested by the model.
    pub tool_name: String,
    /// The raw result, or the error that was reified.
    pub result: Result<Value, ToolError>,
    /// The rendered, token-bounded observation.
    pub observation: String,
    /// Whether the tool was `final_answer`.
    pub is_final: bool,
    /// Injection pattern matched in the output, when the sanitizer fired.
    pub injection_pattern: Option<String>,
}

/// A collection of tools addressable by name.
pub struct ToolRegistry {
    tools: HashMap<String, BoxedTool>,
    preferred_search: Option<String>,
    max_observation_len: usize,
    retry: RetryPolicy,
    sanitizer: Sanitizer,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: HashMap::new(),
            preferred_search: None,
            max_observation_len: 4000,
            retry: RetryPolicy::default(),
            sanitizer: Sanitizer::default(),
        }
    }
}

impl ToolRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a typed tool.
    pub fn add<T: Tool + 'static>(&mut self, tool: T)
    where
        T::Output: 'static,
    {
        self.tools.insert(Tool::name(&tool).to_owned(), Box::new(tool));
    }

    /// Add a boxed tool.
    pub fn add_boxed(&mut self, tool: BoxedTool) {
        self.tools.insert(DynTool::name(&*tool).to_owned(), tool);
    }

    /// Set the provider the `web_search` alias resolves to.
    pub fn set_preferred_search(&mut self, provider: impl Into<String>) {
        self.preferred_search = Some(provider.into());
    }

    /// Set the observation length bound.
    pub fn set_max_observation_len(&mut self, len: usize) {
        self.max_observation_len = len.max(TRUNCATION_MARKER.len() + 1);
    }

    /// Set the retry policy applied to tool calls.
    pub fn set_retry(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Set the sanitizer applied to observations before they enter events.
    pub fn set_sanitizer(&mut self, sanitizer: Sanitizer) {
        self.sanitizer = sanitizer;
    }

    /// Get a tool by name, resolving the `web_search` alias.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&BoxedTool> {
        if let Some(tool) = self.tools.get(name) {
            return Some(tool);
        }
        if name == WEB_SEARCH_ALIAS
            && let Some(preferred) = &self.preferred_search
        {
            return self.tools.get(preferred);
        }
        None
    }

    /// Whether a tool with this name (or alias resolution) exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// All tool definitions.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Names of all registered tools.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.values().map(|t| t.name()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool through the full pipeline: validate, emit
    /// `ToolCallRequested`, call with retry, render the observation, emit
    /// `ToolCallCompleted` (or `ErrorOccurred` with the same request id).
    ///
    /// Errors are reified into the returned invocation; they never unwind.
    pub async fn invoke(&self, name: &str, args: Value, bus: &EventBus) -> ToolInvocation {
        let request_id = Uuid::new_v4().to_string();
        let is_final = name == FINAL_ANSWER_TOOL;

        let Some(tool) = self.resolve(name) else {
            warn!(tool = %name, "Tool not found");
            let err = ToolError::NotFound(name.to_owned());
            return self.fail(request_id, name, err, is_final, bus, false);
        };

        if let Err(err) = Self::validate_args(&tool.definition(), &args, name) {
            // Validation precedes ToolCallRequested, so no pairing event is owed.
            return self.fail(request_id, name, err, is_final, bus, false);
        }

        bus.emit(EventKind::ToolCallRequested {
            tool_name: name.to_owned(),
            arguments: args.clone(),
            request_id: request_id.clone(),
        });

        let result = self.call_with_retry(&**tool, name, &args, bus).await;

        match result {
            Ok(value) => {
                let (observation, injection_pattern) = self.render_observation(&value);
                bus.emit(EventKind::ToolCallCompleted {
                    request_id: request_id.clone(),
                    tool_name: name.to_owned(),
                    result: Some(value.clone()),
                    observation: observation.clone(),
                    is_final,
                });
                ToolInvocation {
                    request_id,
                    tool_name: name.to_owned(),
                    result: Ok(value),
                    observation,
                    is_final,
                    injection_pattern,
                }
            }
            Err(err) => self.fail(request_id, name, err, is_final, bus, true),
        }
    }

    /// Call a tool, retrying on rate limits and transient failures.
    async fn call_with_retry(
        &self,
        tool: &dyn DynTool,
        name: &str,
        args: &Value,
        bus: &EventBus,
    ) -> Result<Value, ToolError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match tool.call_json(args.clone()).await {
                Ok(value) => return Ok(value),
                Err(ToolError::RateLimited {
                    retry_after_secs, ..
                }) if attempt < self.retry.max_attempts => {
                    debug!(tool = %name, retry_after_secs, "Tool rate limited");
                    bus.emit(EventKind::RateLimitHit {
                        tool_name: name.to_owned(),
                        retry_after_secs,
                        original_request: args.to_string(),
                    });
                    tokio::time::sleep(Duration::from_secs_f64(retry_after_secs.max(0.0))).await;
                }
                Err(err @ ToolError::Execution { .. })
                    if attempt < self.retry.max_attempts
                        && ErrorCategory::classify_message(&err.to_string()).is_transient() =>
                {
                    let interval = self.retry.backoff_interval(attempt);
                    debug!(tool = %name, attempt, ?interval, "Retrying transient tool failure");
                    tokio::time::sleep(interval).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn fail(
        &self,
        request_id: String,
        name: &str,
        err: ToolError,
        is_final: bool,
        bus: &EventBus,
        requested_emitted: bool,
    ) -> ToolInvocation {
        let observation = format!("Error: {err}");
        if requested_emitted {
            bus.emit(EventKind::ErrorOccurred {
                error_class: "tool_execution".to_owned(),
                error_message: err.to_string(),
                context: format!("tool '{name}'"),
                recoverable: true,
                request_id: Some(request_id.clone()),
            });
        }
        ToolInvocation {
            request_id,
            tool_name: name.to_owned(),
            result: Err(err),
            observation,
            is_final,
            injection_pattern: None,
        }
    }

    /// Validate arguments against a tool's input schema.
    fn validate_args(
        definition: &ToolDefinition,
        args: &Value,
        name: &str,
    ) -> Result<(), ToolError> {
        let required = definition.required_params();
        let object = match args {
            Value::Object(map) => Some(map),
            Value::Null if required.is_empty() => None,
            // String-encoded arguments are decoded by the tool itself.
            Value::String(_) => None,
            Value::Null => {
                return Err(ToolError::MissingArgument {
                    tool_name: name.to_owned(),
                    argument: (*required.first().unwrap_or(&"")).to_owned(),
                });
            }
            _ => {
                return Err(ToolError::InvalidArguments {
                    tool_name: name.to_owned(),
                    message: "arguments must be a JSON object".to_owned(),
                });
            }
        };

        let Some(object) = object else {
            return Ok(());
        };

        for param in required {
            if !object.contains_key(param) {
                return Err(ToolError::MissingArgument {
                    tool_name: name.to_owned(),
                    argument: param.to_owned(),
                });
            }
        }

        for (key, value) in object {
            let Some(schema) = definition.param_schema(key) else {
                continue;
            };
            if value.is_null() {
                if schema.get("nullable").and_then(Value::as_bool) == Some(true) {
                    continue;
                }
                return Err(ToolError::InvalidArguments {
                    tool_name: name.to_owned(),
                    message: format!("argument '{key}' may not be null"),
                });
            }
            let Some(expected) = schema.get("type").and_then(Value::as_str) else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !ok {
                return Err(ToolError::InvalidArguments {
                    tool_name: name.to_owned(),
                    message: format!("argument '{key}' must be of type {expected}"),
                });
            }
        }

        Ok(())
    }

    /// Render a result value as a bounded observation string, applying the
    /// sanitizer before the text can reach an event.
    fn render_observation(&self, value: &Value) -> (String, Option<String>) {
        let mut text = match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
        };

        if text.chars().count() > self.max_observation_len {
            let keep = self.max_observation_len - TRUNCATION_MARKER.len();
            let truncated: String = text.chars().take(keep).collect();
            text = format!("{truncated}{TRUNCATION_MARKER}");
        }

        match self.sanitizer.scan(&text) {
            Some(pattern) => match self.sanitizer.mode() {
                SanitizerMode::Warn => {
                    warn!(pattern = %pattern, "Injection pattern in tool output");
                    (text, Some(pattern))
                }
                SanitizerMode::Fatal => (OBSERVATION_WITHHELD.to_owned(), Some(pattern)),
            },
            None => (text, None),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("preferred_search", &self.preferred_search)
            .finish_non_exhaustive()
    }
}
