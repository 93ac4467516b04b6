//! The code-action executor: parse, validate, execute in a sandbox.
//!
//! State machine: parsing → validated → executing → done. A missing code
//! block is a parsing error (the scheduler may retry the step with
//! guidance); everything after extraction is reported in the
//! [`ExecutionOutcome`] and reified into the step's observation.

mod interpreter;
mod parser;
mod validator;

pub use validator::CodeValidator;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::event::EventBus;
use crate::tool::ToolRegistry;

use interpreter::{ExecSignal, Interpreter};

/// Terminal state of one code execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// The code ran to the end.
    Success,
    /// The code raised the final-answer signal.
    FinalAnswer,
    /// Validation, a limit, or a raised error stopped execution.
    Error,
}

/// Report of one sandboxed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// How the execution ended.
    pub state: ExecutionState,
    /// Final-answer payload or last expression value.
    pub value: Option<Value>,
    /// Captured print output.
    pub logs: Vec<String>,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
    /// Error message, when `state` is [`ExecutionState::Error`].
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Render the outcome as an observation string for memory.
    #[must_use]
    pub fn observation(&self) -> String {
        let mut text = String::new();
        if !self.logs.is_empty() {
            text.push_str("Execution logs:\n");
            text.push_str(&self.logs.join("\n"));
            text.push('\n');
        }
        match self.state {
            ExecutionState::Error => {
                text.push_str("Execution failed: ");
                text.push_str(self.error.as_deref().unwrap_or("unknown error"));
            }
            _ => {
                if let Some(value) = &self.value {
                    text.push_str("Last output: ");
                    match value {
                        Value::String(s) => text.push_str(s),
                        other => text.push_str(&other.to_string()),
                    }
                } else if text.is_empty() {
                    text.push_str("Execution completed with no output.");
                }
            }
        }
        text
    }
}

/// Executes code actions under an operation budget and wall-clock timeout.
#[derive(Debug, Clone)]
pub struct CodeExecutor {
    validator: CodeValidator,
    max_operations: u64,
    timeout_secs: f64,
}

impl Default for CodeExecutor {
    fn default() -> Self {
        Self {
            validator: CodeValidator::default(),
            max_operations: 10_000,
            timeout_secs: 30.0,
        }
    }
}

impl CodeExecutor {
    /// Create an executor with the given validator.
    #[must_use]
    pub fn new(validator: CodeValidator) -> Self {
        Self {
            validator,
            ..Self::default()
        }
    }

    /// Set the operation budget.
    #[must_use]
    pub const fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }

    /// Set the wall-clock timeout per execution.
    #[must_use]
    pub const fn with_timeout_secs(mut self, timeout_secs: f64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Extract the code block from raw model output.
    ///
    /// # Errors
    ///
    /// Returns a parsing error when no block is found; the scheduler may
    /// retry the step with guidance.
    pub fn parse(&self, raw_output: &str) -> Result<String> {
        parser::extract_code_block(raw_output)
    }

    /// Validate and run an extracted code block.
    ///
    /// Tools are reachable as callable names; `variables` are injected as a
    /// read-only view. Never unwinds: violations and raised errors come
    /// back in the outcome.
    pub async fn execute(
        &self,
        code: &str,
        registry: &ToolRegistry,
        bus: &EventBus,
        variables: &HashMap<String, Value>,
    ) -> ExecutionOutcome {
        let started = std::time::Instant::now();

        if let Err(err) = self.validator.validate(code) {
            return ExecutionOutcome {
                state: ExecutionState::Error,
                value: None,
                logs: Vec::new(),
                duration_secs: started.elapsed().as_secs_f64(),
                error: Some(err.to_string()),
            };
        }

        let interpreter = Interpreter::new(registry, bus, variables, self.max_operations);
        let run = interpreter.run(code);

        let (result, logs) =
            match tokio::time::timeout(Duration::from_secs_f64(self.timeout_secs), run).await {
                Ok(outcome) => outcome,
                Err(_) => (
                    Err(crate::error::AgentError::interpreter(format!(
                        "execution timed out after {}s",
                        self.timeout_secs
                    ))),
                    Vec::new(),
                ),
            };

        let duration_secs = started.elapsed().as_secs_f64();
        debug!(duration_secs, "Code action executed");

        match result {
            Ok(ExecSignal::FinalAnswer(value)) => ExecutionOutcome {
                state: ExecutionState::FinalAnswer,
                value: Some(value),
                logs,
                duration_secs,
                error: None,
            },
            Ok(ExecSignal::Completed(value)) => ExecutionOutcome {
                state: ExecutionState::Success,
                value,
                logs,
                duration_secs,
                error: None,
            },
            Err(err) => ExecutionOutcome {
                state: ExecutionState::Error,
                value: None,
                logs,
                duration_secs,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::FinalAnswerTool;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.add(FinalAnswerTool);
        registry
    }

    #[tokio::test]
    async fn parse_then_execute_final_answer() {
        let executor = CodeExecutor::default();
        let code = executor
            .parse("<code>final_answer(answer: 4)</code>")
            .unwrap();

        let outcome = executor
            .execute(&code, &registry(), &EventBus::new(), &HashMap::new())
            .await;
        assert_eq!(outcome.state, ExecutionState::FinalAnswer);
        assert_eq!(outcome.value, Some(Value::from(4)));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn validation_failure_is_reported_not_raised() {
        let executor = CodeExecutor::default();
        let outcome = executor
            .execute(
                "system(\"rm -rf /\")",
                &registry(),
                &EventBus::new(),
                &HashMap::new(),
            )
            .await;
        assert_eq!(outcome.state, ExecutionState::Error);
        assert!(outcome.error.unwrap().contains("process control"));
    }

    #[tokio::test]
    async fn budget_violation_is_reported() {
        let executor = CodeExecutor::default().with_max_operations(1);
        let outcome = executor
            .execute(
                "print(1)\nprint(2)\nprint(3)",
                &registry(),
                &EventBus::new(),
                &HashMap::new(),
            )
            .await;
        assert_eq!(outcome.state, ExecutionState::Error);
        assert!(outcome.error.unwrap().contains("operation budget"));
    }

    #[tokio::test]
    async fn logs_appear_in_observation() {
        let executor = CodeExecutor::default();
        let outcome = executor
            .execute(
                "print(\"step one\")",
                &registry(),
                &EventBus::new(),
                &HashMap::new(),
            )
            .await;
        assert_eq!(outcome.state, ExecutionState::Success);
        let observation = outcome.observation();
        assert!(observation.contains("step one"));
    }

    #[test]
    fn missing_block_raises_parsing_error() {
        let executor = CodeExecutor::default();
        assert!(matches!(
            executor.parse("just prose, no code"),
            Err(crate::error::AgentError::Parsing { .. })
        ));
    }
}
