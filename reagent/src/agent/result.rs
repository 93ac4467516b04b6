//! Run outcomes, the per-run context accumulator, and the caller-visible
//! run result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::{Step, Timing};
use crate::usage::TokenUsage;

/// Terminal (and per-step) classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The run completed successfully.
    Success,
    /// The run produced a final answer (step-level tag).
    FinalAnswer,
    /// The step produced intermediate observations; work continues.
    Partial,
    /// The run failed (e.g. the evaluator judged it stuck).
    Failure,
    /// An unrecoverable error terminated the run.
    Error,
    /// The step budget was exhausted.
    MaxStepsReached,
    /// A deadline expired.
    Timeout,
}

impl Outcome {
    /// Completed outcomes: success or final answer.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Success | Self::FinalAnswer)
    }

    /// Failed outcomes.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(
            self,
            Self::Failure | Self::Error | Self::MaxStepsReached | Self::Timeout
        )
    }

    /// Outcomes a caller may reasonably retry from.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Partial | Self::MaxStepsReached)
    }

    /// Outcomes after which the run cannot continue.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.is_completed() || matches!(self, Self::Failure | Self::Error | Self::Timeout)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::FinalAnswer => "final_answer",
            Self::Partial => "partial",
            Self::Failure => "failure",
            Self::Error => "error",
            Self::MaxStepsReached => "max_steps_reached",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Per-run accumulator: step number, total tokens, wall-clock timing.
///
/// An immutable value record; every update produces a new instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Current step number, 1-indexed.
    pub step_number: usize,
    /// Tokens spent across every model call in the run.
    pub total_tokens: TokenUsage,
    /// Run timing.
    pub timing: Timing,
}

impl RunContext {
    /// Start a new run context at step 1.
    #[must_use]
    pub fn start() -> Self {
        Self {
            step_number: 1,
            total_tokens: TokenUsage::zero(),
            timing: Timing::start_now(),
        }
    }

    /// A copy advanced to the next step.
    #[must_use]
    pub fn advance(&self) -> Self {
        Self {
            step_number: self.step_number + 1,
            ..self.clone()
        }
    }

    /// A copy with additional token usage accumulated.
    #[must_use]
    pub fn add_tokens(&self, usage: TokenUsage) -> Self {
        Self {
            total_tokens: self.total_tokens + usage,
            ..self.clone()
        }
    }

    /// A copy with the end time stamped.
    #[must_use]
    pub fn finish(&self) -> Self {
        let mut timing = self.timing;
        timing.complete();
        Self {
            timing,
            ..self.clone()
        }
    }
}

/// Caller-visible result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Final output, when one was produced.
    pub output: Option<Value>,
    /// Terminal outcome.
    pub outcome: Outcome,
    /// Full step history, including partial history on failure.
    pub steps: Vec<Step>,
    /// Total token usage.
    pub token_usage: TokenUsage,
    /// Run timing.
    pub timing: Timing,
    /// Error message, when the run failed.
    pub error: Option<String>,
}

impl RunResult {
    /// Whether the run completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_completed()
    }

    /// The output deserialized as a concrete type.
    #[must_use]
    pub fn output_as<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        self.output
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Number of action steps taken.
    #[must_use]
    pub fn steps_taken(&self) -> usize {
        self.steps.iter().filter(|s| s.as_action().is_some()).count()
    }

    /// Run duration in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.timing.duration_secs().unwrap_or(0.0)
    }
}
