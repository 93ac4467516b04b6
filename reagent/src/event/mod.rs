//! Immutable events describing control-plane transitions.
//!
//! Every observable transition in a run publishes an [`AgentEvent`] through
//! the [`EventBus`]. Events are created once, delivered to matching
//! subscribers in emission order per correlation id, and then discarded;
//! nothing is stored unless a subscriber persists it.

mod bus;

pub use bus::{EventBus, Subscriber, SubscriptionId};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::agent::Outcome;
use crate::memory::EvaluationStatus;

/// Stable event-name aliases, usable as subscription filters and callback
/// registration names.
pub const EVENT_NAMES: &[&str] = &[
    "tool_call_requested",
    "tool_call_completed",
    "step_completed",
    "task_completed",
    "evaluation_completed",
    "error_occurred",
    "rate_limit_hit",
    "retry_requested",
    "failover_occurred",
    "recovery_completed",
    "sub_agent_launched",
    "sub_agent_progress",
    "sub_agent_completed",
    "control_yielded",
    "control_resumed",
];

/// The payload of an event, one variant per observable transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventKind {
    /// Emitted before a tool runs.
    ToolCallRequested {
        /// Name of the tool.
        tool_name: String,
        /// Arguments the tool will receive.
        arguments: Value,
        /// Correlation id for this invocation.
        request_id: String,
    },

    /// Emitted after a tool returns.
    ToolCallCompleted {
        /// Correlation id matching the request.
        request_id: String,
        /// Name of the tool.
        tool_name: String,
        /// The raw result value.
        result: Option<Value>,
        /// The rendered observation.
        observation: String,
        /// Whether the tool was `final_answer`.
        is_final: bool,
    },

    /// Emitted after one reasoning-loop iteration.
    StepCompleted {
        /// Step number, 1-indexed.
        step_number: usize,
        /// Outcome classification of the step.
        outcome: Outcome,
        /// Observations the step produced.
        observations: Option<String>,
    },

    /// Emitted once, when the run terminates.
    TaskCompleted {
        /// Terminal outcome of the run.
        outcome: Outcome,
        /// Final output, when one was produced.
        output: Option<Value>,
        /// Number of action steps taken.
        steps_taken: usize,
    },

    /// Emitted after an evaluation phase.
    EvaluationCompleted {
        /// Step number the evaluation followed.
        step_number: usize,
        /// The evaluator's verdict.
        status: EvaluationStatus,
        /// Answer reported by the evaluator.
        answer: Option<Value>,
        /// Evaluator reasoning.
        reasoning: Option<String>,
    },

    /// Emitted when an error was caught.
    ErrorOccurred {
        /// Stable error kind tag.
        error_class: String,
        /// Human-readable message.
        error_message: String,
        /// Where the error was caught.
        context: String,
        /// Whether the loop continues past it.
        recoverable: bool,
        /// Correlation id, when the error belongs to a tool invocation.
        request_id: Option<String>,
    },

    /// Emitted by the resilience layer on a classified rate limit.
    RateLimitHit {
        /// Tool name or model id that was limited.
        tool_name: String,
        /// Seconds to wait before retrying.
        retry_after_secs: f64,
        /// Rendering of the original request.
        original_request: String,
    },

    /// Emitted before a model retry attempt.
    RetryRequested {
        /// Model being retried.
        model_id: String,
        /// Attempt number about to run.
        attempt: u32,
        /// Configured attempt budget.
        max_attempts: u32,
        /// Backoff interval chosen for this attempt.
        suggested_interval_secs: f64,
    },

    /// Emitted when switching to an alternative model.
    FailoverOccurred {
        /// Model being abandoned.
        from_model_id: String,
        /// Model being tried next.
        to_model_id: String,
        /// Failover attempt number.
        attempt: u32,
    },

    /// Emitted when a call succeeds after one or more retries.
    RecoveryCompleted {
        /// Model that recovered.
        model_id: String,
        /// Attempts made before the success.
        attempts_before_recovery: u32,
    },

    /// Emitted when a sub-agent starts.
    SubAgentLaunched {
        /// Correlation id for this launch.
        launch_id: String,
        /// Name of the sub-agent.
        agent_name: String,
        /// Task the sub-agent received.
        task: String,
        /// Trace id of the parent run.
        parent_id: String,
    },

    /// Emitted per sub-agent step.
    SubAgentProgress {
        /// Correlation id matching the launch.
        launch_id: String,
        /// Sub-agent step number.
        step_number: usize,
        /// Progress message.
        message: String,
    },

    /// Emitted when a sub-agent run ends.
    SubAgentCompleted {
        /// Correlation id matching the launch.
        launch_id: String,
        /// Terminal outcome of the sub-agent run.
        outcome: Outcome,
        /// Output of the sub-agent run.
        output: Option<Value>,
    },

    /// Emitted when a child suspends on a control request.
    ControlYielded {
        /// The request type: `user_input`, `confirmation`, or
        /// `sub_agent_query`.
        request_type: String,
        /// Correlation id for this control exchange.
        request_id: String,
        /// Prompt shown to the handler.
        prompt: String,
    },

    /// Emitted when a control request is answered and the child resumes.
    ControlResumed {
        /// Correlation id matching the yield.
        request_id: String,
        /// Whether the request was approved.
        approved: bool,
        /// Value returned to the child.
        value: Option<Value>,
    },
}

impl EventKind {
    /// The stable event-name alias of this variant.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ToolCallRequested { .. } => "tool_call_requested",
            Self::ToolCallCompleted { .. } => "tool_call_completed",
            Self::StepCompleted { .. } => "step_completed",
            Self::TaskCompleted { .. } => "task_completed",
            Self::EvaluationCompleted { .. } => "evaluation_completed",
            Self::ErrorOccurred { .. } => "error_occurred",
            Self::RateLimitHit { .. } => "rate_limit_hit",
            Self::RetryRequested { .. } => "retry_requested",
            Self::FailoverOccurred { .. } => "failover_occurred",
            Self::RecoveryCompleted { .. } => "recovery_completed",
            Self::SubAgentLaunched { .. } => "sub_agent_launched",
            Self::SubAgentProgress { .. } => "sub_agent_progress",
            Self::SubAgentCompleted { .. } => "sub_agent_completed",
            Self::ControlYielded { .. } => "control_yielded",
            Self::ControlResumed { .. } => "control_resumed",
        }
    }

    /// The correlation id events of this family are ordered by, when any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::ToolCallRequested { request_id, .. }
            | Self::ToolCallCompleted { request_id, .. }
            | Self::ControlYielded { request_id, .. }
            | Self::ControlResumed { request_id, .. } => Some(request_id),
            Self::ErrorOccurred { request_id, .. } => request_id.as_deref(),
            Self::SubAgentLaunched { launch_id, .. }
            | Self::SubAgentProgress { launch_id, .. }
            | Self::SubAgentCompleted { launch_id, .. } => Some(launch_id),
            _ => None,
        }
    }
}

/// An immutable event: a stamped [`EventKind`].
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    /// Unique event id.
    pub id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Scheduled delivery time, for events describing future work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    /// The payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl AgentEvent {
    /// Stamp a new event.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            due_at: None,
            kind,
        }
    }

    /// The stable event-name alias.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_alias_table() {
        let kind = EventKind::StepCompleted {
            step_number: 1,
            outcome: Outcome::Partial,
            observations: None,
        };
        assert_eq!(kind.name(), "step_completed");
        assert!(EVENT_NAMES.contains(&kind.name()));
    }

    #[test]
    fn correlation_ids() {
        let requested = EventKind::ToolCallRequested {
            tool_name: "search".into(),
            arguments: Value::Null,
            request_id: "req-1".into(),
        };
        assert_eq!(requested.correlation_id(), Some("req-1"));

        let launched = EventKind::SubAgentLaunched {
            launch_id: "l-1".into(),
            agent_name: "child".into(),
            task: "t".into(),
            parent_id: "p".into(),
        };
        assert_eq!(launched.correlation_id(), Some("l-1"));

        let step = EventKind::StepCompleted {
            step_number: 1,
            outcome: Outcome::Partial,
            observations: None,
        };
        assert_eq!(step.correlation_id(), None);
    }

    #[test]
    fn serialized_events_carry_tag_and_stamp() {
        let event = AgentEvent::new(EventKind::TaskCompleted {
            outcome: Outcome::Success,
            output: Some(Value::from(4)),
            steps_taken: 1,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "task_completed");
        assert_eq!(json["steps_taken"], 1);
        assert!(json["id"].is_string());
        assert!(json["created_at"].is_string());
    }
}
