//! Step records accumulated during a run.
//!
//! Every entry in agent memory is an immutable [`Step`]: created by the
//! scheduler, appended, never mutated afterwards. The tagged serde form of
//! this enum is the persisted memory format, so the tag-to-fields mapping is
//! part of the public contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{ChatMessage, MessageContent, MessageRole};
use crate::usage::TokenUsage;

/// Timing information for a step or a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timing {
    /// Start time of the operation.
    pub start_time: DateTime<Utc>,
    /// End time, when completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Timing {
    /// Create a new timing starting now.
    #[must_use]
    pub fn start_now() -> Self {
        Self {
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Mark the timing as complete.
    pub fn complete(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Duration in seconds; defined only once completed.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }

    /// Seconds elapsed since the start, whether or not completed.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        let delta = Utc::now() - self.start_time;
        delta.num_microseconds().map_or_else(
            || delta.num_milliseconds() as f64 / 1000.0,
            |us| us as f64 / 1_000_000.0,
        )
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::start_now()
    }
}

/// A tool call recorded in an action step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for the tool call within the run.
    pub id: String,
    /// Name of the tool.
    pub name: String,
    /// Arguments passed to the tool.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call record.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// System prompt step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPromptStep {
    /// The system prompt text.
    pub system_prompt: String,
}

impl SystemPromptStep {
    /// Render as messages; omitted in summary mode.
    #[must_use]
    pub fn to_messages(&self, summary_mode: bool) -> Vec<ChatMessage> {
        if summary_mode {
            return vec![];
        }
        vec![ChatMessage::system(&self.system_prompt)]
    }
}

/// Task step representing the user's assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    /// The task description.
    pub task: String,
    /// Optional images attached to the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Vec<u8>>>,
}

impl TaskStep {
    /// Create a new task step.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            images: None,
        }
    }

    /// Create a task step with images.
    #[must_use]
    pub fn with_images(task: impl Into<String>, images: Vec<Vec<u8>>) -> Self {
        Self {
            task: task.into(),
            images: Some(images),
        }
    }

    /// Render as messages.
    #[must_use]
    pub fn to_messages(&self, _summary_mode: bool) -> Vec<ChatMessage> {
        let text = format!("New task:\n{}", self.task);
        match &self.images {
            Some(images) if !images.is_empty() => {
                vec![ChatMessage::user_with_images(text, images.clone())]
            }
            _ => vec![ChatMessage::user(text)],
        }
    }
}

/// Planning step holding the current plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningStep {
    /// The plan text.
    pub plan: String,
    /// Token usage for the planning call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Timing of the planning call.
    pub timing: Timing,
}

impl PlanningStep {
    /// Render as messages; omitted in summary mode.
    #[must_use]
    pub fn to_messages(&self, summary_mode: bool) -> Vec<ChatMessage> {
        if summary_mode {
            return vec![];
        }
        vec![
            ChatMessage::assistant(self.plan.trim()),
            ChatMessage::user("Now proceed and carry out this plan."),
        ]
    }
}

/// One iteration of the reasoning loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionStep {
    /// Step number, 1-indexed.
    pub step_number: usize,
    /// Timing information.
    pub timing: Timing,
    /// The assistant message the model produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_message: Option<ChatMessage>,
    /// Text content of the model output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_output: Option<String>,
    /// Tool calls made in this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// The code block executed, in code-action mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_action: Option<String>,
    /// Observations from tool execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    /// Output of the action, when it produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_output: Option<Value>,
    /// Error that occurred, reified as part of the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Token usage for this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Whether this step produced the final answer.
    #[serde(default)]
    pub is_final_answer: bool,
    /// Reasoning content, for models that expose it separately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Trace id of the producing run.
    #[serde(default)]
    pub trace_id: String,
    /// Trace id of the parent run, for sub-agents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_trace_id: Option<String>,
}

impl ActionStep {
    /// Render as messages.
    ///
    /// In summary mode the model monologue is dropped and only tool calls,
    /// observations, and errors survive.
    #[must_use]
    pub fn to_messages(&self, summary_mode: bool) -> Vec<ChatMessage> {
        let mut messages = vec![];

        if let Some(output) = &self.model_output
            && !summary_mode
        {
            messages.push(ChatMessage::assistant(output.trim()));
        }

        if let Some(tool_calls) = &self.tool_calls {
            let calls_str = serde_json::to_string(tool_calls).unwrap_or_default();
            messages.push(ChatMessage {
                role: MessageRole::ToolCall,
                content: Some(vec![MessageContent::text(format!(
                    "Calling tools:\n{calls_str}"
                ))]),
                tool_calls: None,
                tool_call_id: None,
                token_usage: None,
                raw: None,
            });
        }

        if let Some(obs) = &self.observations {
            messages.push(ChatMessage {
                role: MessageRole::ToolResponse,
                content: Some(vec![MessageContent::text(format!("Observation:\n{obs}"))]),
                tool_calls: None,
                tool_call_id: None,
                token_usage: None,
                raw: None,
            });
        }

        if let Some(err) = &self.error {
            messages.push(ChatMessage {
                role: MessageRole::ToolResponse,
                content: Some(vec![MessageContent::text(format!(
                    "Error:\n{err}\nNow let's retry: take care not to repeat previous errors!"
                ))]),
                tool_calls: None,
                tool_call_id: None,
                token_usage: None,
                raw: None,
            });
        }

        messages
    }
}

/// Verdict of an evaluation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// The task goal has been achieved.
    GoalAchieved,
    /// The run should continue.
    Continue,
    /// The run is stuck and unlikely to recover.
    Stuck,
}

/// Self-evaluation step produced by the optional evaluation phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationStep {
    /// The verdict.
    pub status: EvaluationStatus,
    /// Answer reported by the evaluator, when goal achieved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    /// Evaluator reasoning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Confidence in [0, 1], when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl EvaluationStep {
    /// Evaluation steps never re-enter the model context.
    #[must_use]
    pub fn to_messages(&self, _summary_mode: bool) -> Vec<ChatMessage> {
        vec![]
    }
}

/// Final answer step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswerStep {
    /// The final output value.
    pub output: Value,
}

impl FinalAnswerStep {
    /// Final answers never re-enter the model context.
    #[must_use]
    pub fn to_messages(&self, _summary_mode: bool) -> Vec<ChatMessage> {
        vec![]
    }
}

/// A step in the agent's memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// System prompt step.
    SystemPrompt(SystemPromptStep),
    /// Task assignment step.
    Task(TaskStep),
    /// Planning step.
    Planning(PlanningStep),
    /// Action step.
    Action(Box<ActionStep>),
    /// Evaluation step.
    Evaluation(EvaluationStep),
    /// Final answer step.
    FinalAnswer(FinalAnswerStep),
}

impl Step {
    /// Stable step type tag.
    #[must_use]
    pub const fn step_type(&self) -> &'static str {
        match self {
            Self::SystemPrompt(_) => "system_prompt",
            Self::Task(_) => "task",
            Self::Planning(_) => "planning",
            Self::Action(_) => "action",
            Self::Evaluation(_) => "evaluation",
            Self::FinalAnswer(_) => "final_answer",
        }
    }

    /// Render this step to messages for the next model call.
    #[must_use]
    pub fn to_messages(&self, summary_mode: bool) -> Vec<ChatMessage> {
        match self {
            Self::SystemPrompt(s) => s.to_messages(summary_mode),
            Self::Task(s) => s.to_messages(summary_mode),
            Self::Planning(s) => s.to_messages(summary_mode),
            Self::Action(s) => s.to_messages(summary_mode),
            Self::Evaluation(s) => s.to_messages(summary_mode),
            Self::FinalAnswer(s) => s.to_messages(summary_mode),
        }
    }

    /// Token usage attributed to this step, when it made a model call.
    #[must_use]
    pub fn token_usage(&self) -> Option<TokenUsage> {
        match self {
            Self::Action(s) => s.token_usage,
            Self::Planning(s) => s.token_usage,
            _ => None,
        }
    }

    /// The action step inside, if this is one.
    #[must_use]
    pub fn as_action(&self) -> Option<&ActionStep> {
        match self {
            Self::Action(s) => Some(s),
            _ => None,
        }
    }
}
