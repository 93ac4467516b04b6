//! Memory system tracking agent steps and rendering model context.
//!
//! [`AgentMemory`] holds the system prompt and an ordered sequence of
//! immutable [`Step`] records. Rendering converts the sequence into the
//! message array for the next model call, optionally shrunk by a
//! [`MemoryConfig`] budget strategy.

mod budget;
mod step;

pub use budget::{
    MemoryConfig, MemoryStrategy, OBSERVATIONS_MASKED, Summarizer, estimate_tokens,
};
pub use step::{
    ActionStep, EvaluationStatus, EvaluationStep, FinalAnswerStep, PlanningStep, Step,
    SystemPromptStep, TaskStep, Timing, ToolCall,
};

use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::message::ChatMessage;
use crate::usage::TokenUsage;

/// Render the plain (unbudgeted) message list.
pub(crate) fn render_full(system: &[ChatMessage], steps: &[Step]) -> Vec<ChatMessage> {
    let mut messages = system.to_vec();
    for step in steps {
        messages.extend(step.to_messages(false));
    }
    messages
}

/// Agent memory: a system prompt plus the ordered run history.
///
/// Invariants maintained here and checked on [`AgentMemory::load`]:
/// the system prompt precedes everything, at most one task step sits at the
/// head of the sequence, and a final-answer-producing action step is the
/// last action step.
#[derive(Debug, Clone)]
pub struct AgentMemory {
    /// System prompt step.
    system_prompt: SystemPromptStep,
    /// Ordered steps taken by the agent.
    steps: Vec<Step>,
}

impl AgentMemory {
    /// Create a new memory with the given system prompt.
    #[must_use]
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: SystemPromptStep {
                system_prompt: system_prompt.into(),
            },
            steps: Vec::new(),
        }
    }

    /// Replace the system prompt.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt.system_prompt = prompt.into();
    }

    /// The system prompt text.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt.system_prompt
    }

    /// Append the task step. At most one task is allowed, and it must come
    /// before any other step.
    pub fn add_task(&mut self, task: impl Into<String>, images: Option<Vec<Vec<u8>>>) -> Result<()> {
        if !self.steps.is_empty() {
            return Err(AgentError::configuration(
                "task must be the first step in memory",
            ));
        }
        let step = match images {
            Some(images) if !images.is_empty() => TaskStep::with_images(task, images),
            _ => TaskStep::new(task),
        };
        self.steps.push(Step::Task(step));
        Ok(())
    }

    /// Append a step.
    pub fn append(&mut self, step: Step) -> Result<()> {
        match &step {
            Step::SystemPrompt(_) => {
                return Err(AgentError::configuration(
                    "system prompt is held separately and cannot be appended",
                ));
            }
            Step::Task(_) => {
                if self.steps.iter().any(|s| matches!(s, Step::Task(_))) {
                    return Err(AgentError::configuration("task step already present"));
                }
            }
            _ => {}
        }
        if self
            .steps
            .iter()
            .any(|s| matches!(s, Step::FinalAnswer(_)))
        {
            return Err(AgentError::configuration(
                "memory is sealed after a final answer",
            ));
        }
        if step.as_action().is_some_and(|a| a.is_final_answer)
            && self
                .steps
                .iter()
                .filter_map(Step::as_action)
                .any(|a| a.is_final_answer)
        {
            return Err(AgentError::configuration(
                "a final-answer action step is already present",
            ));
        }
        self.steps.push(step);
        Ok(())
    }

    /// All steps, in order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Whether a planning step has been recorded.
    #[must_use]
    pub fn has_plan(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, Step::Planning(_)))
    }

    /// The task text, when a task step is present.
    #[must_use]
    pub fn task(&self) -> Option<&str> {
        self.steps.iter().find_map(|s| match s {
            Step::Task(t) => Some(t.task.as_str()),
            _ => None,
        })
    }

    /// Observations from every action step, in order.
    #[must_use]
    pub fn observations(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(Step::as_action)
            .filter_map(|a| a.observations.as_deref())
            .collect()
    }

    /// Clear all steps, keeping the system prompt.
    pub fn reset(&mut self) {
        self.steps.clear();
    }

    /// Convert memory into the message array for the next model call.
    ///
    /// With no config (or the `full` strategy) every message is returned.
    #[must_use]
    pub fn render_messages(
        &self,
        config: Option<&MemoryConfig>,
        summarizer: Option<&Summarizer>,
    ) -> Vec<ChatMessage> {
        let system = self.system_prompt.to_messages(false);
        match config {
            None => render_full(&system, &self.steps),
            Some(config) => match config.strategy {
                MemoryStrategy::Full => render_full(&system, &self.steps),
                MemoryStrategy::Mask => {
                    budget::render_masked(&system, &self.steps, config.preserve_recent)
                }
                MemoryStrategy::Summarize => budget::render_summarized(
                    &system,
                    &self.steps,
                    config.preserve_recent,
                    summarizer,
                ),
                MemoryStrategy::Hybrid => {
                    budget::render_hybrid(&system, &self.steps, config, summarizer)
                }
            },
        }
    }

    /// Total token usage over all model-producing steps.
    #[must_use]
    pub fn total_token_usage(&self) -> TokenUsage {
        self.steps.iter().filter_map(Step::token_usage).sum()
    }

    /// Serialize memory as an ordered list of step records, system prompt
    /// first. This is the persisted memory format.
    #[must_use]
    pub fn replay(&self) -> Vec<Value> {
        let mut records = Vec::with_capacity(self.steps.len() + 1);
        records.push(
            serde_json::to_value(Step::SystemPrompt(self.system_prompt.clone()))
                .unwrap_or_default(),
        );
        records.extend(
            self.steps
                .iter()
                .map(|s| serde_json::to_value(s).unwrap_or_default()),
        );
        records
    }

    /// Rebuild memory from an ordered list of step records, validating the
    /// structural invariants.
    pub fn load(records: Vec<Step>) -> Result<Self> {
        let mut iter = records.into_iter();
        let system_prompt = match iter.next() {
            Some(Step::SystemPrompt(s)) => s,
            _ => {
                return Err(AgentError::configuration(
                    "memory records must begin with a system prompt step",
                ));
            }
        };

        let mut memory = Self {
            system_prompt,
            steps: Vec::new(),
        };
        for (i, step) in iter.enumerate() {
            if matches!(step, Step::Task(_)) && i != 0 {
                return Err(AgentError::configuration(
                    "task step must immediately follow the system prompt",
                ));
            }
            memory.append(step)?;
        }
        Ok(memory)
    }
}

impl Default for AgentMemory {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_must_come_first_and_only_once() {
        let mut memory = AgentMemory::new("sys");
        memory.add_task("do it", None).unwrap();
        assert!(memory.add_task("again", None).is_err());
        assert_eq!(memory.task(), Some("do it"));
    }

    #[test]
    fn renders_system_then_task() {
        let mut memory = AgentMemory::new("You are helpful.");
        memory.add_task("Count to 3", None).unwrap();
        let messages = memory.render_messages(None, None);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].role.is_system());
    }

    #[test]
    fn final_answer_seals_memory() {
        let mut memory = AgentMemory::new("sys");
        memory.add_task("t", None).unwrap();
        memory
            .append(Step::FinalAnswer(FinalAnswerStep {
                output: serde_json::json!(42),
            }))
            .unwrap();
        assert!(
            memory
                .append(Step::Action(Box::new(ActionStep::default())))
                .is_err()
        );
    }

    #[test]
    fn at_most_one_final_action_step() {
        let mut memory = AgentMemory::new("sys");
        let final_action = || {
            Step::Action(Box::new(ActionStep {
                is_final_answer: true,
                ..Default::default()
            }))
        };
        memory.append(final_action()).unwrap();
        assert!(memory.append(final_action()).is_err());
    }

    #[test]
    fn total_usage_sums_model_steps() {
        let mut memory = AgentMemory::new("sys");
        memory
            .append(Step::Planning(PlanningStep {
                plan: "plan".into(),
                token_usage: Some(TokenUsage::new(10, 5)),
                timing: Timing::start_now(),
            }))
            .unwrap();
        memory
            .append(Step::Action(Box::new(ActionStep {
                token_usage: Some(TokenUsage::new(20, 10)),
                ..Default::default()
            })))
            .unwrap();
        assert_eq!(memory.total_token_usage(), TokenUsage::new(30, 15));
    }

    #[test]
    fn replay_load_round_trip() {
        let mut memory = AgentMemory::new("sys");
        memory.add_task("t", None).unwrap();
        memory
            .append(Step::Action(Box::new(ActionStep {
                step_number: 1,
                observations: Some("o".into()),
                ..Default::default()
            })))
            .unwrap();

        let records: Vec<Step> = memory
            .replay()
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();
        let loaded = AgentMemory::load(records).unwrap();
        assert_eq!(loaded.system_prompt(), "sys");
        assert_eq!(loaded.step_count(), 2);
    }

    #[test]
    fn load_rejects_misplaced_task() {
        let records = vec![
            Step::SystemPrompt(SystemPromptStep {
                system_prompt: "s".into(),
            }),
            Step::Action(Box::new(ActionStep::default())),
            Step::Task(TaskStep::new("late")),
        ];
        assert!(AgentMemory::load(records).is_err());
    }

    #[test]
    fn load_rejects_missing_system_prompt() {
        let records = vec![Step::Task(TaskStep::new("t"))];
        assert!(AgentMemory::load(records).is_err());
    }
}
