//! Context inheritance and spawn policy for sub-agents.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::memory::AgentMemory;
use crate::message::ChatMessage;

/// Delimiter between inherited parent observations.
pub const OBSERVATION_DELIMITER: &str = "\n---\n";

/// How much of a parent's memory a child receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    /// Only the task itself.
    #[default]
    TaskOnly,
    /// The task plus the parent's observations.
    Observations,
    /// The task plus a synthesized summary of parent memory.
    Summary,
    /// The task plus the parent's entire rendered transcript.
    Full,
}

/// Frozen context-inheritance policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContextScope {
    /// The inheritance level.
    pub level: ScopeLevel,
}

impl ContextScope {
    /// Create a scope with the given level.
    #[must_use]
    pub const fn new(level: ScopeLevel) -> Self {
        Self { level }
    }

    /// Task-only scope.
    #[must_use]
    pub const fn task_only() -> Self {
        Self::new(ScopeLevel::TaskOnly)
    }

    /// Observations scope.
    #[must_use]
    pub const fn observations() -> Self {
        Self::new(ScopeLevel::Observations)
    }

    /// Summary scope.
    #[must_use]
    pub const fn summary() -> Self {
        Self::new(ScopeLevel::Summary)
    }

    /// Full-transcript scope.
    #[must_use]
    pub const fn full() -> Self {
        Self::new(ScopeLevel::Full)
    }

    /// Extract the inherited context for a child task from parent memory.
    #[must_use]
    pub fn extract_from(&self, parent: &AgentMemory, task: &str) -> InheritedContext {
        let mut context = InheritedContext {
            task: task.to_owned(),
            scope: self.level,
            parent_observations: None,
            parent_summary: None,
            parent_messages: None,
        };

        match self.level {
            ScopeLevel::TaskOnly => {}
            ScopeLevel::Observations => {
                let observations = parent.observations();
                if !observations.is_empty() {
                    context.parent_observations = Some(observations.join(OBSERVATION_DELIMITER));
                }
            }
            ScopeLevel::Summary => {
                let mut summary = String::new();
                if !parent.system_prompt().is_empty() {
                    summary.push_str("System: ");
                    summary.push_str(parent.system_prompt());
                    summary.push('\n');
                }
                if let Some(parent_task) = parent.task() {
                    summary.push_str("Task: ");
                    summary.push_str(parent_task);
                    summary.push('\n');
                }
                let observations = parent.observations();
                if !observations.is_empty() {
                    summary.push_str("Observations:\n");
                    summary.push_str(&observations.join("\n"));
                }
                context.parent_summary = Some(summary);
            }
            ScopeLevel::Full => {
                context.parent_messages = Some(parent.render_messages(None, None));
            }
        }

        context
    }
}

/// Context handed to a spawned child.
#[derive(Debug, Clone)]
pub struct InheritedContext {
    /// The child's task.
    pub task: String,
    /// The scope this context was extracted under.
    pub scope: ScopeLevel,
    /// Parent observations, under [`ScopeLevel::Observations`].
    pub parent_observations: Option<String>,
    /// Synthesized parent summary, under [`ScopeLevel::Summary`].
    pub parent_summary: Option<String>,
    /// Full rendered parent transcript, under [`ScopeLevel::Full`].
    pub parent_messages: Option<Vec<ChatMessage>>,
}

impl InheritedContext {
    /// Render the full task text seeded into the child's memory.
    #[must_use]
    pub fn into_task_text(self) -> String {
        let mut text = self.task;

        if let Some(observations) = self.parent_observations {
            text.push_str("\n\nContext from your parent agent:\nparent_observations:\n");
            text.push_str(&observations);
        }
        if let Some(summary) = self.parent_summary {
            text.push_str("\n\nContext from your parent agent:\n");
            text.push_str(&summary);
        }
        if let Some(messages) = self.parent_messages {
            text.push_str("\n\nFull transcript from your parent agent:\n");
            for message in messages {
                if let Some(content) = message.text_content() {
                    text.push_str(message.role.as_str());
                    text.push_str(": ");
                    text.push_str(&content);
                    text.push('\n');
                }
            }
        }
        text
    }
}

/// Frozen sub-agent spawn policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnConfig {
    /// Models a child may use; empty allows any.
    pub allowed_models: Vec<String>,
    /// Tools a child may carry.
    pub allowed_tools: Vec<String>,
    /// Maximum concurrently active children; zero disables spawning.
    pub max_children: usize,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            allowed_models: Vec::new(),
            allowed_tools: vec![crate::tool::FINAL_ANSWER_TOOL.to_owned()],
            max_children: 0,
        }
    }
}

impl SpawnConfig {
    /// Create a config allowing up to `max_children` active children.
    #[must_use]
    pub fn new(max_children: usize) -> Self {
        Self {
            max_children,
            ..Self::default()
        }
    }

    /// Whether spawning is enabled at all.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.max_children > 0
    }

    /// Copy with an allowed-model list; empty allows any model.
    #[must_use]
    pub fn with_allowed_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Copy with an allowed-tool list.
    #[must_use]
    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Check a child's model against the policy.
    pub fn check_model(&self, model_id: &str) -> Result<()> {
        if !self.allowed_models.is_empty()
            && !self.allowed_models.iter().any(|m| m == model_id)
        {
            return Err(AgentError::spawn(format!(
                "model '{model_id}' is not in allowed_models"
            )));
        }
        Ok(())
    }

    /// Check a child's tools against the policy.
    pub fn check_tools<'a>(&self, tool_names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in tool_names {
            if !self.allowed_tools.iter().any(|t| t == name) {
                return Err(AgentError::spawn(format!(
                    "tool '{name}' is not in allowed_tools"
                )));
            }
        }
        Ok(())
    }
}
