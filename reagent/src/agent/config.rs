//! Agent configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// How the agent expresses actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// The model responds with structured tool calls.
    #[default]
    ToolCalling,
    /// The model responds with a code block executed by the sandbox.
    CodeAction,
}

/// Frozen configuration for an agent.
///
/// Validated on construction via [`AgentConfig::validate`]; updates produce
/// new instances through the `with_*` methods. A run observes the exact
/// config it began with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name.
    pub name: Option<String>,
    /// Agent description, used when acting as a sub-agent.
    pub description: Option<String>,
    /// Maximum number of reasoning steps, in [1, 1000].
    pub max_steps: usize,
    /// Run planning every N steps. `None` disables planning; zero is
    /// rejected at validation.
    pub planning_interval: Option<usize>,
    /// Run the evaluation phase every N steps. `None` disables it.
    pub evaluation_interval: Option<usize>,
    /// Minimum confidence required to trust a `goal_achieved` verdict.
    pub min_confidence: f64,
    /// Extra instructions folded into the system prompt (at most 10k chars).
    pub custom_instructions: Option<String>,
    /// Imports the code-action validator accepts.
    pub authorized_imports: BTreeSet<String>,
    /// Action mode.
    pub mode: AgentMode,
    /// Wall-clock deadline for the whole run, in seconds.
    pub max_duration_secs: Option<f64>,
    /// Per-model-call deadline, in seconds.
    pub model_timeout_secs: Option<f64>,
    /// How many times a step may be retried with guidance after a parsing
    /// failure.
    pub max_parse_retries: usize,
    /// Operation budget per code execution.
    pub max_operations: u64,
    /// Wall-clock timeout per code execution, in seconds.
    pub code_timeout_secs: f64,
}

impl AgentConfig {
    /// Default maximum number of steps.
    pub const DEFAULT_MAX_STEPS: usize = 20;

    /// Upper bound on `max_steps`.
    pub const MAX_STEPS_LIMIT: usize = 1000;

    /// Upper bound on `custom_instructions` length.
    pub const MAX_INSTRUCTIONS_LEN: usize = 10_000;

    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy with a name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Copy with a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Copy with a step budget.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Copy with a planning interval.
    #[must_use]
    pub fn with_planning_interval(mut self, interval: usize) -> Self {
        self.planning_interval = Some(interval);
        self
    }

    /// Copy with an evaluation interval.
    #[must_use]
    pub fn with_evaluation_interval(mut self, interval: usize) -> Self {
        self.evaluation_interval = Some(interval);
        self
    }

    /// Copy with a confidence floor for `goal_achieved` verdicts.
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Copy with custom instructions.
    #[must_use]
    pub fn with_custom_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }

    /// Copy with authorized imports for code actions.
    #[must_use]
    pub fn with_authorized_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_imports = imports.into_iter().map(Into::into).collect();
        self
    }

    /// Copy with an action mode.
    #[must_use]
    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Copy with a run deadline.
    #[must_use]
    pub fn with_max_duration_secs(mut self, secs: f64) -> Self {
        self.max_duration_secs = Some(secs);
        self
    }

    /// Copy with a per-model-call deadline.
    #[must_use]
    pub fn with_model_timeout_secs(mut self, secs: f64) -> Self {
        self.model_timeout_secs = Some(secs);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 || self.max_steps > Self::MAX_STEPS_LIMIT {
            return Err(AgentError::configuration(format!(
                "max_steps must be in [1, {}], got {}",
                Self::MAX_STEPS_LIMIT,
                self.max_steps
            )));
        }
        if self.planning_interval == Some(0) {
            return Err(AgentError::configuration(
                "planning_interval of zero is invalid; omit it to disable planning",
            ));
        }
        if self.evaluation_interval == Some(0) {
            return Err(AgentError::configuration(
                "evaluation_interval of zero is invalid; omit it to disable evaluation",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(AgentError::configuration(
                "min_confidence must be in [0, 1]",
            ));
        }
        if let Some(instructions) = &self.custom_instructions
            && instructions.len() > Self::MAX_INSTRUCTIONS_LEN
        {
            return Err(AgentError::configuration(format!(
                "custom_instructions exceeds {} characters",
                Self::MAX_INSTRUCTIONS_LEN
            )));
        }
        if let Some(secs) = self.max_duration_secs
            && secs <= 0.0
        {
            return Err(AgentError::configuration("max_duration must be positive"));
        }
        if let Some(secs) = self.model_timeout_secs
            && secs <= 0.0
        {
            return Err(AgentError::configuration("model timeout must be positive"));
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            max_steps: Self::DEFAULT_MAX_STEPS,
            planning_interval: None,
            evaluation_interval: None,
            min_confidence: 0.0,
            custom_instructions: None,
            authorized_imports: BTreeSet::new(),
            mode: AgentMode::default(),
            max_duration_secs: None,
            model_timeout_secs: None,
            max_parse_retries: 3,
            max_operations: 10_000,
            code_timeout_secs: 30.0,
        }
    }
}
