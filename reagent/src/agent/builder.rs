//! Agent builder.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::Result;
use crate::event::{AgentEvent, EventBus};
use crate::executor::{CodeExecutor, CodeValidator};
use crate::memory::{AgentMemory, MemoryConfig, Summarizer};
use crate::model::Model;
use crate::orchestrator::ControlClient;
use crate::prompts::PromptTemplates;
use crate::resilience::{ResilientModel, RetryPolicy};
use crate::sanitize::Sanitizer;
use crate::tool::{BoxedTool, FinalAnswerTool, ToolRegistry, UserInputTool};

use super::{Agent, AgentConfig, AgentMode};

type EventCallback = Box<dyn Fn(&AgentEvent) + Send + Sync>;

/// Builder for [`Agent`].
///
/// # Example
///
/// ```rust,ignore
/// let agent = Agent::builder()
///     .model(model)
///     .tool(Box::new(MyTool))
///     .config(AgentConfig::new().with_max_steps(10))
///     .try_build()?;
/// ```
#[derive(Default)]
pub struct AgentBuilder {
    model: Option<Arc<dyn Model>>,
    fallback_models: Vec<Arc<dyn Model>>,
    retry: Option<RetryPolicy>,
    breaker: Option<(u32, Duration)>,
    tools: Vec<BoxedTool>,
    config: AgentConfig,
    memory_config: Option<MemoryConfig>,
    prompts: Option<PromptTemplates>,
    bus: Option<Arc<EventBus>>,
    sanitizer: Option<Sanitizer>,
    summarizer: Option<Summarizer>,
    control: Option<ControlClient>,
    preferred_search: Option<String>,
    max_observation_len: Option<usize>,
    callbacks: Vec<(String, EventCallback)>,
}

impl std::fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("has_model", &self.model.is_some())
            .field("tools", &self.tools.len())
            .field("fallback_models", &self.fallback_models.len())
            .finish_non_exhaustive()
    }
}

impl AgentBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the language model.
    #[must_use]
    pub fn model(mut self, model: impl Model + 'static) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    /// Set an already-shared language model.
    #[must_use]
    pub fn model_arc(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    /// Add ordered fallback models tried when the primary exhausts
    /// retries.
    #[must_use]
    pub fn fallback_models(mut self, models: Vec<Arc<dyn Model>>) -> Self {
        self.fallback_models = models;
        self
    }

    /// Set the retry policy for model and tool calls.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set circuit breaker settings for the wrapped models.
    #[must_use]
    pub fn circuit_breaker(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.breaker = Some((failure_threshold, cooldown));
        self
    }

    /// Add a tool.
    #[must_use]
    pub fn tool(mut self, tool: BoxedTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Add multiple tools.
    #[must_use]
    pub fn tools(mut self, tools: impl IntoIterator<Item = BoxedTool>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Set the agent configuration.
    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the memory budget configuration.
    #[must_use]
    pub fn memory_config(mut self, memory_config: MemoryConfig) -> Self {
        self.memory_config = Some(memory_config);
        self
    }

    /// Set custom prompt templates.
    #[must_use]
    pub fn prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Share an existing event bus instead of creating a fresh one.
    #[must_use]
    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Set the prompt sanitizer.
    #[must_use]
    pub fn sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    /// Set the memory summarizer callback.
    #[must_use]
    pub fn summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Attach a control channel to the parent; also wires the
    /// `user_input` tool through it.
    #[must_use]
    pub fn control(mut self, control: ControlClient) -> Self {
        self.control = Some(control);
        self
    }

    /// Set the provider the `web_search` alias resolves to.
    #[must_use]
    pub fn preferred_search(mut self, provider: impl Into<String>) -> Self {
        self.preferred_search = Some(provider.into());
        self
    }

    /// Bound rendered observations to this many characters.
    #[must_use]
    pub fn max_observation_len(mut self, len: usize) -> Self {
        self.max_observation_len = Some(len);
        self
    }

    /// Register a callback for an event name alias.
    ///
    /// Unknown names are rejected at build time.
    #[must_use]
    pub fn on_event<F>(mut self, event_name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.callbacks.push((event_name.into(), Box::new(callback)));
        self
    }

    /// Build the agent.
    ///
    /// # Panics
    ///
    /// Panics on invalid configuration. Use [`try_build`](Self::try_build)
    /// for a fallible alternative.
    #[must_use]
    pub fn build(self) -> Agent {
        self.try_build().expect("agent configuration must be valid")
    }

    /// Build the agent, validating the whole configuration tree.
    pub fn try_build(self) -> Result<Agent> {
        self.config.validate()?;
        if let Some(memory_config) = &self.memory_config {
            memory_config.validate()?;
        }

        let sanitizer = self.sanitizer.unwrap_or_default();
        if let Some(instructions) = &self.config.custom_instructions {
            sanitizer.inspect(instructions, "custom_instructions")?;
        }

        let bus = self.bus.unwrap_or_else(|| Arc::new(EventBus::new()));

        for (name, callback) in self.callbacks {
            bus.subscribe_to(&name, callback)?;
        }

        let primary = self.model.ok_or_else(|| {
            crate::error::AgentError::configuration("a model is required to build an agent")
        })?;
        let mut resilient = ResilientModel::new(primary, Arc::clone(&bus))
            .with_fallbacks(self.fallback_models)
            .with_retry(self.retry.unwrap_or_default());
        if let Some((threshold, cooldown)) = self.breaker {
            resilient = resilient.with_breaker(threshold, cooldown);
        }

        let mut tools = ToolRegistry::new();
        for tool in self.tools {
            tools.add_boxed(tool);
        }
        tools.add(FinalAnswerTool);
        if let Some(control) = &self.control {
            tools.add(UserInputTool::new(control.clone()));
        }
        if let Some(provider) = self.preferred_search {
            tools.set_preferred_search(provider);
        }
        if let Some(len) = self.max_observation_len {
            tools.set_max_observation_len(len);
        }
        if let Some(retry) = self.retry {
            tools.set_retry(retry);
        }
        tools.set_sanitizer(sanitizer.clone());

        let validator = CodeValidator::new(self.config.authorized_imports.clone());
        let executor = CodeExecutor::new(validator)
            .with_max_operations(self.config.max_operations)
            .with_timeout_secs(self.config.code_timeout_secs);

        let prompts = self.prompts.unwrap_or_else(|| match self.config.mode {
            AgentMode::ToolCalling => PromptTemplates::tool_calling_agent(),
            AgentMode::CodeAction => PromptTemplates::code_agent(),
        });

        Ok(Agent {
            model: Box::new(resilient),
            tools,
            config: self.config,
            memory_config: self.memory_config,
            memory: AgentMemory::default(),
            prompts,
            bus,
            sanitizer,
            summarizer: self.summarizer,
            executor,
            interrupt_flag: Arc::default(),
            state: HashMap::new(),
            trace_id: Uuid::new_v4().to_string(),
            parent_trace_id: None,
        })
    }
}
