//! The agent: a bounded, observable ReAct loop over a model and tools.
//!
//! An [`Agent`] is built once via [`AgentBuilder`], then driven through
//! [`Agent::run`]: task in, [`RunResult`] out. The loop generates a model
//! response, turns it into tool calls or a code action, observes the
//! results, and repeats until a final answer, an exhausted budget, or a
//! terminal error.

mod builder;
mod config;
mod options;
mod result;
mod runner;

pub use builder::AgentBuilder;
pub use config::{AgentConfig, AgentMode};
pub use options::RunOptions;
pub use result::{Outcome, RunContext, RunResult};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::event::EventBus;
use crate::executor::CodeExecutor;
use crate::memory::{AgentMemory, MemoryConfig, Summarizer};
use crate::model::Model;
use crate::prompts::PromptTemplates;
use crate::sanitize::Sanitizer;
use crate::tool::ToolRegistry;

/// An LLM-driven tool-using agent.
pub struct Agent {
    pub(crate) model: Box<dyn Model>,
    pub(crate) tools: ToolRegistry,
    pub(crate) config: AgentConfig,
    pub(crate) memory_config: Option<MemoryConfig>,
    pub(crate) memory: AgentMemory,
    pub(crate) prompts: PromptTemplates,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) sanitizer: Sanitizer,
    pub(crate) summarizer: Option<Summarizer>,
    pub(crate) executor: CodeExecutor,
    pub(crate) interrupt_flag: Arc<AtomicBool>,
    pub(crate) state: HashMap<String, Value>,
    pub(crate) trace_id: String,
    pub(crate) parent_trace_id: Option<String>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("model", &self.model.model_id())
            .field("tools", &self.tools.names())
            .field("mode", &self.config.mode)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create a new agent builder.
    #[inline]
    #[must_use]
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// The agent's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or("agent")
    }

    /// The agent's description.
    #[inline]
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.config.description.as_deref()
    }

    /// The agent's configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The agent's memory.
    #[inline]
    #[must_use]
    pub const fn memory(&self) -> &AgentMemory {
        &self.memory
    }

    /// The event bus this agent emits on.
    #[inline]
    #[must_use]
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// The wrapped model's id.
    #[inline]
    #[must_use]
    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Names of the registered tools.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names().into_iter().map(str::to_owned).collect()
    }

    /// The run's trace id.
    #[inline]
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// A cancellation handle for this agent. Signalling it interrupts the
    /// run at its next suspension point.
    #[must_use]
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt_flag)
    }

    /// Request the run to stop after the current step.
    #[inline]
    pub fn interrupt(&self) {
        self.interrupt_flag.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt has been requested.
    #[inline]
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt_flag.load(Ordering::SeqCst)
    }

    /// Reset the agent for a fresh task.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.state.clear();
        self.interrupt_flag.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_parent_trace_id(&mut self, parent: impl Into<String>) {
        self.parent_trace_id = Some(parent.into());
    }
}
