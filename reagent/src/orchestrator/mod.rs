//! Sub-agent orchestration: spawning, context inheritance, cooperative
//! control, and parallel fan-out.
//!
//! Sub-agents run independent scheduler instances and share no mutable
//! state with their parent; they receive context extracted from the
//! parent's memory under a [`ContextScope`] and report back through
//! events correlated by launch id.

mod control;
mod pool;
mod scope;

pub use control::{
    ControlClient, ControlHandler, ControlListener, ControlRequest, ControlResponse,
    control_channel,
};
pub use pool::{AgentPool, OrchestratorResult};
pub use scope::{
    ContextScope, InheritedContext, OBSERVATION_DELIMITER, ScopeLevel, SpawnConfig,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;
use uuid::Uuid;

use crate::agent::{Agent, RunResult};
use crate::error::{AgentError, Result};
use crate::event::{EventBus, EventKind};
use crate::memory::AgentMemory;

/// Spawns and supervises child agents on behalf of a parent run.
pub struct Orchestrator {
    config: SpawnConfig,
    bus: Arc<EventBus>,
    parent_trace_id: String,
    active_children: Arc<AtomicUsize>,
}

/// Decrements the active-children count when a child finishes.
struct ChildGuard(Arc<AtomicUsize>);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Orchestrator {
    /// Create an orchestrator emitting sub-agent events on `bus`.
    #[must_use]
    pub fn new(config: SpawnConfig, bus: Arc<EventBus>, parent_trace_id: impl Into<String>) -> Self {
        Self {
            config,
            bus,
            parent_trace_id: parent_trace_id.into(),
            active_children: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The spawn policy.
    #[must_use]
    pub const fn config(&self) -> &SpawnConfig {
        &self.config
    }

    /// Number of currently active children.
    #[must_use]
    pub fn active_children(&self) -> usize {
        self.active_children.load(Ordering::SeqCst)
    }

    /// Spawn a child agent on a task and run it to completion.
    ///
    /// The child inherits context from `parent_memory` under `scope`. The
    /// spawn is rejected when the policy forbids the child's model or
    /// tools, or when `max_children` children are already active;
    /// rejections surface to the caller and the parent run may continue.
    pub async fn spawn(
        &self,
        mut child: Agent,
        task: &str,
        scope: &ContextScope,
        parent_memory: &AgentMemory,
    ) -> Result<RunResult> {
        if let Err(e) = self.admit(&child) {
            self.bus.emit(EventKind::ErrorOccurred {
                error_class: e.class_name().to_owned(),
                error_message: e.to_string(),
                context: "spawn".to_owned(),
                recoverable: true,
                request_id: None,
            });
            return Err(e);
        }

        self.active_children
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.config.max_children).then_some(n + 1)
            })
            .map_err(|_| {
                let e = AgentError::spawn(format!(
                    "active children limit reached ({})",
                    self.config.max_children
                ));
                self.bus.emit(EventKind::ErrorOccurred {
                    error_class: e.class_name().to_owned(),
                    error_message: e.to_string(),
                    context: "spawn".to_owned(),
                    recoverable: true,
                    request_id: None,
                });
                e
            })?;
        let _guard = ChildGuard(Arc::clone(&self.active_children));

        let launch_id = Uuid::new_v4().to_string();
        let agent_name = child.name().to_owned();
        info!(agent = %agent_name, launch_id = %launch_id, "Launching sub-agent");

        self.bus.emit(EventKind::SubAgentLaunched {
            launch_id: launch_id.clone(),
            agent_name,
            task: task.to_owned(),
            parent_id: self.parent_trace_id.clone(),
        });

        child.set_parent_trace_id(&self.parent_trace_id);

        // Relay the child's step completions as progress on the parent bus.
        let child_bus = child.bus();
        let relay = {
            let parent_bus = Arc::clone(&self.bus);
            let launch_id = launch_id.clone();
            child_bus.subscribe(move |event| {
                if let EventKind::StepCompleted {
                    step_number,
                    outcome,
                    ..
                } = &event.kind
                {
                    parent_bus.emit(EventKind::SubAgentProgress {
                        launch_id: launch_id.clone(),
                        step_number: *step_number,
                        message: format!("step {step_number} completed ({outcome})"),
                    });
                }
            })
        };

        let inherited = scope.extract_from(parent_memory, task);
        let result = child.run(inherited.into_task_text()).await;

        child_bus.unsubscribe(relay);

        self.bus.emit(EventKind::SubAgentCompleted {
            launch_id,
            outcome: result.outcome,
            output: result.output.clone(),
        });

        Ok(result)
    }

    fn admit(&self, child: &Agent) -> Result<()> {
        if !self.config.enabled() {
            return Err(AgentError::spawn("sub-agent spawning is disabled"));
        }
        self.config.check_model(child.model_id())?;
        self.config
            .check_tools(child.tool_names().iter().map(String::as_str))?;
        Ok(())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("max_children", &self.config.max_children)
            .field("active_children", &self.active_children())
            .finish_non_exhaustive()
    }
}
