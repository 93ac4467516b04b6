//! Convenience re-exports for common usage.

pub use crate::agent::{
    Agent, AgentBuilder, AgentConfig, AgentMode, Outcome, RunContext, RunOptions, RunResult,
};
pub use crate::error::{AgentError, ModelError, Result, ToolError};
pub use crate::event::{AgentEvent, EventBus, EventKind, Subscriber};
pub use crate::executor::{CodeExecutor, CodeValidator, ExecutionOutcome, ExecutionState};
pub use crate::memory::{
    ActionStep, AgentMemory, EvaluationStatus, EvaluationStep, FinalAnswerStep, MemoryConfig,
    MemoryStrategy, PlanningStep, Step, SystemPromptStep, TaskStep, Timing, ToolCall,
};
pub use crate::message::{ChatMessage, ChatMessageToolCall, MessageContent, MessageRole};
pub use crate::model::{
    GenerateOptions, MockModel, MockReply, Model, ModelConfig, ModelResponse,
};
pub use crate::orchestrator::{
    AgentPool, ContextScope, ControlClient, ControlHandler, ControlRequest, ControlResponse,
    Orchestrator, OrchestratorResult, ScopeLevel, SpawnConfig, control_channel,
};
pub use crate::prompts::PromptTemplates;
pub use crate::resilience::{CircuitBreaker, ErrorCategory, ResilientModel, RetryPolicy};
pub use crate::sanitize::{Sanitizer, SanitizerMode};
pub use crate::tool::{
    BoxedTool, DynTool, FinalAnswerTool, Tool, ToolDefinition, ToolRegistry, UserInputTool,
};
pub use crate::usage::TokenUsage;
