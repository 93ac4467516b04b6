//! Reagent is a ReAct-style execution core for LLM tool-using agents: it
//! turns a task, a model, and a set of tools into a bounded, observable,
//! fault-tolerant reasoning loop.
//!
//! The crate is the core only. Concrete model HTTP clients, real web
//! tools, CLIs, and telemetry exporters live outside: the core consumes
//! the [`model::Model`] and [`tool::Tool`] contracts and emits
//! [`event::AgentEvent`]s for exporters to subscribe to.
//!
//! # Example
//!
//! ```rust,ignore
//! use reagent::prelude::*;
//!
//! let mut agent = Agent::builder()
//!     .model(my_model)
//!     .tool(Box::new(MyTool))
//!     .config(AgentConfig::new().with_max_steps(10))
//!     .try_build()?;
//!
//! let result = agent.run("What is 2 + 2?").await;
//! ```

// Core value types
pub mod error;
pub mod message;
pub mod usage;

// Subsystems
pub mod agent;
pub mod event;
pub mod executor;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod prompts;
pub mod resilience;
pub mod sanitize;
pub mod tool;

pub mod prelude;

// Re-export the types nearly every caller touches.
pub use agent::{Agent, AgentConfig, Outcome, RunResult};
pub use error::{AgentError, Result};
pub use event::{AgentEvent, EventBus};
