//! End-to-end tests for the reagent execution core.

#![allow(clippy::unwrap_used, clippy::panic, clippy::print_stdout)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use reagent::prelude::*;

/// A simple echo tool for testing.
#[derive(Debug, Clone, Copy, Default)]
struct EchoTool;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EchoArgs {
    message: String,
}

#[async_trait]
impl Tool for EchoTool {
    const NAME: &'static str = "echo";
    type Args = EchoArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Echoes back the input message.".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "The message to echo"}
            },
            "required": ["message"]
        })
    }

    async fn call(&self, args: Self::Args) -> std::result::Result<Self::Output, Self::Error> {
        Ok(args.message)
    }
}

/// A search tool returning canned results.
#[derive(Debug, Clone, Copy, Default)]
struct SearchTool;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl Tool for SearchTool {
    const NAME: &'static str = "search";
    type Args = SearchArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Searches the web.".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"}
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: Self::Args) -> std::result::Result<Self::Output, Self::Error> {
        Ok(format!("Top results for '{}'", args.query))
    }
}

/// A search tool that hits a rate limit on its first call.
#[derive(Debug, Default)]
struct FlakySearchTool {
    calls: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl Tool for FlakySearchTool {
    const NAME: &'static str = "search";
    type Args = SearchArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Searches the web, flakily.".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"}
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: Self::Args) -> std::result::Result<Self::Output, Self::Error> {
        if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
            Err(ToolError::RateLimited {
                retry_after_secs: 1.0,
                message: "quota exceeded".to_string(),
            })
        } else {
            Ok(format!("Top results for '{}'", args.query))
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("reagent=debug")
        .try_init();
}

/// Collects every event emitted on a bus.
fn record_events(bus: &EventBus) -> Arc<Mutex<Vec<AgentEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    bus.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    log
}

fn names(log: &Arc<Mutex<Vec<AgentEvent>>>) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .map(|e| e.name().to_string())
        .collect()
}

fn count(log: &Arc<Mutex<Vec<AgentEvent>>>, name: &str) -> usize {
    names(log).iter().filter(|n| n.as_str() == name).count()
}

// ---------------------------------------------------------------------------
// Scenario 1: single-shot final answer in code-action mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn code_action_single_shot_final_answer() {
    init_tracing();
    let bus = Arc::new(EventBus::new());
    let log = record_events(&bus);

    let mut agent = Agent::builder()
        .model(MockModel::from_texts(vec![
            "<code>final_answer(answer: 4)</code>".to_string(),
        ]))
        .config(AgentConfig::new().with_mode(AgentMode::CodeAction))
        .bus(Arc::clone(&bus))
        .try_build()
        .unwrap();

    let result = agent.run("What is 2+2?").await;

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.output, Some(json!(4)));
    assert_eq!(result.steps_taken(), 1);

    // StepCompleted(final_answer) then TaskCompleted, in that order.
    let events = log.lock().unwrap();
    let step = events
        .iter()
        .position(|e| {
            matches!(
                e.kind,
                EventKind::StepCompleted {
                    step_number: 1,
                    outcome: Outcome::FinalAnswer,
                    ..
                }
            )
        })
        .expect("step_completed emitted");
    let task = events
        .iter()
        .position(|e| matches!(e.kind, EventKind::TaskCompleted { .. }))
        .expect("task_completed emitted");
    assert!(step < task);
    // No events after TaskCompleted.
    assert_eq!(task, events.len() - 1);
}

// ---------------------------------------------------------------------------
// Scenario 2: two-step tool calling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_step_tool_calling_run() {
    let bus = Arc::new(EventBus::new());
    let log = record_events(&bus);

    let mut agent = Agent::builder()
        .model(
            MockModel::new(vec![
                MockReply::ToolCall {
                    name: "search".to_string(),
                    arguments: json!({"query": "Ruby news"}),
                },
                MockReply::ToolCall {
                    name: "final_answer".to_string(),
                    arguments: json!({"answer": "Ruby 4.0 was announced"}),
                },
            ])
            .with_usage(TokenUsage::new(10, 5)),
        )
        .tool(Box::new(SearchTool))
        .bus(Arc::clone(&bus))
        .try_build()
        .unwrap();

    let result = agent.run("Search Ruby news and answer").await;

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.output, Some(json!("Ruby 4.0 was announced")));
    assert_eq!(result.steps_taken(), 2);

    assert_eq!(count(&log, "tool_call_requested"), 2);
    assert_eq!(count(&log, "tool_call_completed"), 2);
    assert_eq!(count(&log, "step_completed"), 2);

    // Both model calls counted toward the run total.
    assert_eq!(result.token_usage, TokenUsage::new(20, 10));

    // The search observation made it into memory.
    let observations: Vec<_> = result
        .steps
        .iter()
        .filter_map(|s| s.as_action())
        .filter_map(|a| a.observations.clone())
        .collect();
    assert!(observations.iter().any(|o| o.contains("Ruby news")));
}

// ---------------------------------------------------------------------------
// Scenario 3: rate-limit retry inside a step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tool_rate_limit_is_retried_and_recovered() {
    let bus = Arc::new(EventBus::new());
    let log = record_events(&bus);

    let mut agent = Agent::builder()
        .model(MockModel::new(vec![
            MockReply::ToolCall {
                name: "search".to_string(),
                arguments: json!({"query": "Ruby news"}),
            },
            MockReply::ToolCall {
                name: "final_answer".to_string(),
                arguments: json!({"answer": "done"}),
            },
        ]))
        .tool(Box::new(FlakySearchTool::default()))
        .retry(RetryPolicy::default().with_max_attempts(3))
        .bus(Arc::clone(&bus))
        .try_build()
        .unwrap();

    let result = agent.run("Search Ruby news").await;

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(count(&log, "rate_limit_hit"), 1);

    // Exactly one completion for the search call, with a real result.
    let completed_search = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| {
            matches!(
                &e.kind,
                EventKind::ToolCallCompleted { tool_name, result, .. }
                    if tool_name == "search" && result.is_some()
            )
        })
        .count();
    assert_eq!(completed_search, 1);

    // The rate-limited step waited out the retry_after interval.
    let first_step = result
        .steps
        .iter()
        .filter_map(|s| s.as_action())
        .next()
        .unwrap();
    assert!(first_step.timing.duration_secs().unwrap() >= 1.0);

    // Step durations never exceed the run duration.
    let step_total: f64 = result
        .steps
        .iter()
        .filter_map(|s| s.as_action())
        .filter_map(|a| a.timing.duration_secs())
        .sum();
    assert!(step_total <= result.duration_secs());
}

// ---------------------------------------------------------------------------
// Scenario 4: step budget exhaustion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn max_steps_reached_preserves_history() {
    let bus = Arc::new(EventBus::new());
    let log = record_events(&bus);

    let mut agent = Agent::builder()
        .model(MockModel::new(vec![MockReply::ToolCall {
            name: "echo".to_string(),
            arguments: json!({"message": "still going"}),
        }]))
        .tool(Box::new(EchoTool))
        .config(AgentConfig::new().with_max_steps(3))
        .bus(Arc::clone(&bus))
        .try_build()
        .unwrap();

    let result = agent.run("Never finishes").await;

    assert_eq!(result.outcome, Outcome::MaxStepsReached);
    assert!(result.outcome.is_retriable());
    assert!(result.output.is_none());
    assert_eq!(result.steps_taken(), 3);

    let events = log.lock().unwrap();
    let task_completed = events
        .iter()
        .find(|e| matches!(e.kind, EventKind::TaskCompleted { .. }))
        .expect("task_completed emitted");
    match &task_completed.kind {
        EventKind::TaskCompleted {
            outcome,
            steps_taken,
            ..
        } => {
            assert_eq!(*outcome, Outcome::MaxStepsReached);
            assert_eq!(*steps_taken, 3);
        }
        _ => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Scenario 5: sub-agent with observations scope
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sub_agent_inherits_parent_observations() {
    let parent_bus = Arc::new(EventBus::new());
    let log = record_events(&parent_bus);

    // Parent memory with two observed action steps.
    let mut parent_memory = AgentMemory::new("You are the parent.");
    parent_memory.add_task("Research Ruby", None).unwrap();
    for (i, obs) in ["A", "B"].iter().enumerate() {
        parent_memory
            .append(Step::Action(Box::new(ActionStep {
                step_number: i + 1,
                observations: Some((*obs).to_string()),
                ..Default::default()
            })))
            .unwrap();
    }

    let orchestrator = Orchestrator::new(
        SpawnConfig::new(2).with_allowed_models(["mock-model"]),
        Arc::clone(&parent_bus),
        "parent-trace",
    );

    let child = Agent::builder()
        .model(MockModel::new(vec![MockReply::ToolCall {
            name: "final_answer".to_string(),
            arguments: json!({"answer": "child done"}),
        }]))
        .config(AgentConfig::new().with_name("summarizer"))
        .try_build()
        .unwrap();

    let result = orchestrator
        .spawn(child, "T", &ContextScope::observations(), &parent_memory)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Success);

    // The child's task step carries the task and the joined observations.
    let task_text = result
        .steps
        .iter()
        .find_map(|s| match s {
            Step::Task(t) => Some(t.task.clone()),
            _ => None,
        })
        .expect("child has a task step");
    assert!(task_text.contains('T'));
    assert!(task_text.contains("parent_observations"));
    assert!(task_text.contains("A\n---\nB"));

    // Launch and completion events share the launch id and the parent id.
    let events = log.lock().unwrap();
    let launch = events
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::SubAgentLaunched {
                launch_id,
                parent_id,
                agent_name,
                ..
            } => Some((launch_id.clone(), parent_id.clone(), agent_name.clone())),
            _ => None,
        })
        .expect("sub_agent_launched emitted");
    assert_eq!(launch.1, "parent-trace");
    assert_eq!(launch.2, "summarizer");

    let completed = events
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::SubAgentCompleted {
                launch_id, outcome, ..
            } => Some((launch_id.clone(), *outcome)),
            _ => None,
        })
        .expect("sub_agent_completed emitted");
    assert_eq!(completed.0, launch.0);
    assert_eq!(completed.1, Outcome::Success);

    // Progress events were relayed from the child's bus.
    assert!(count(&log, "sub_agent_progress") >= 1);
    assert_eq!(orchestrator.active_children(), 0);
}

#[tokio::test]
async fn spawn_rejections_surface_to_the_caller() {
    let bus = Arc::new(EventBus::new());
    let memory = AgentMemory::new("parent");

    // Disallowed model.
    let orchestrator = Orchestrator::new(
        SpawnConfig::new(1).with_allowed_models(["some-other-model"]),
        Arc::clone(&bus),
        "parent-trace",
    );
    let child = Agent::builder()
        .model(MockModel::from_texts(vec!["hi".to_string()]))
        .try_build()
        .unwrap();
    let err = orchestrator
        .spawn(child, "T", &ContextScope::task_only(), &memory)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Spawn { .. }));

    // Disallowed tool.
    let orchestrator = Orchestrator::new(
        SpawnConfig::new(1).with_allowed_tools(["final_answer"]),
        Arc::clone(&bus),
        "parent-trace",
    );
    let child = Agent::builder()
        .model(MockModel::from_texts(vec!["hi".to_string()]))
        .tool(Box::new(EchoTool))
        .try_build()
        .unwrap();
    let err = orchestrator
        .spawn(child, "T", &ContextScope::task_only(), &memory)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("echo"));

    // Spawning disabled entirely.
    let orchestrator = Orchestrator::new(SpawnConfig::default(), bus, "parent-trace");
    let child = Agent::builder()
        .model(MockModel::from_texts(vec!["hi".to_string()]))
        .try_build()
        .unwrap();
    assert!(
        orchestrator
            .spawn(child, "T", &ContextScope::task_only(), &memory)
            .await
            .is_err()
    );
}

// ---------------------------------------------------------------------------
// Scenario 6: control yield and resume
// ---------------------------------------------------------------------------

struct PickFirstOption;

#[async_trait]
impl ControlHandler for PickFirstOption {
    async fn handle(&self, request: &ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::UserInput {
                options: Some(options),
                ..
            } => ControlResponse::approve(options[0].clone()),
            _ => ControlResponse::deny(),
        }
    }
}

#[tokio::test]
async fn control_yield_resume_round_trip() {
    let child_bus = Arc::new(EventBus::new());
    let log = record_events(&child_bus);

    let (client, listener) = control_channel(Arc::clone(&child_bus));
    tokio::spawn(listener.serve(Arc::new(PickFirstOption)));

    let mut child = Agent::builder()
        .model(MockModel::new(vec![
            MockReply::ToolCall {
                name: "user_input".to_string(),
                arguments: json!({"question": "file?", "options": ["a.rb", "b.rb"]}),
            },
            MockReply::ToolCall {
                name: "final_answer".to_string(),
                arguments: json!({"answer": "picked"}),
            },
        ]))
        .control(client)
        .bus(Arc::clone(&child_bus))
        .try_build()
        .unwrap();

    let result = child.run("Pick a file").await;

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(count(&log, "control_yielded"), 1);
    assert_eq!(count(&log, "control_resumed"), 1);

    // The returned value landed in the child's memory as an observation.
    let observations: Vec<_> = result
        .steps
        .iter()
        .filter_map(|s| s.as_action())
        .filter_map(|a| a.observations.clone())
        .collect();
    assert!(observations.iter().any(|o| o.contains("a.rb")));

    let yielded = log
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::ControlYielded {
                request_type,
                request_id,
                ..
            } => Some((request_type.clone(), request_id.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(yielded.0, "user_input");

    let resumed = log
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::ControlResumed {
                request_id,
                approved,
                value,
            } => Some((request_id.clone(), *approved, value.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(resumed.0, yielded.1);
    assert!(resumed.1);
    assert_eq!(resumed.2, Some(json!("a.rb")));
}

#[tokio::test]
async fn user_input_without_parent_fails_the_child() {
    // No control channel attached: the environment error fails the run.
    let mut agent = Agent::builder()
        .model(MockModel::new(vec![MockReply::ToolCall {
            name: "user_input".to_string(),
            arguments: json!({"question": "file?"}),
        }]))
        .tool(Box::new(UserInputTool::default()))
        .try_build()
        .unwrap();

    let result = agent.run("Ask the user").await;

    assert_eq!(result.outcome, Outcome::Failure);
    assert!(result.error.as_deref().unwrap().contains("no parent"));
    // The partial history is preserved.
    assert_eq!(result.steps_taken(), 1);
}

// ---------------------------------------------------------------------------
// Memory invariants across a run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persisted_memory_round_trips_after_a_run() -> anyhow::Result<()> {
    let mut agent = Agent::builder()
        .model(MockModel::new(vec![
            MockReply::ToolCall {
                name: "echo".to_string(),
                arguments: json!({"message": "one"}),
            },
            MockReply::ToolCall {
                name: "final_answer".to_string(),
                arguments: json!({"answer": "two"}),
            },
        ]))
        .tool(Box::new(EchoTool))
        .try_build()?;

    let result = agent.run("Echo then answer").await;
    assert_eq!(result.outcome, Outcome::Success);

    // Serialize, reload, and validate the structural invariants.
    let records: Vec<Step> = agent
        .memory()
        .replay()
        .into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<_, _>>()?;
    assert_eq!(records[0].step_type(), "system_prompt");
    assert_eq!(records[1].step_type(), "task");

    let loaded = AgentMemory::load(records)?;
    assert_eq!(loaded.step_count(), agent.memory().step_count());

    // The final-answer action step is the last action step.
    let finals: Vec<usize> = loaded
        .steps()
        .iter()
        .enumerate()
        .filter(|(_, s)| s.as_action().is_some_and(|a| a.is_final_answer))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(finals.len(), 1);
    let last_action = loaded
        .steps()
        .iter()
        .rposition(|s| s.as_action().is_some())
        .unwrap();
    assert_eq!(finals[0], last_action);
    Ok(())
}

// ---------------------------------------------------------------------------
// Evaluation phase
// ---------------------------------------------------------------------------

#[tokio::test]
async fn evaluation_goal_achieved_terminates_the_run() {
    let bus = Arc::new(EventBus::new());
    let log = record_events(&bus);

    let mut agent = Agent::builder()
        .model(MockModel::new(vec![
            // Step 1: a non-final tool call.
            MockReply::ToolCall {
                name: "echo".to_string(),
                arguments: json!({"message": "42"}),
            },
            // Evaluation verdict after step 1.
            MockReply::Text(
                r#"{"status": "goal_achieved", "answer": "42", "reasoning": "echoed", "confidence": 0.95}"#
                    .to_string(),
            ),
        ]))
        .tool(Box::new(EchoTool))
        .config(AgentConfig::new().with_evaluation_interval(1))
        .bus(Arc::clone(&bus))
        .try_build()
        .unwrap();

    let result = agent.run("What is the answer?").await;

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.output, Some(json!("42")));
    assert_eq!(count(&log, "evaluation_completed"), 1);
}

#[tokio::test]
async fn evaluation_stuck_fails_the_run() {
    let mut agent = Agent::builder()
        .model(MockModel::new(vec![
            MockReply::ToolCall {
                name: "echo".to_string(),
                arguments: json!({"message": "loop"}),
            },
            MockReply::Text(
                r#"{"status": "stuck", "answer": null, "reasoning": "going in circles"}"#
                    .to_string(),
            ),
        ]))
        .tool(Box::new(EchoTool))
        .config(AgentConfig::new().with_evaluation_interval(1))
        .try_build()
        .unwrap();

    let result = agent.run("Unachievable").await;

    assert_eq!(result.outcome, Outcome::Failure);
    assert!(result.error.as_deref().unwrap().contains("circles"));
}

#[tokio::test]
async fn low_confidence_goal_achieved_is_ignored() {
    let mut agent = Agent::builder()
        .model(MockModel::new(vec![
            MockReply::ToolCall {
                name: "echo".to_string(),
                arguments: json!({"message": "maybe"}),
            },
            MockReply::Text(
                r#"{"status": "goal_achieved", "answer": "maybe", "confidence": 0.1}"#.to_string(),
            ),
            MockReply::ToolCall {
                name: "final_answer".to_string(),
                arguments: json!({"answer": "certain"}),
            },
        ]))
        .tool(Box::new(EchoTool))
        .config(
            AgentConfig::new()
                .with_evaluation_interval(1)
                .with_min_confidence(0.8),
        )
        .try_build()
        .unwrap();

    let result = agent.run("Be sure").await;

    // The weak verdict was ignored; the run continued to a real answer.
    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.output, Some(json!("certain")));
}

// ---------------------------------------------------------------------------
// Planning phase
// ---------------------------------------------------------------------------

#[tokio::test]
async fn planning_step_precedes_the_first_action() {
    let mut agent = Agent::builder()
        .model(MockModel::new(vec![
            // Planning call answers first.
            MockReply::Text("1. Echo the number. 2. Answer.".to_string()),
            MockReply::ToolCall {
                name: "final_answer".to_string(),
                arguments: json!({"answer": "done"}),
            },
        ]))
        .config(AgentConfig::new().with_planning_interval(5))
        .try_build()
        .unwrap();

    let result = agent.run("Plan then act").await;

    assert_eq!(result.outcome, Outcome::Success);
    let types: Vec<_> = result.steps.iter().map(Step::step_type).collect();
    let plan_pos = types.iter().position(|t| *t == "planning").unwrap();
    let action_pos = types.iter().position(|t| *t == "action").unwrap();
    assert!(plan_pos < action_pos);
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn model_failure_after_retries_is_a_terminal_error() {
    let mut agent = Agent::builder()
        .model(MockModel::new(vec![MockReply::Error(
            ModelError::new("mock-model", "internal error").with_status(500),
        )]))
        .retry(RetryPolicy::default().with_max_attempts(2).with_intervals(0.01, 0.02))
        .try_build()
        .unwrap();

    let result = agent.run("Doomed").await;

    assert_eq!(result.outcome, Outcome::Error);
    assert!(result.error.is_some());
    assert!(result.outcome.is_terminal());
}

#[tokio::test]
async fn run_deadline_yields_timeout_outcome() {
    let mut agent = Agent::builder()
        .model(MockModel::new(vec![MockReply::ToolCall {
            name: "echo".to_string(),
            arguments: json!({"message": "spin"}),
        }]))
        .tool(Box::new(EchoTool))
        .config(
            AgentConfig::new()
                .with_max_steps(1000)
                .with_max_duration_secs(0.000_001),
        )
        .try_build()
        .unwrap();

    let result = agent.run("Slow task").await;
    assert_eq!(result.outcome, Outcome::Timeout);
}

#[tokio::test]
async fn interrupted_run_terminates_with_error() {
    let mut agent = Agent::builder()
        .model(MockModel::new(vec![MockReply::ToolCall {
            name: "echo".to_string(),
            arguments: json!({"message": "spin"}),
        }]))
        .tool(Box::new(EchoTool))
        .try_build()
        .unwrap();

    // Interrupt before the run starts; prepare_run keeps the flag because
    // the handle is cancelled again right after reset.
    let handle = agent.cancellation_handle();
    let bus = agent.bus();
    bus.subscribe(move |_| handle.store(true, std::sync::atomic::Ordering::SeqCst));

    let result = agent.run("Spin forever").await;
    assert_eq!(result.outcome, Outcome::Error);
    assert!(result.error.as_deref().unwrap().contains("interrupted"));
}

// ---------------------------------------------------------------------------
// Agent pool fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pool_fans_out_independent_runs() {
    let make_agent = |answer: &str| {
        Agent::builder()
            .model(MockModel::new(vec![MockReply::ToolCall {
                name: "final_answer".to_string(),
                arguments: json!({"answer": answer}),
            }]))
            .try_build()
            .unwrap()
    };

    let jobs = vec![
        (make_agent("one"), RunOptions::new("task one")),
        (make_agent("two"), RunOptions::new("task two")),
        (make_agent("three"), RunOptions::new("task three")),
    ];

    let pool = AgentPool::new(2);
    let result = pool.run_all(jobs).await;

    assert_eq!(result.total(), 3);
    assert_eq!(result.succeeded.len(), 3);
    assert!(result.failed.is_empty());

    let outputs: Vec<_> = result
        .succeeded
        .iter()
        .filter_map(|r| r.output.clone())
        .collect();
    assert!(outputs.contains(&json!("one")));
    assert!(outputs.contains(&json!("three")));
}

// ---------------------------------------------------------------------------
// Memory budget strategies through the agent surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn masked_memory_preserves_recent_observations() {
    let mut agent = Agent::builder()
        .model(MockModel::new(vec![MockReply::ToolCall {
            name: "echo".to_string(),
            arguments: json!({"message": "observation payload"}),
        }]))
        .tool(Box::new(EchoTool))
        .config(AgentConfig::new().with_max_steps(5))
        .memory_config(MemoryConfig::new(MemoryStrategy::Mask).with_preserve_recent(2))
        .try_build()
        .unwrap();

    let result = agent.run("Loop a while").await;
    assert_eq!(result.outcome, Outcome::MaxStepsReached);

    // Rendering masks all but the last two observations.
    let rendered = agent.memory().render_messages(
        Some(&MemoryConfig::new(MemoryStrategy::Mask).with_preserve_recent(2)),
        None,
    );
    let text: String = rendered
        .iter()
        .filter_map(|m| m.text_content())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(text.contains("[observations truncated]"));
    assert!(text.contains("observation payload"));
}
