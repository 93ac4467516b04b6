//! The ReAct execution loop.
//!
//! One iteration: render memory, call the model through the resilience
//! layer, turn the response into tool calls or a code action, observe the
//! results, append the step, and check the termination predicates in
//! order (final answer, evaluation verdict, step budget, deadline,
//! unrecoverable error, stuck).

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::event::EventKind;
use crate::executor::ExecutionState;
use crate::memory::{
    ActionStep, EvaluationStatus, EvaluationStep, FinalAnswerStep, PlanningStep, Step, Timing,
    ToolCall,
};
use crate::message::{ChatMessage, ChatMessageToolCall};
use crate::model::GenerateOptions;
use crate::sanitize::SanitizerMode;

use super::{Agent, AgentMode, Outcome, RunContext, RunOptions, RunResult};

/// Result of processing one step.
enum StepResult {
    /// Continue to the next iteration.
    Continue,
    /// A final answer was produced.
    FinalAnswer(Value),
}

/// Why the loop stopped.
enum LoopExit {
    /// The executor or `final_answer` tool produced an answer.
    Final(Value),
    /// The evaluator reported the goal achieved with this answer.
    EvalAnswer(Value),
    /// The evaluator judged the run stuck.
    Stuck(Option<String>),
    /// The step budget was exhausted.
    MaxSteps,
    /// The run deadline expired.
    Timeout(f64),
    /// The caller interrupted the run.
    Interrupted,
    /// An unrecoverable error.
    Fatal(AgentError),
}

impl Agent {
    /// Execute a run to completion.
    ///
    /// Never panics and never returns `Err`: every failure mode is folded
    /// into the [`RunResult`] outcome, with the full partial step history
    /// attached.
    #[instrument(skip(self, options), fields(agent = %self.name(), max_steps = self.config.max_steps))]
    pub async fn run(&mut self, options: impl Into<RunOptions>) -> RunResult {
        let options = options.into();
        let mut ctx = RunContext::start();

        if let Err(e) = self.prepare_run(options) {
            error!(error = %e, "Run preparation failed");
            return self.complete_run(LoopExit::Fatal(e), &ctx.finish());
        }

        info!(model = %self.model.model_id(), tools = ?self.tools.names(), "Agent run started");
        let exit = self.execute_loop(&mut ctx).await;
        let ctx = ctx.finish();
        self.complete_run(exit, &ctx)
    }

    /// Reset state as requested, render the system prompt, and seed memory
    /// with the task.
    fn prepare_run(&mut self, options: RunOptions) -> Result<()> {
        if options.reset {
            self.reset();
        }
        self.state.extend(options.context);

        let system = self
            .prompts
            .render_system(&self.tools.definitions(), self.config.custom_instructions.as_deref());
        self.memory.set_system_prompt(system);

        if self.memory.task().is_none() {
            let images = (!options.images.is_empty()).then_some(options.images);
            self.memory.add_task(options.task, images)?;
        }
        Ok(())
    }

    async fn execute_loop(&mut self, ctx: &mut RunContext) -> LoopExit {
        let mut parse_retries = 0usize;

        loop {
            if ctx.step_number > self.config.max_steps {
                return LoopExit::MaxSteps;
            }
            if let Some(max_secs) = self.config.max_duration_secs {
                let elapsed = ctx.timing.elapsed_secs();
                if elapsed > max_secs {
                    return LoopExit::Timeout(elapsed);
                }
            }
            if self.is_interrupted() {
                return LoopExit::Interrupted;
            }

            if self.planning_due(ctx.step_number) {
                match self.planning_phase(ctx).await {
                    Ok(()) => {}
                    Err(e) if e.is_recoverable() => {
                        warn!(error = %e, "Planning phase failed; continuing without a plan");
                    }
                    Err(e) => return LoopExit::Fatal(e),
                }
            }

            let mut step = ActionStep {
                step_number: ctx.step_number,
                timing: Timing::start_now(),
                trace_id: self.trace_id.clone(),
                parent_trace_id: self.parent_trace_id.clone(),
                ..Default::default()
            };
            debug!(step = ctx.step_number, "Starting step");

            let result = self.execute_step(&mut step).await;
            step.timing.complete();
            if let Some(usage) = step.token_usage {
                *ctx = ctx.add_tokens(usage);
            }

            match result {
                Ok(StepResult::FinalAnswer(answer)) => {
                    let observations = step.observations.clone();
                    if let Err(e) = self.memory.append(Step::Action(Box::new(step))) {
                        return LoopExit::Fatal(e);
                    }
                    self.bus.emit(EventKind::StepCompleted {
                        step_number: ctx.step_number,
                        outcome: Outcome::FinalAnswer,
                        observations,
                    });
                    return LoopExit::Final(answer);
                }
                Ok(StepResult::Continue) => {
                    parse_retries = 0;
                    let observations = step.observations.clone();
                    let errored = step.error.is_some();
                    if let Err(e) = self.memory.append(Step::Action(Box::new(step))) {
                        return LoopExit::Fatal(e);
                    }
                    self.bus.emit(EventKind::StepCompleted {
                        step_number: ctx.step_number,
                        outcome: if errored { Outcome::Error } else { Outcome::Partial },
                        observations,
                    });
                }
                Err(e) if e.is_recoverable() => {
                    if matches!(e, AgentError::Parsing { .. }) {
                        parse_retries += 1;
                        if parse_retries > self.config.max_parse_retries {
                            return LoopExit::Fatal(e);
                        }
                        step.error = Some(format!("{e}\n{}", self.parse_guidance()));
                    } else {
                        step.error = Some(e.to_string());
                    }
                    warn!(step = ctx.step_number, error = %e, "Step failed; error observed");
                    self.bus.emit(EventKind::ErrorOccurred {
                        error_class: e.class_name().to_owned(),
                        error_message: e.to_string(),
                        context: format!("step {}", ctx.step_number),
                        recoverable: true,
                        request_id: None,
                    });
                    let observations = step.observations.clone();
                    if let Err(e) = self.memory.append(Step::Action(Box::new(step))) {
                        return LoopExit::Fatal(e);
                    }
                    self.bus.emit(EventKind::StepCompleted {
                        step_number: ctx.step_number,
                        outcome: Outcome::Error,
                        observations,
                    });
                }
                Err(e) => {
                    step.error = Some(e.to_string());
                    let _ = self.memory.append(Step::Action(Box::new(step)));
                    return LoopExit::Fatal(e);
                }
            }

            if self.evaluation_due(ctx.step_number) {
                match self.evaluation_phase(ctx).await {
                    Ok(Some(eval)) => match eval.status {
                        EvaluationStatus::GoalAchieved => {
                            let confident = eval
                                .confidence
                                .is_none_or(|c| c >= self.config.min_confidence);
                            if confident {
                                return LoopExit::EvalAnswer(
                                    eval.answer.unwrap_or(Value::Null),
                                );
                            }
                            debug!("Low-confidence goal_achieved verdict ignored");
                        }
                        EvaluationStatus::Stuck => return LoopExit::Stuck(eval.reasoning),
                        EvaluationStatus::Continue => {}
                    },
                    Ok(None) => {}
                    Err(e) if e.is_recoverable() => {
                        warn!(error = %e, "Evaluation phase failed; continuing");
                    }
                    Err(e) => return LoopExit::Fatal(e),
                }
            }

            *ctx = ctx.advance();
        }
    }

    /// Generate a model response for the current memory and process it.
    async fn execute_step(&self, step: &mut ActionStep) -> Result<StepResult> {
        let messages = self
            .memory
            .render_messages(self.memory_config.as_ref(), self.summarizer.as_ref());

        let mut options = GenerateOptions::new();
        if self.config.mode == AgentMode::ToolCalling {
            options = options.with_tools(self.tools.definitions());
        }
        if let Some(secs) = self.config.model_timeout_secs {
            options = options.with_timeout_secs(secs);
        }

        let response = self.model.generate(messages, options).await?;
        step.assistant_message = Some(response.message.clone());
        step.token_usage = response.token_usage;
        step.model_output = response.message.text_content();

        match self.config.mode {
            AgentMode::CodeAction => self.process_code_action(step).await,
            AgentMode::ToolCalling => {
                let message = response.message.clone();
                self.process_tool_calls(step, &message).await
            }
        }
    }

    /// Run the assistant's code block through the sandbox.
    async fn process_code_action(&self, step: &mut ActionStep) -> Result<StepResult> {
        let raw = step.model_output.clone().unwrap_or_default();
        let code = self.executor.parse(&raw)?;
        step.code_action = Some(code.clone());

        let outcome = self
            .executor
            .execute(&code, &self.tools, &self.bus, &self.state)
            .await;
        step.observations = Some(outcome.observation());

        match outcome.state {
            ExecutionState::FinalAnswer => {
                let answer = outcome.value.unwrap_or(Value::Null);
                step.is_final_answer = true;
                step.action_output = Some(answer.clone());
                Ok(StepResult::FinalAnswer(answer))
            }
            ExecutionState::Success => {
                step.action_output = outcome.value;
                Ok(StepResult::Continue)
            }
            ExecutionState::Error => {
                step.error = outcome.error;
                Ok(StepResult::Continue)
            }
        }
    }

    /// Route each structured tool call through the registry.
    async fn process_tool_calls(
        &self,
        step: &mut ActionStep,
        message: &ChatMessage,
    ) -> Result<StepResult> {
        let Some(tool_calls) = Self::extract_tool_calls(step, message) else {
            return Err(AgentError::parsing(
                step.model_output.clone().unwrap_or_default(),
                "model response contained no tool call",
            ));
        };

        let mut observations = Vec::with_capacity(tool_calls.len());
        let mut final_answer = None;

        for tc in &tool_calls {
            step.tool_calls
                .get_or_insert_with(Vec::new)
                .push(ToolCall::new(&tc.id, tc.name(), tc.arguments().clone()));

            let invocation = self
                .tools
                .invoke(tc.name(), tc.arguments().clone(), &self.bus)
                .await;

            if let Some(pattern) = invocation.injection_pattern
                && self.sanitizer.mode() == SanitizerMode::Fatal
            {
                return Err(AgentError::PromptInjection { pattern });
            }

            if invocation.is_final {
                match invocation.result {
                    Ok(answer) => {
                        step.is_final_answer = true;
                        final_answer = Some(answer);
                        continue;
                    }
                    Err(err) => {
                        step.error = Some(err.to_string());
                        observations.push(invocation.observation);
                        continue;
                    }
                }
            }

            match invocation.result {
                Ok(_) => observations.push(format!(
                    "Tool '{}' returned: {}",
                    invocation.tool_name, invocation.observation
                )),
                Err(crate::error::ToolError::Environment(reason)) => {
                    // A control request with no parent cannot be observed
                    // away; the child terminates with failure.
                    return Err(AgentError::environment(reason));
                }
                Err(err) => {
                    step.error = Some(err.to_string());
                    observations.push(invocation.observation);
                }
            }
        }

        if !observations.is_empty() {
            step.observations = Some(observations.join("\n"));
        }

        match final_answer {
            Some(answer) => {
                step.action_output = Some(answer.clone());
                Ok(StepResult::FinalAnswer(answer))
            }
            None => Ok(StepResult::Continue),
        }
    }

    /// Extract tool calls from the native field, or parse one from text
    /// for models without native tool calling.
    fn extract_tool_calls(
        step: &ActionStep,
        message: &ChatMessage,
    ) -> Option<Vec<ChatMessageToolCall>> {
        if let Some(tc) = &message.tool_calls
            && !tc.is_empty()
        {
            return Some(tc.clone());
        }

        if let Some(text) = &step.model_output {
            if let Some(parsed) = parse_text_tool_call(text) {
                debug!(step = step.step_number, tool = %parsed.name(), "Parsed tool call from text");
                return Some(vec![parsed]);
            }
            debug!(step = step.step_number, "Model returned text without tool call");
        }
        None
    }

    fn parse_guidance(&self) -> &'static str {
        match self.config.mode {
            AgentMode::CodeAction => "Write your action as a single fenced code block.",
            AgentMode::ToolCalling => {
                "Respond with a tool call, or use the 'final_answer' tool to finish."
            }
        }
    }

    fn planning_due(&self, step_number: usize) -> bool {
        let Some(interval) = self.config.planning_interval else {
            return false;
        };
        !self.memory.has_plan() || (step_number > 1 && (step_number - 1) % interval == 0)
    }

    fn evaluation_due(&self, step_number: usize) -> bool {
        self.config
            .evaluation_interval
            .is_some_and(|interval| step_number % interval == 0)
    }

    /// Run the planning phase: one model call whose output becomes a
    /// [`PlanningStep`].
    async fn planning_phase(&mut self, ctx: &mut RunContext) -> Result<()> {
        let initial = !self.memory.has_plan();
        let prompt = if initial {
            &self.prompts.planning.initial_plan
        } else {
            &self.prompts.planning.update_plan
        };

        let mut messages = self
            .memory
            .render_messages(self.memory_config.as_ref(), self.summarizer.as_ref());
        messages.push(ChatMessage::user(prompt));

        let mut timing = Timing::start_now();
        let response = self.model.generate(messages, GenerateOptions::new()).await?;
        timing.complete();

        if let Some(usage) = response.token_usage {
            *ctx = ctx.add_tokens(usage);
        }

        let plan = response.text().unwrap_or_default();
        debug!(initial, "Planning phase completed");
        self.memory.append(Step::Planning(PlanningStep {
            plan,
            token_usage: response.token_usage,
            timing,
        }))
    }

    /// Run the evaluation phase: ask the model to classify the run as
    /// goal_achieved / continue / stuck.
    ///
    /// Evaluation tokens count toward the run total but the phase does not
    /// consume a step number. Malformed verdicts are dropped with a
    /// warning rather than failing the run.
    async fn evaluation_phase(&mut self, ctx: &mut RunContext) -> Result<Option<EvaluationStep>> {
        let mut messages = self
            .memory
            .render_messages(self.memory_config.as_ref(), self.summarizer.as_ref());
        messages.push(ChatMessage::user(&self.prompts.evaluation.instruction));

        let response = self.model.generate(messages, GenerateOptions::new()).await?;
        if let Some(usage) = response.token_usage {
            *ctx = ctx.add_tokens(usage);
        }

        let text = response.text().unwrap_or_default();
        let Some(eval) = parse_evaluation(&text) else {
            warn!(output = %text, "Evaluator returned an unparseable verdict");
            return Ok(None);
        };

        self.bus.emit(EventKind::EvaluationCompleted {
            step_number: ctx.step_number,
            status: eval.status,
            answer: eval.answer.clone(),
            reasoning: eval.reasoning.clone(),
        });
        self.memory.append(Step::Evaluation(eval.clone()))?;
        Ok(Some(eval))
    }

    /// Seal memory, emit `TaskCompleted`, and assemble the result.
    fn complete_run(&mut self, exit: LoopExit, ctx: &RunContext) -> RunResult {
        let (output, outcome, error) = match exit {
            LoopExit::Final(answer) | LoopExit::EvalAnswer(answer) => {
                let _ = self.memory.append(Step::FinalAnswer(FinalAnswerStep {
                    output: answer.clone(),
                }));
                info!(
                    input_tokens = ctx.total_tokens.input_tokens,
                    output_tokens = ctx.total_tokens.output_tokens,
                    "Agent run completed",
                );
                (Some(answer), Outcome::Success, None)
            }
            LoopExit::Stuck(reasoning) => {
                let message =
                    reasoning.unwrap_or_else(|| "evaluator judged the run stuck".to_owned());
                warn!(reason = %message, "Agent run stuck");
                (None, Outcome::Failure, Some(message))
            }
            LoopExit::MaxSteps => {
                warn!(max_steps = self.config.max_steps, "Max steps exhausted");
                (
                    None,
                    Outcome::MaxStepsReached,
                    Some(format!(
                        "reached maximum steps ({})",
                        self.config.max_steps
                    )),
                )
            }
            LoopExit::Timeout(elapsed) => {
                warn!(elapsed_secs = elapsed, "Run deadline exceeded");
                (
                    None,
                    Outcome::Timeout,
                    Some(format!("deadline exceeded after {elapsed:.1}s")),
                )
            }
            LoopExit::Interrupted => (
                None,
                Outcome::Error,
                Some("agent execution was interrupted".to_owned()),
            ),
            LoopExit::Fatal(e) => {
                error!(error = %e, "Agent run failed");
                self.bus.emit(EventKind::ErrorOccurred {
                    error_class: e.class_name().to_owned(),
                    error_message: e.to_string(),
                    context: "run".to_owned(),
                    recoverable: false,
                    request_id: None,
                });
                // A missing parent environment fails the child rather than
                // erroring it; everything else is an error outcome.
                let outcome = if matches!(e, AgentError::Environment { .. }) {
                    Outcome::Failure
                } else {
                    Outcome::Error
                };
                (None, outcome, Some(e.to_string()))
            }
        };

        let steps = self.memory.steps().to_vec();
        let steps_taken = steps.iter().filter(|s| s.as_action().is_some()).count();

        self.bus.emit(EventKind::TaskCompleted {
            outcome,
            output: output.clone(),
            steps_taken,
        });

        RunResult {
            output,
            outcome,
            steps,
            token_usage: ctx.total_tokens,
            timing: ctx.timing,
            error,
        }
    }
}

/// Find and parse the first JSON object embedded in text.
fn find_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&text[start..=start + i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a tool call from free text (`{"name": ..., "arguments": ...}`).
fn parse_text_tool_call(text: &str) -> Option<ChatMessageToolCall> {
    let json = find_json_object(text)?;
    let name = json.get("name")?.as_str()?;
    let arguments = json
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::default()));

    Some(ChatMessageToolCall::new(
        format!("text_parsed_{}", Uuid::new_v4().simple()),
        name.to_owned(),
        arguments,
    ))
}

/// Parse the evaluator's JSON verdict.
fn parse_evaluation(text: &str) -> Option<EvaluationStep> {
    let json = find_json_object(text)?;
    let status = match json.get("status")?.as_str()? {
        "goal_achieved" => EvaluationStatus::GoalAchieved,
        "continue" => EvaluationStatus::Continue,
        "stuck" => EvaluationStatus::Stuck,
        _ => return None,
    };

    let answer = json.get("answer").filter(|v| !v.is_null()).cloned();
    let reasoning = json
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let confidence = json
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0));

    Some(EvaluationStep {
        status,
        answer,
        reasoning,
        confidence,
    })
}
