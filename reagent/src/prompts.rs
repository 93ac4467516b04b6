//! Prompt templates for agent system prompts.
//!
//! Templates carry `{{tools}}` and `{{custom_instructions}}` slots filled
//! at run preparation from the registered tool definitions and the agent
//! config.

use serde::{Deserialize, Serialize};

use crate::tool::ToolDefinition;

/// Complete prompt templates for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// Main system prompt.
    pub system_prompt: String,
    /// Planning prompt templates.
    pub planning: PlanningPrompts,
    /// Evaluation prompt template.
    pub evaluation: EvaluationPrompts,
}

/// Planning-related prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningPrompts {
    /// Prompt for the initial plan.
    pub initial_plan: String,
    /// Prompt for plan updates at later planning steps.
    pub update_plan: String,
}

/// Evaluation prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationPrompts {
    /// Instruction asking the model to classify the run state.
    pub instruction: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::tool_calling_agent()
    }
}

impl PromptTemplates {
    /// Default prompts for a tool-calling agent.
    #[must_use]
    pub fn tool_calling_agent() -> Self {
        Self {
            system_prompt: TOOL_CALLING_SYSTEM_PROMPT.to_owned(),
            planning: PlanningPrompts::default(),
            evaluation: EvaluationPrompts::default(),
        }
    }

    /// Default prompts for a code-action agent.
    #[must_use]
    pub fn code_agent() -> Self {
        Self {
            system_prompt: CODE_ACTION_SYSTEM_PROMPT.to_owned(),
            planning: PlanningPrompts::default(),
            evaluation: EvaluationPrompts::default(),
        }
    }

    /// Render the system prompt from tool definitions and custom
    /// instructions.
    #[must_use]
    pub fn render_system(
        &self,
        tools: &[ToolDefinition],
        custom_instructions: Option<&str>,
    ) -> String {
        let tools_text = tools
            .iter()
            .map(|def| {
                format!(
                    "- {}: {} (returns {})",
                    def.name,
                    def.description,
                    def.output_type.as_deref().unwrap_or("object")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        self.system_prompt
            .replace("{{tools}}", &tools_text)
            .replace("{{custom_instructions}}", custom_instructions.unwrap_or(""))
            .trim()
            .to_owned()
    }
}

impl Default for PlanningPrompts {
    fn default() -> Self {
        Self {
            initial_plan: INITIAL_PLAN_PROMPT.to_owned(),
            update_plan: UPDATE_PLAN_PROMPT.to_owned(),
        }
    }
}

impl Default for EvaluationPrompts {
    fn default() -> Self {
        Self {
            instruction: EVALUATION_PROMPT.to_owned(),
        }
    }
}

/// Default system prompt for tool-calling agents.
pub const TOOL_CALLING_SYSTEM_PROMPT: &str = r"You are a helpful AI assistant that can use tools to accomplish tasks.

You have access to the following tools:
{{tools}}

When you need to use a tool, respond with a tool call in the appropriate format.
When you have the final answer, use the 'final_answer' tool to provide it.

Think step by step about what you need to do to accomplish the task.

{{custom_instructions}}";

/// Default system prompt for code-action agents.
pub const CODE_ACTION_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant that solves tasks by writing short tool-call scripts.

You have access to the following tools, callable as functions:
{{tools}}

Respond with a fenced code block containing one call per line, for example:

```
result = web_search(query: "...")
final_answer(answer: result)
```

You may assign results to variables and pass them to later calls.
Use print(...) to log intermediate values. When you know the final answer,
call final_answer(answer: ...) to finish.

{{custom_instructions}}"#;

/// Prompt for the initial plan.
pub const INITIAL_PLAN_PROMPT: &str = "Before taking any action, write a short step-by-step plan \
for solving the task above. List the facts you will need, the tools you will use, and the order \
of operations. Do not call any tools yet; answer with the plan only.";

/// Prompt for plan updates.
pub const UPDATE_PLAN_PROMPT: &str = "Review your progress so far and write an updated plan for \
finishing the task. Keep what worked, drop what did not, and list the remaining steps. Do not \
call any tools yet; answer with the plan only.";

/// Prompt asking the model to classify the run state.
pub const EVALUATION_PROMPT: &str = r#"Review the conversation above and judge the state of the task.
Respond with a single JSON object, no prose:
{"status": "goal_achieved" | "continue" | "stuck", "answer": <final answer if goal_achieved, else null>, "reasoning": "<one sentence>", "confidence": <number between 0 and 1>}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_slots() {
        let templates = PromptTemplates::tool_calling_agent();
        let tools = vec![
            ToolDefinition::new("search", "Searches the web", serde_json::json!({}))
                .with_output_type("string"),
        ];
        let rendered = templates.render_system(&tools, Some("Be terse."));
        assert!(rendered.contains("- search: Searches the web (returns string)"));
        assert!(rendered.contains("Be terse."));
        assert!(!rendered.contains("{{tools}}"));
        assert!(!rendered.contains("{{custom_instructions}}"));
    }

    #[test]
    fn code_agent_prompt_differs() {
        let tool_calling = PromptTemplates::tool_calling_agent();
        let code = PromptTemplates::code_agent();
        assert_ne!(tool_calling.system_prompt, code.system_prompt);
        assert!(code.system_prompt.contains("fenced code block"));
    }
}
