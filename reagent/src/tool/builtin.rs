//! Built-in tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::orchestrator::{ControlClient, ControlRequest};

use super::Tool;

/// Built-in tool for providing the final answer to a task.
///
/// Returning from this tool is the distinguished control signal that
/// terminates the run successfully with its payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalAnswerTool;

/// Arguments for the final answer tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswerArgs {
    /// The final answer to the problem.
    pub answer: Value,
}

#[async_trait]
impl Tool for FinalAnswerTool {
    const NAME: &'static str = super::FINAL_ANSWER_TOOL;
    type Args = FinalAnswerArgs;
    type Output = Value;
    type Error = ToolError;

    fn description(&self) -> String {
        "Provides the final answer to the given problem.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "answer": {
                    "description": "The final answer to the problem. Can be any type.",
                }
            },
            "required": ["answer"]
        })
    }

    fn output_type(&self) -> &'static str {
        "any"
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(args.answer)
    }
}

/// Tool that asks the user a question through the control plane.
///
/// The question travels to the parent (or whatever handler is attached to
/// the control channel) as a `user_input` control request. Without an
/// attached channel the call fails with an environment error.
#[derive(Debug, Default)]
pub struct UserInputTool {
    control: Option<ControlClient>,
}

/// Arguments for the user input tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInputArgs {
    /// The question to ask the user.
    pub question: String,
    /// Choices to offer, when the question is closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl UserInputTool {
    /// Create a user input tool wired to a control channel.
    #[must_use]
    pub const fn new(control: ControlClient) -> Self {
        Self {
            control: Some(control),
        }
    }
}

#[async_trait]
impl Tool for UserInputTool {
    const NAME: &'static str = "user_input";
    type Args = UserInputArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Asks for the user's input on a specific question.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask the user"
                },
                "options": {
                    "type": "array",
                    "description": "Optional list of choices to offer",
                    "nullable": true
                }
            },
            "required": ["question"]
        })
    }

    fn output_type(&self) -> &'static str {
        "string"
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let Some(control) = &self.control else {
            return Err(ToolError::Environment("no parent".to_owned()));
        };

        let response = control
            .request(ControlRequest::UserInput {
                prompt: args.question,
                options: args.options,
            })
            .await
            .map_err(|e| ToolError::Environment(e.to_string()))?;

        if !response.approved {
            return Err(ToolError::Environment(
                "user input request was denied".to_owned(),
            ));
        }

        Ok(match response.value {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn final_answer_returns_payload() {
        let tool = FinalAnswerTool;
        let out = tool
            .call(FinalAnswerArgs {
                answer: serde_json::json!(4),
            })
            .await
            .unwrap();
        assert_eq!(out, Value::from(4));
    }

    #[test]
    fn final_answer_definition() {
        let def = Tool::definition(&FinalAnswerTool);
        assert_eq!(def.name, "final_answer");
        assert_eq!(def.required_params(), vec!["answer"]);
    }

    #[tokio::test]
    async fn user_input_without_parent_fails() {
        let tool = UserInputTool::default();
        let err = tool
            .call(UserInputArgs {
                question: "file?".into(),
                options: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Environment(_)));
    }
}
