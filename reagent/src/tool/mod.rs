//! Tool trait and utilities for defining agent tools.
//!
//! Tools are the primary way agents interact with the world. The typed
//! [`Tool`] trait gives compile-time argument checking; [`DynTool`] is the
//! object-safe form used by the registry.

mod builtin;
mod registry;

pub use builtin::{FinalAnswerArgs, FinalAnswerTool, UserInputArgs, UserInputTool};
pub use registry::{ToolInvocation, ToolRegistry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// Name of the distinguished final-answer tool.
pub const FINAL_ANSWER_TOOL: &str = "final_answer";

/// Alias resolved by the registry to a configured search provider.
pub const WEB_SEARCH_ALIAS: &str = "web_search";

/// Definition of a tool for LLM function calling.
///
/// Serializes to the OpenAI function-calling shape:
/// `{"type": "function", "function": {"name", "description", "parameters"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool (snake_case).
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON schema for the tool's parameters.
    pub parameters: Value,
    /// Output type string for prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
}

impl ToolDefinition {
    /// Create a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            output_type: None,
        }
    }

    /// Set the output type.
    #[must_use]
    pub fn with_output_type(mut self, output_type: impl Into<String>) -> Self {
        self.output_type = Some(output_type.into());
        self
    }

    /// The tool name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of required parameters, read from the schema.
    #[must_use]
    pub fn required_params(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// The declared schema for one parameter, when present.
    #[must_use]
    pub fn param_schema(&self, name: &str) -> Option<&Value> {
        self.parameters.get("properties").and_then(|p| p.get(name))
    }
}

/// Custom serialization to the OpenAI function-calling format.
impl Serialize for ToolDefinition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut function = serde_json::Map::new();
        function.insert("name".to_owned(), Value::String(self.name.clone()));
        function.insert(
            "description".to_owned(),
            Value::String(self.description.clone()),
        );
        function.insert("parameters".to_owned(), self.parameters.clone());

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry("function", &function)?;
        map.end()
    }
}

/// The core trait for all tools that agents can use.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static name of the tool.
    const NAME: &'static str;

    /// Arguments type for the tool.
    type Args: for<'de> Deserialize<'de> + Send;

    /// Output type of the tool.
    type Output: Serialize + Send;

    /// Error type for tool execution.
    type Error: Into<ToolError> + Send;

    /// The name of the tool.
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Description of the tool, shown to the model.
    fn description(&self) -> String;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Output type string for prompts.
    fn output_type(&self) -> &'static str {
        "object"
    }

    /// Execute the tool with the given arguments.
    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error>;

    /// The tool definition for LLM function calling.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
            .with_output_type(self.output_type())
    }

    /// Call the tool with JSON arguments, returning JSON output.
    ///
    /// Accepts both an arguments object and a JSON-encoded string, since
    /// providers disagree on which they send.
    async fn call_json(&self, args: Value) -> Result<Value, ToolError>
    where
        Self::Output: 'static,
    {
        let typed_args: Self::Args = match &args {
            Value::String(s) => serde_json::from_str(s).map_err(|e| ToolError::InvalidArguments {
                tool_name: self.name().to_owned(),
                message: e.to_string(),
            })?,
            _ => serde_json::from_value(args.clone()).map_err(|e| {
                ToolError::InvalidArguments {
                    tool_name: self.name().to_owned(),
                    message: e.to_string(),
                }
            })?,
        };

        let result = self.call(typed_args).await.map_err(Into::into)?;
        serde_json::to_value(result)
            .map_err(|e| ToolError::execution(self.name(), args, e.to_string()))
    }
}

/// A boxed dynamic tool for collections.
pub type BoxedTool = Box<dyn DynTool>;

/// Object-safe version of [`Tool`] for dynamic dispatch.
#[async_trait]
pub trait DynTool: Send + Sync {
    /// The name of the tool.
    fn name(&self) -> &str;

    /// Description of the tool.
    fn description(&self) -> String;

    /// The tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Call the tool with JSON arguments.
    async fn call_json(&self, args: Value) -> Result<Value, ToolError>;
}

#[async_trait]
impl<T: Tool + 'static> DynTool for T
where
    T::Output: 'static,
{
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> String {
        Tool::description(self)
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    async fn call_json(&self, args: Value) -> Result<Value, ToolError> {
        Tool::call_json(self, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_serializes_to_function_format() {
        let def = ToolDefinition::new(
            "get_weather",
            "Gets the weather",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string", "description": "City name"}
                },
                "required": ["city"]
            }),
        );

        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "get_weather");
        assert!(json["function"]["parameters"]["properties"]["city"].is_object());
    }

    #[test]
    fn required_params_read_from_schema() {
        let def = ToolDefinition::new(
            "t",
            "d",
            serde_json::json!({
                "type": "object",
                "properties": {"a": {"type": "string"}, "b": {"type": "integer"}},
                "required": ["a"]
            }),
        );
        assert_eq!(def.required_params(), vec!["a"]);
        assert!(def.param_schema("b").is_some());
        assert!(def.param_schema("missing").is_none());
    }
}
