//! Message types for agent-model communication.
//!
//! Messages follow chat completion API conventions. Two structural rules are
//! enforced by the constructors: an assistant message carries exactly one of
//! text content or tool calls, and image parts appear only on user messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::usage::TokenUsage;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message providing instructions.
    System,
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
    /// Tool call message.
    #[serde(rename = "tool-call")]
    ToolCall,
    /// Tool response message.
    #[serde(rename = "tool-response")]
    ToolResponse,
}

impl MessageRole {
    /// String representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::ToolCall => "tool-call",
            Self::ToolResponse => "tool-response",
        }
    }

    /// Whether this is the system role.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

/// One content part of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Image content (base64 encoded bytes).
    Image {
        /// The image payload.
        image: String,
    },
}

impl MessageContent {
    /// Create a new text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a new image part from raw bytes.
    #[must_use]
    pub fn image(data: impl Into<String>) -> Self {
        Self::Image { image: data.into() }
    }

    /// The text content, if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

/// Function payload of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments to pass (JSON object, or a JSON-encoded string).
    pub arguments: Value,
}

/// A tool call made by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageToolCall {
    /// Unique identifier for the tool call.
    pub id: String,
    /// Type of the tool call (always "function").
    #[serde(rename = "type")]
    pub call_type: String,
    /// The function to call.
    pub function: ToolCallFunction,
}

impl ChatMessageToolCall {
    /// Create a new tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_owned(),
            function: ToolCallFunction {
                name: name.into(),
                arguments,
            },
        }
    }

    /// Name of the tool being called.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Arguments as a JSON value.
    #[must_use]
    pub const fn arguments(&self) -> &Value {
        &self.function.arguments
    }

    /// Parse arguments as a typed value, accepting both a JSON object and a
    /// JSON-encoded string (providers disagree on which they send).
    pub fn parse_arguments<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        match &self.function.arguments {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        }
    }
}

/// A chat message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: MessageRole,
    /// Content parts of the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<MessageContent>>,
    /// Tool calls made by the model (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatMessageToolCall>>,
    /// Tool call id this message responds to (tool-response messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Token usage attributed to producing this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Raw provider payload, kept opaque.
    #[serde(skip)]
    pub raw: Option<Value>,
}

impl ChatMessage {
    fn text_message(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(vec![MessageContent::text(content)]),
            tool_calls: None,
            tool_call_id: None,
            token_usage: None,
            raw: None,
        }
    }

    /// Create a new system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text_message(MessageRole::System, content)
    }

    /// Create a new user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text_message(MessageRole::User, content)
    }

    /// Create a user message with text plus image parts. Images are only
    /// legal on user messages, so this is the single image entry point.
    #[must_use]
    pub fn user_with_images(content: impl Into<String>, images: Vec<Vec<u8>>) -> Self {
        let mut parts = vec![MessageContent::text(content)];
        parts.extend(images.into_iter().map(|bytes| {
            MessageContent::image(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
        }));
        Self {
            role: MessageRole::User,
            content: Some(parts),
            tool_calls: None,
            tool_call_id: None,
            token_usage: None,
            raw: None,
        }
    }

    /// Create a new assistant text message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text_message(MessageRole::Assistant, content)
    }

    /// Create a new assistant message carrying tool calls and no content.
    #[must_use]
    pub const fn assistant_with_tool_calls(tool_calls: Vec<ChatMessageToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            token_usage: None,
            raw: None,
        }
    }

    /// Create a new tool response message.
    #[must_use]
    pub fn tool_response(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::ToolResponse,
            content: Some(vec![MessageContent::text(content)]),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            token_usage: None,
            raw: None,
        }
    }

    /// Attach token usage.
    #[must_use]
    pub fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    /// Concatenated text content of the message.
    #[must_use]
    pub fn text_content(&self) -> Option<String> {
        self.content.as_ref().map(|parts| {
            parts
                .iter()
                .filter_map(MessageContent::as_text)
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// Whether this message carries at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Approximate length in characters, used by the memory budgeter.
    #[must_use]
    pub fn content_len(&self) -> usize {
        let content: usize = self
            .content
            .iter()
            .flatten()
            .filter_map(MessageContent::as_text)
            .map(str::len)
            .sum();
        let calls: usize = self
            .tool_calls
            .iter()
            .flatten()
            .map(|c| c.function.name.len() + c.function.arguments.to_string().len())
            .sum();
        content + calls
    }
}
