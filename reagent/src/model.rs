//! The model provider contract.
//!
//! The core never speaks HTTP itself: it consumes the [`Model`] trait and
//! leaves concrete OpenAI-shaped or Anthropic-shaped clients to outer
//! crates. [`MockModel`] provides a scripted in-process implementation for
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, ModelError, Result};
use crate::message::{ChatMessage, ChatMessageToolCall};
use crate::tool::ToolDefinition;
use crate::usage::TokenUsage;

/// Options for a generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Stop sequences to end generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Available tools for function calling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Temperature for sampling (0.0 to 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Per-call deadline in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

impl GenerateOptions {
    /// Create new default generate options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set stop sequences.
    #[must_use]
    pub fn with_stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = Some(sequences);
        self
    }

    /// Set available tools for function calling.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Set max tokens.
    #[must_use]
    pub const fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the per-call deadline.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Response from a model generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated assistant message.
    pub message: ChatMessage,
    /// Token usage information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl ModelResponse {
    /// Create a new model response.
    #[must_use]
    pub const fn new(message: ChatMessage) -> Self {
        Self {
            message,
            token_usage: None,
        }
    }

    /// Set token usage.
    #[must_use]
    pub const fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    /// Text content of the response.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.message.text_content()
    }

    /// Tool calls in the response.
    #[must_use]
    pub const fn tool_calls(&self) -> Option<&Vec<ChatMessageToolCall>> {
        self.message.tool_calls.as_ref()
    }
}

/// The core trait for language model implementations.
#[async_trait]
pub trait Model: Send + Sync {
    /// The model identifier (e.g. "gpt-4o", "claude-sonnet-4-5").
    fn model_id(&self) -> &str;

    /// Generate an assistant message for the given conversation.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] carrying enough detail (status code,
    /// message) for the resilience layer to classify it.
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> std::result::Result<ModelResponse, ModelError>;

    /// Whether the model supports native tool/function calling.
    fn supports_tool_calling(&self) -> bool {
        true
    }
}

/// A boxed model for dynamic dispatch.
pub type BoxedModel = Box<dyn Model>;

/// Frozen model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier.
    pub model_id: String,
    /// Sampling temperature, in [0, 2].
    pub temperature: f32,
    /// Per-call timeout in seconds.
    pub timeout_secs: f64,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Base URL of the provider API, when overridden.
    pub api_base: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            temperature: 1.0,
            timeout_secs: 120.0,
            max_tokens: None,
            api_base: None,
        }
    }
}

impl ModelConfig {
    /// Create a config for the given model id with defaults.
    #[must_use]
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    /// Copy with a different temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Copy with a different timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: f64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Copy with a max token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Copy with an API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AgentError::configuration(format!(
                "temperature must be in [0, 2], got {}",
                self.temperature
            )));
        }
        if self.timeout_secs <= 0.0 {
            return Err(AgentError::configuration("timeout must be positive"));
        }
        if let Some(base) = &self.api_base
            && !(base.starts_with("http://") || base.starts_with("https://"))
        {
            return Err(AgentError::configuration(format!(
                "api_base must be http or https, got {base:?}"
            )));
        }
        Ok(())
    }

    /// Whether the API base points at a local endpoint.
    #[must_use]
    pub fn is_local_endpoint(&self) -> bool {
        self.api_base.as_deref().is_some_and(|base| {
            base.strip_prefix("http://")
                .or_else(|| base.strip_prefix("https://"))
                .is_some_and(|rest| {
                    let host = rest.split([':', '/']).next().unwrap_or(rest);
                    host == "localhost" || host == "127.0.0.1"
                })
        })
    }
}

/// One scripted reply from a [`MockModel`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A plain assistant text message.
    Text(String),
    /// An assistant message carrying one tool call.
    ToolCall {
        /// Name of the tool to call.
        name: String,
        /// Arguments for the call.
        arguments: Value,
    },
    /// A full assistant message.
    Message(ChatMessage),
    /// A provider error.
    Error(ModelError),
}

/// A scripted model for testing.
///
/// Replies are returned in sequence, cycling when exhausted.
#[derive(Debug)]
pub struct MockModel {
    model_id: String,
    replies: Vec<MockReply>,
    usage_per_call: Option<TokenUsage>,
    reply_index: std::sync::atomic::AtomicUsize,
}

impl MockModel {
    /// Create a new mock model with scripted replies.
    #[must_use]
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            model_id: "mock-model".to_owned(),
            replies,
            usage_per_call: None,
            reply_index: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Create a mock that always answers with the same texts, cycling.
    #[must_use]
    pub fn from_texts(texts: Vec<String>) -> Self {
        Self::new(texts.into_iter().map(MockReply::Text).collect())
    }

    /// Use a custom model id.
    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Report this token usage on every successful call.
    #[must_use]
    pub const fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage_per_call = Some(usage);
        self
    }

    /// Number of generate calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.reply_index.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Model for MockModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(
        &self,
        _messages: Vec<ChatMessage>,
        _options: GenerateOptions,
    ) -> std::result::Result<ModelResponse, ModelError> {
        let index = self
            .reply_index
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let reply = if self.replies.is_empty() {
            MockReply::Text("No response".to_owned())
        } else {
            self.replies[index % self.replies.len()].clone()
        };

        let message = match reply {
            MockReply::Text(text) => ChatMessage::assistant(text),
            MockReply::ToolCall { name, arguments } => {
                ChatMessage::assistant_with_tool_calls(vec![ChatMessageToolCall::new(
                    format!("call_{index}"),
                    name,
                    arguments,
                )])
            }
            MockReply::Message(message) => message,
            MockReply::Error(err) => return Err(err),
        };

        let mut response = ModelResponse::new(message);
        if let Some(usage) = self.usage_per_call {
            response = response.with_token_usage(usage);
        }
        Ok(response)
    }
}
