//! Completion backend abstraction.
//!
//! Provides a unified interface over chat-completion providers. A backend
//! answers either in one shot ([`LlmBackend::generate`]) or as an ordered
//! feed of [`LlmDelta`] events ([`LlmBackend::stream`]).

use crate::error::LlmError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default sampling temperature for conversation completions.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default output token cap for conversation completions.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Available completion providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Groq's OpenAI-compatible API.
    Groq,
    /// OpenAI API.
    OpenAi,
    /// Any other OpenAI-compatible endpoint.
    OpenAiCompatible,
}

/// Configuration for a completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    /// The provider type.
    pub provider: LlmProvider,
    /// Base URL for the API, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API key (if required).
    pub api_key: Option<String>,
}

impl LlmBackendConfig {
    /// Creates a Groq backend configuration.
    #[must_use]
    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::Groq,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: model.into(),
            api_key: Some(api_key.into()),
        }
    }

    /// Creates a configuration for a generic OpenAI-compatible endpoint.
    #[must_use]
    pub fn openai_compatible(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::OpenAiCompatible,
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque call identifier assigned by the model.
    pub id: String,
    /// The tool name.
    pub name: String,
    /// Raw argument payload, normally a JSON object encoded as text.
    pub arguments: String,
}

impl ToolCall {
    /// Creates a new tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A tool the model may call, as advertised in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON-schema-like parameter specification.
    pub parameters: JsonValue,
}

/// One message of the conversation sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum LlmMessage {
    /// System instruction.
    System { content: String },
    /// User input.
    User { content: String },
    /// Model output, possibly carrying tool invocations.
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Result of a tool invocation.
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl LlmMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }
}

/// A request to a completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Full conversation, oldest first.
    pub messages: Vec<LlmMessage>,
    /// Tools the model may call; tool choice is left to the model.
    pub tools: Vec<ToolDeclaration>,
    /// Temperature for sampling.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    /// Creates a request over the given messages.
    #[must_use]
    pub fn new(messages: Vec<LlmMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Sets the tool declarations.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A one-shot response from a completion backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text; empty when the model only called tools.
    pub content: String,
    /// Tool invocations requested by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
}

impl LlmResponse {
    /// Creates a plain text response.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Adds a tool call.
    #[must_use]
    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.tool_calls.push(tool_call);
        self
    }

    /// Replays this response as the delta feed a streaming backend would
    /// have produced: the whole text as one fragment, then each tool call
    /// as a single complete fragment.
    #[must_use]
    pub fn into_deltas(self) -> Vec<LlmDelta> {
        let mut deltas = Vec::with_capacity(self.tool_calls.len() + 1);
        if !self.content.is_empty() {
            deltas.push(LlmDelta::Content(self.content));
        }
        for (index, call) in self.tool_calls.into_iter().enumerate() {
            deltas.push(LlmDelta::ToolCall(ToolCallDelta {
                index,
                id: Some(call.id),
                name: Some(call.name),
                arguments: Some(call.arguments),
            }));
        }
        deltas
    }
}

/// A fragment of a tool invocation streamed by the backend.
///
/// Fragments of one invocation share an `index`; the id and name usually
/// arrive once while `arguments` arrives in pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the invocation within the response.
    pub index: usize,
    /// Call identifier, when present in this fragment.
    pub id: Option<String>,
    /// Tool name, when present in this fragment.
    pub name: Option<String>,
    /// Next piece of the argument text.
    pub arguments: Option<String>,
}

/// One event of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmDelta {
    /// A piece of generated text.
    Content(String),
    /// A piece of a tool invocation.
    ToolCall(ToolCallDelta),
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    pub input_tokens: u32,
    /// Number of output tokens.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns the total number of tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A streamed completion.
pub type DeltaStream = BoxStream<'static, Result<LlmDelta, LlmError>>;

/// Trait for completion backends.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generates a complete response for the given request.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion call fails.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Starts a streamed completion for the given request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started; failures after
    /// that surface as error items of the stream.
    async fn stream(&self, request: &LlmRequest) -> Result<DeltaStream, LlmError>;

    /// Returns the provider type.
    fn provider(&self) -> LlmProvider;

    /// Returns the model name.
    fn model(&self) -> &str;
}
