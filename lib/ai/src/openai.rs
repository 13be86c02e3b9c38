//! OpenAI-compatible chat-completions backend.
//!
//! Speaks the `/chat/completions` wire format used by Groq, OpenAI and most
//! self-hosted gateways, both as a single JSON response and as a
//! server-sent-event stream of content and tool-call deltas.

use crate::backend::{
    DeltaStream, LlmBackend, LlmBackendConfig, LlmDelta, LlmMessage, LlmProvider, LlmRequest,
    LlmResponse, TokenUsage, ToolCall, ToolCallDelta,
};
use crate::error::LlmError;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{StreamExt, future, stream};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, instrument, trace};

const DONE_MARKER: &str = "[DONE]";

/// Completion backend for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    config: LlmBackendConfig,
}

impl OpenAiCompatibleBackend {
    /// Creates a backend from its configuration.
    pub fn new(config: LlmBackendConfig) -> switchboard_core::Result<Self, LlmError> {
        if config.base_url.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "base_url must not be empty".to_string(),
            }
            .into());
        }
        if config.model.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "model must not be empty".to_string(),
            }
            .into());
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, request: &LlmRequest, stream: bool) -> JsonValue {
        let mut body = json!({
            "model": self.config.model,
            "messages": request.messages.iter().map(wire_message).collect::<Vec<_>>(),
            "stream": stream,
        });

        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tool_choice"] = json!("auto");
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        body
    }

    async fn post(&self, body: &JsonValue) -> Result<reqwest::Response, LlmError> {
        let mut builder = self.client.post(self.endpoint()).json(body);
        if let Some(ref api_key) = self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else if e.is_connect() {
                LlmError::ProviderUnavailable {
                    provider: self.config.base_url.clone(),
                    reason: e.to_string(),
                }
            } else {
                LlmError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            return Err(LlmError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                reason: format!("HTTP {status}: {detail}"),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    #[instrument(skip(self, request), fields(model = %self.config.model, messages = request.messages.len()))]
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.request_body(request, false);
        let response = self.post(&body).await?;
        let completion: ChatCompletion =
            response
                .json()
                .await
                .map_err(|e| LlmError::ResponseParseFailed {
                    reason: e.to_string(),
                })?;

        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            LlmError::ResponseParseFailed {
                reason: "response contained no choices".to_string(),
            }
        })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall::new(call.id, call.function.name, call.function.arguments))
            .collect();

        debug!(
            tool_calls = tool_calls.len(),
            has_content = choice.message.content.is_some(),
            "completion received"
        );

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: completion
                .usage
                .map(|usage| TokenUsage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                })
                .unwrap_or_default(),
            model: completion.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }

    #[instrument(skip(self, request), fields(model = %self.config.model, messages = request.messages.len()))]
    async fn stream(&self, request: &LlmRequest) -> Result<DeltaStream, LlmError> {
        let body = self.request_body(request, true);
        let response = self.post(&body).await?;

        let deltas = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(event) if event.data.trim() == DONE_MARKER))
            })
            .flat_map(|event| {
                let items = match event {
                    Ok(event) => parse_stream_event(&event.data),
                    Err(e) => vec![Err(LlmError::RequestFailed {
                        reason: format!("SSE stream error: {e}"),
                    })],
                };
                stream::iter(items)
            });

        Ok(deltas.boxed())
    }

    fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

fn wire_message(message: &LlmMessage) -> JsonValue {
    match message {
        LlmMessage::System { content } => json!({ "role": "system", "content": content }),
        LlmMessage::User { content } => json!({ "role": "user", "content": content }),
        LlmMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut message = json!({ "role": "assistant", "content": content });
            if !tool_calls.is_empty() {
                message["tool_calls"] = tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.name, "arguments": call.arguments },
                        })
                    })
                    .collect();
            }
            message
        }
        LlmMessage::Tool {
            tool_call_id,
            name,
            content,
        } => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "name": name,
            "content": content,
        }),
    }
}

/// Converts one SSE data payload into zero or more deltas.
fn parse_stream_event(data: &str) -> Vec<Result<LlmDelta, LlmError>> {
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return vec![Err(LlmError::ResponseParseFailed {
                reason: format!("{e}, data: {data}"),
            })];
        }
    };

    if let Some(error) = chunk.error {
        let reason = error
            .get("message")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return vec![Err(LlmError::RequestFailed { reason })];
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Vec::new();
    };

    let mut deltas = Vec::new();
    if let Some(content) = choice.delta.content.filter(|content| !content.is_empty()) {
        deltas.push(Ok(LlmDelta::Content(content)));
    }
    for call in choice.delta.tool_calls.unwrap_or_default() {
        let (name, arguments) = match call.function {
            Some(function) => (function.name, function.arguments),
            None => (None, None),
        };
        deltas.push(Ok(LlmDelta::ToolCall(ToolCallDelta {
            index: call.index,
            id: call.id,
            name,
            arguments,
        })));
    }
    if deltas.is_empty() && choice.finish_reason.is_none() {
        trace!("ignoring empty completion chunk");
    }
    deltas
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    model: Option<String>,
    choices: Vec<CompletionChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
