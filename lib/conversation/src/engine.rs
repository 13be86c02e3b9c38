//! Completion stream engine.
//!
//! Drives the completion backend over a session history until the model
//! answers in plain text. Each round sends the full history plus the tool
//! declarations; text deltas accumulate into the answer and, when a caller
//! is listening, are flushed as sentence-sized chunks. Tool invocation
//! fragments are merged by index until their arguments parse as JSON, then
//! dispatched, and the result is fed back as a tool turn before the next
//! round.
//!
//! One-shot completions replay through the same machinery as a stream of
//! whole fragments, so both entry points mutate history identically.

use crate::dispatch::{DispatchContext, ToolDispatcher};
use crate::error::AssistantError;
use crate::turn::History;
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use switchboard_ai::{
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DeltaStream, LlmBackend, LlmDelta, LlmError,
    LlmRequest, ToolCall, ToolCallDelta,
};
use switchboard_core::ToolCallId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default bound on tool rounds per request.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Default deadline for a backend request and for each streamed event.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Answer returned when the model produces neither text nor tool calls.
pub const FALLBACK_RESPONSE: &str =
    "I apologize, but I couldn't generate a response. Please try rephrasing your question.";

const FLUSH_THRESHOLD: usize = 50;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s").expect("valid regex"));

/// Kind of a [`StreamChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// A piece of answer text.
    Content,
    /// A tool invocation is about to run.
    ToolCall,
    /// A tool invocation finished.
    ToolResult,
}

/// One unit of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    /// Text for content chunks, `{name, arguments}` for tool calls and the
    /// result payload for tool results.
    pub content: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl StreamChunk {
    /// Creates a content chunk.
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Content,
            content: JsonValue::String(text.into()),
            tool_call_id: None,
        }
    }

    /// Creates a tool-call announcement.
    #[must_use]
    pub fn tool_call(id: impl Into<String>, name: &str, arguments: JsonValue) -> Self {
        Self {
            kind: ChunkKind::ToolCall,
            content: json!({ "name": name, "arguments": arguments }),
            tool_call_id: Some(id.into()),
        }
    }

    /// Creates a tool-result chunk.
    #[must_use]
    pub fn tool_result(id: impl Into<String>, result: JsonValue) -> Self {
        Self {
            kind: ChunkKind::ToolResult,
            content: result,
            tool_call_id: Some(id.into()),
        }
    }

    /// Returns the text of a content chunk.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self.kind {
            ChunkKind::Content => self.content.as_str(),
            _ => None,
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_tool_rounds: usize,
    pub request_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Clone, Copy)]
enum Mode<'a> {
    OneShot,
    Streaming(&'a mpsc::Sender<StreamChunk>),
}

impl<'a> Mode<'a> {
    fn sink(self) -> Option<&'a mpsc::Sender<StreamChunk>> {
        match self {
            Self::OneShot => None,
            Self::Streaming(sink) => Some(sink),
        }
    }
}

struct RoundOutput {
    content: String,
    calls: Vec<ToolCall>,
}

/// Runs completion rounds against one history.
pub struct CompletionEngine {
    backend: Arc<dyn LlmBackend>,
    dispatcher: Arc<ToolDispatcher>,
    config: EngineConfig,
}

impl CompletionEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        dispatcher: Arc<ToolDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            config,
        }
    }

    /// Returns the engine settings.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Completes the history with one-shot backend requests and returns the
    /// final answer.
    ///
    /// The history must end with the user turn being answered.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend request fails or times out, the round
    /// limit is hit, or `cancel` fires while waiting on the backend.
    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    pub async fn complete(
        &self,
        history: &mut History,
        ctx: &DispatchContext,
        cancel: &CancellationToken,
    ) -> Result<String, AssistantError> {
        self.run(history, ctx, Mode::OneShot, cancel).await
    }

    /// Completes the history with streamed backend requests, forwarding
    /// chunks to `sink` as they are produced.
    ///
    /// A closed sink does not stop the request; the history is still
    /// completed.
    ///
    /// # Errors
    ///
    /// Same as [`CompletionEngine::complete`].
    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    pub async fn complete_streaming(
        &self,
        history: &mut History,
        ctx: &DispatchContext,
        sink: &mpsc::Sender<StreamChunk>,
        cancel: &CancellationToken,
    ) -> Result<String, AssistantError> {
        self.run(history, ctx, Mode::Streaming(sink), cancel).await
    }

    async fn run(
        &self,
        history: &mut History,
        ctx: &DispatchContext,
        mode: Mode<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, AssistantError> {
        let tools = self.dispatcher.catalog().tool_declarations();
        let mut round = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AssistantError::Cancelled);
            }

            let request = LlmRequest::new(history.to_messages())
                .with_tools(tools.clone())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_tokens);
            debug!(round, messages = request.messages.len(), "requesting completion");

            let deltas = self.open(&request, mode, cancel).await?;
            let mut emitter = ContentEmitter::new(mode.sink());
            let output = self.collect(deltas, mode, &mut emitter, cancel).await?;
            emitter.flush().await;

            if output.calls.is_empty() {
                return Self::finish(history, output.content, mode).await;
            }

            if round >= self.config.max_tool_rounds {
                warn!(max = self.config.max_tool_rounds, "tool round limit reached");
                return Err(AssistantError::MaxToolRoundsExceeded {
                    max: self.config.max_tool_rounds,
                });
            }
            round += 1;

            let mut content = output.content;
            for call in unique_ids(output.calls, history) {
                self.dispatch(history, ctx, std::mem::take(&mut content), call, mode)
                    .await?;
            }
        }
    }

    async fn open(
        &self,
        request: &LlmRequest,
        mode: Mode<'_>,
        cancel: &CancellationToken,
    ) -> Result<DeltaStream, AssistantError> {
        match mode {
            Mode::OneShot => {
                let response = self.wait(cancel, self.backend.generate(request)).await?;
                let deltas = response.into_deltas().into_iter().map(Ok);
                Ok(futures::stream::iter(deltas).boxed())
            }
            Mode::Streaming(_) => self.wait(cancel, self.backend.stream(request)).await,
        }
    }

    /// Consumes one backend reply.
    ///
    /// While streaming, consumption stops at the first complete invocation
    /// and the rest of the reply is abandoned. A one-shot reply is consumed
    /// whole and all of its invocations are returned in order.
    async fn collect(
        &self,
        mut deltas: DeltaStream,
        mode: Mode<'_>,
        emitter: &mut ContentEmitter<'_>,
        cancel: &CancellationToken,
    ) -> Result<RoundOutput, AssistantError> {
        let mut content = String::new();
        let mut calls = CallAccumulator::default();

        while let Some(delta) = self.wait(cancel, next_delta(&mut deltas)).await? {
            match delta {
                LlmDelta::Content(text) => {
                    content.push_str(&text);
                    emitter.push(&text).await;
                }
                LlmDelta::ToolCall(fragment) => {
                    let complete = calls.apply(fragment);
                    if let (Some(call), Mode::Streaming(_)) = (complete, mode) {
                        debug!(tool_name = %call.name, "tool invocation complete");
                        return Ok(RoundOutput {
                            content,
                            calls: vec![call],
                        });
                    }
                }
            }
        }

        Ok(RoundOutput {
            content,
            calls: calls.finish(),
        })
    }

    async fn finish(
        history: &mut History,
        content: String,
        mode: Mode<'_>,
    ) -> Result<String, AssistantError> {
        if content.trim().is_empty() {
            info!("completion produced no content, returning fallback");
            send(mode.sink(), StreamChunk::content(FALLBACK_RESPONSE)).await;
            return Ok(FALLBACK_RESPONSE.to_string());
        }

        history.push_assistant(content.clone(), Vec::new())?;
        Ok(content)
    }

    async fn dispatch(
        &self,
        history: &mut History,
        ctx: &DispatchContext,
        content: String,
        call: ToolCall,
        mode: Mode<'_>,
    ) -> Result<(), AssistantError> {
        history.push_assistant(content, vec![call.clone()])?;
        send(
            mode.sink(),
            StreamChunk::tool_call(&call.id, &call.name, announced_arguments(&call.arguments)),
        )
        .await;

        let payload = match self
            .dispatcher
            .execute(&call.name, &call.arguments, ctx)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(tool_name = %call.name, error = %e, "tool call failed");
                json!({ "status": "error", "error": e.to_string() })
            }
        };

        history.push_tool(&call.id, &call.name, payload.to_string())?;
        send(mode.sink(), StreamChunk::tool_result(&call.id, payload)).await;
        Ok(())
    }

    /// Awaits a backend future under the request deadline, giving up early
    /// if `cancel` fires.
    async fn wait<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T, LlmError>>,
    ) -> Result<T, AssistantError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AssistantError::Cancelled),
            result = tokio::time::timeout(self.config.request_timeout, fut) => match result {
                Ok(result) => result.map_err(AssistantError::from),
                Err(_) => Err(AssistantError::Backend(LlmError::Timeout)),
            },
        }
    }
}

impl std::fmt::Debug for CompletionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionEngine")
            .field("model", &self.backend.model())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn next_delta(deltas: &mut DeltaStream) -> Result<Option<LlmDelta>, LlmError> {
    deltas.next().await.transpose()
}

async fn send(sink: Option<&mpsc::Sender<StreamChunk>>, chunk: StreamChunk) {
    if let Some(sink) = sink {
        if sink.send(chunk).await.is_err() {
            debug!("stream receiver dropped, discarding chunk");
        }
    }
}

fn announced_arguments(raw: &str) -> JsonValue {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

/// Buffers answer text into sentence-sized chunks.
struct ContentEmitter<'a> {
    sink: Option<&'a mpsc::Sender<StreamChunk>>,
    buffer: String,
}

impl<'a> ContentEmitter<'a> {
    fn new(sink: Option<&'a mpsc::Sender<StreamChunk>>) -> Self {
        Self {
            sink,
            buffer: String::new(),
        }
    }

    async fn push(&mut self, text: &str) {
        if self.sink.is_none() {
            return;
        }
        self.buffer.push_str(text);
        if SENTENCE_END.is_match(&self.buffer) || self.buffer.len() > FLUSH_THRESHOLD {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buffer);
        send(self.sink, StreamChunk::content(text)).await;
    }
}

/// Merges invocation fragments by index.
#[derive(Debug, Default)]
struct CallAccumulator {
    pending: BTreeMap<usize, ToolCall>,
}

impl CallAccumulator {
    /// Applies a fragment and returns the invocation if it is now complete.
    fn apply(&mut self, fragment: ToolCallDelta) -> Option<ToolCall> {
        let call = self
            .pending
            .entry(fragment.index)
            .or_insert_with(|| ToolCall::new("", "", ""));

        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            call.id = id;
        }
        if let Some(name) = fragment.name.filter(|name| !name.is_empty()) {
            call.name = name;
        }
        if let Some(arguments) = fragment.arguments {
            call.arguments.push_str(&arguments);
        }

        let complete = !call.name.is_empty()
            && serde_json::from_str::<JsonValue>(&call.arguments).is_ok();
        complete.then(|| call.clone())
    }

    /// Returns every named invocation, complete or not, in index order.
    fn finish(self) -> Vec<ToolCall> {
        self.pending
            .into_values()
            .filter_map(|call| {
                if call.name.is_empty() {
                    warn!(id = %call.id, "dropping tool invocation without a name");
                    None
                } else {
                    Some(call)
                }
            })
            .collect()
    }
}

/// Gives every invocation an id no other invocation of the history uses.
///
/// Backends may leave ids empty or reuse the same id in every reply.
fn unique_ids(calls: Vec<ToolCall>, history: &History) -> Vec<ToolCall> {
    let mut taken: HashSet<String> = history
        .tool_call_ids()
        .into_iter()
        .map(str::to_string)
        .collect();

    calls
        .into_iter()
        .map(|mut call| {
            if call.id.is_empty() || taken.contains(&call.id) {
                let id = ToolCallId::new().to_string();
                debug!(original = %call.id, assigned = %id, "reassigning tool call id");
                call.id = id;
            }
            taken.insert(call.id.clone());
            call
        })
        .collect()
}
