//! Orchestrator facade.
//!
//! The single entry point transports talk to. A request locks its session for
//! its whole lifetime, appends the user turn, compacts the history if it is
//! over budget and hands it to the completion engine.

use crate::audit::{AuditLog, ToolCallRecord};
use crate::budget::{Compaction, ContextBudget, DEFAULT_CONTEXT_LIMIT, LlmSummarizer, Summarizer};
use crate::catalog::ToolCatalog;
use crate::dispatch::{DEFAULT_TOOL_TIMEOUT, DispatchContext, ToolDispatcher};
use crate::engine::{
    CompletionEngine, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_REQUEST_TIMEOUT, EngineConfig, StreamChunk,
};
use crate::error::{AssistantError, AuditError};
use crate::prompt::default_system_prompt;
use crate::store::{ConversationStore, SessionGuard};
use crate::turn::History;
use std::sync::Arc;
use std::time::Duration;
use switchboard_ai::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, EmailDrafter, LlmBackend};
use switchboard_integration::Connector;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, instrument};

/// Provider used when a request names none.
pub const DEFAULT_PROVIDER: &str = "google-mail";

/// Provider whose record kinds are listed in the default system prompt.
pub const CRM_PROVIDER: &str = "salesforce";

const STREAM_BUFFER: usize = 32;

/// A streamed response: chunks in order, then at most one error.
pub type ChunkStream = ReceiverStream<Result<StreamChunk, AssistantError>>;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Context budget in estimated tokens.
    pub context_limit: usize,
    /// Bound on tool rounds per request.
    pub max_tool_rounds: usize,
    /// Deadline for backend requests, streamed events and summarization.
    pub request_timeout: Duration,
    /// Deadline for each connector action.
    pub tool_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Provider for requests that name none.
    pub default_provider: String,
    /// Overrides the generated system prompt.
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            context_limit: DEFAULT_CONTEXT_LIMIT,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            default_provider: DEFAULT_PROVIDER.to_string(),
            system_prompt: None,
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn with_context_limit(mut self, limit: usize) -> Self {
        self.context_limit = limit;
        self
    }

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
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_max_tool_rounds(self.max_tool_rounds)
            .with_request_timeout(self.request_timeout)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

/// One user message addressed to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRequest {
    pub message: String,
    pub session_id: String,
    /// Connection to act through; empty uses the provider's default.
    pub connection_id: String,
    /// Provider for tools that do not name one; empty uses the default.
    pub provider: String,
}

impl MessageRequest {
    #[must_use]
    pub fn new(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            connection_id: String::new(),
            provider: String::new(),
        }
    }

    #[must_use]
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    fn validate(&self) -> Result<(), AssistantError> {
        if self.message.trim().is_empty() {
            return Err(AssistantError::InvalidInput {
                reason: "message is required".to_string(),
            });
        }
        if self.session_id.trim().is_empty() {
            return Err(AssistantError::InvalidInput {
                reason: "session id is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Composes the store, budget, dispatcher and engine.
pub struct Orchestrator {
    store: ConversationStore,
    engine: CompletionEngine,
    summarizer: Arc<dyn Summarizer>,
    audit: Arc<dyn AuditLog>,
    budget: ContextBudget,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Wires an orchestrator over the given collaborators.
    ///
    /// The backend also drafts email bodies and summarizes long histories.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        connector: Arc<dyn Connector>,
        catalog: Arc<ToolCatalog>,
        audit: Arc<dyn AuditLog>,
        config: OrchestratorConfig,
    ) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| default_system_prompt(catalog.provider_objects(CRM_PROVIDER)));

        let dispatcher = ToolDispatcher::new(catalog, connector, Arc::clone(&audit))
            .with_drafter(EmailDrafter::new(Arc::clone(&backend)))
            .with_action_timeout(config.tool_timeout);
        let engine = CompletionEngine::new(
            Arc::clone(&backend),
            Arc::new(dispatcher),
            config.engine_config(),
        );

        Self {
            store: ConversationStore::new(system_prompt),
            engine,
            summarizer: Arc::new(LlmSummarizer::new(backend)),
            audit,
            budget: ContextBudget::new(config.context_limit),
            config,
        }
    }

    /// Replaces the summarizer used for over-budget histories.
    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Answers one message and returns the final text.
    ///
    /// The request runs on its own task. A caller that stops waiting does not
    /// interrupt it, so a started tool action completes and the session
    /// history stays consistent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` without touching the session if the message or
    /// session id is blank, and the engine's error if the completion fails.
    #[instrument(skip_all, fields(session_id = %request.session_id))]
    pub async fn send_message(
        self: &Arc<Self>,
        request: MessageRequest,
    ) -> Result<String, AssistantError> {
        request.validate()?;

        let this = Arc::clone(self);
        let task =
            tokio::spawn(async move { this.run_one_shot(&request).await }.in_current_span());

        let response = task.await.unwrap_or_else(|e| {
            Err(AssistantError::Interrupted {
                reason: e.to_string(),
            })
        });
        log_outcome(&response);
        response
    }

    /// Answers one message as a stream of chunks.
    ///
    /// The stream ends when the answer is complete; a failure arrives as its
    /// last item.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the message or session id is blank.
    pub fn stream_message(
        self: &Arc<Self>,
        request: MessageRequest,
    ) -> Result<ChunkStream, AssistantError> {
        self.stream_message_with_cancellation(request, CancellationToken::new())
    }

    /// Like [`Orchestrator::stream_message`], but stops at the next backend
    /// wait once `cancel` fires. A tool action already running is allowed to
    /// finish and its result is kept in the history.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the message or session id is blank.
    pub fn stream_message_with_cancellation(
        self: &Arc<Self>,
        request: MessageRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, AssistantError> {
        request.validate()?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let this = Arc::clone(self);
        let span = info_span!("stream_message", session_id = %request.session_id);

        tokio::spawn(
            async move {
                let (chunk_tx, mut chunk_rx) = mpsc::channel(STREAM_BUFFER);

                let forward = {
                    let tx = tx.clone();
                    async move {
                        while let Some(chunk) = chunk_rx.recv().await {
                            // Keep draining after the caller leaves so the engine never blocks.
                            let _ = tx.send(Ok(chunk)).await;
                        }
                    }
                };
                let run = async move {
                    let result = this.run_streaming(&request, &chunk_tx, &cancel).await;
                    drop(chunk_tx);
                    result
                };

                let (result, ()) = tokio::join!(run, forward);
                log_outcome(&result);
                if let Err(e) = result {
                    let _ = tx.send(Err(e)).await;
                }
            }
            .instrument(span),
        );

        Ok(ReceiverStream::new(rx))
    }

    async fn run_one_shot(&self, request: &MessageRequest) -> Result<String, AssistantError> {
        let (mut history, ctx) = self.prepare(request).await?;
        self.engine
            .complete(&mut history, &ctx, &CancellationToken::new())
            .await
    }

    async fn run_streaming(
        &self,
        request: &MessageRequest,
        sink: &mpsc::Sender<StreamChunk>,
        cancel: &CancellationToken,
    ) -> Result<String, AssistantError> {
        let (mut history, ctx) = self.prepare(request).await?;
        self.engine
            .complete_streaming(&mut history, &ctx, sink, cancel)
            .await
    }

    /// Locks the session, appends the user turn and enforces the budget.
    async fn prepare(
        &self,
        request: &MessageRequest,
    ) -> Result<(SessionGuard, DispatchContext), AssistantError> {
        info!(
            connection_id = %request.connection_id,
            provider = %request.provider,
            "processing message"
        );

        let mut history = self.store.lock(&request.session_id).await;
        history.push_user(&request.message)?;

        let compaction = self
            .budget
            .enforce(&mut history, self.summarizer.as_ref(), self.config.request_timeout)
            .await;
        if compaction == Compaction::Summarized {
            history.push_user(&request.message)?;
        }

        let provider = if request.provider.is_empty() {
            self.config.default_provider.clone()
        } else {
            request.provider.clone()
        };
        let ctx = DispatchContext::new(&request.session_id, &request.connection_id, provider);
        Ok((history, ctx))
    }

    /// Returns a copy of a session's history, if the session exists.
    pub async fn history(&self, session_id: &str) -> Option<History> {
        self.store.find(session_id).await
    }

    /// Returns the audited tool calls of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the audit log cannot be read.
    pub async fn tool_calls(&self, session_id: &str) -> Result<Vec<ToolCallRecord>, AuditError> {
        self.audit.for_session(session_id).await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &self.engine)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

fn log_outcome(result: &Result<String, AssistantError>) {
    match result {
        Ok(answer) => info!(answer_len = answer.len(), "message processed"),
        Err(e) => error!(error = %e, "message failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use crate::catalog::tests::catalog;
    use crate::engine::ChunkKind;
    use crate::error::SummarizationError;
    use crate::testing::{RecordingConnector, Reply, ScriptedBackend};
    use crate::turn::Turn;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use switchboard_ai::{LlmDelta, LlmError, LlmResponse, ToolCall};

    struct FixedSummarizer(Result<String, SummarizationError>);

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _turns: &[Turn]) -> Result<String, SummarizationError> {
            self.0.clone()
        }
    }

    fn long_message() -> String {
        "x".repeat(2400)
    }

    fn orchestrator_with(
        backend: Arc<ScriptedBackend>,
        connector: Arc<RecordingConnector>,
        config: OrchestratorConfig,
    ) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            backend,
            connector,
            Arc::new(catalog()),
            Arc::new(InMemoryAuditLog::new()),
            config,
        ))
    }

    fn orchestrator(backend: Arc<ScriptedBackend>) -> Arc<Orchestrator> {
        orchestrator_with(
            backend,
            Arc::new(RecordingConnector::default()),
            OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn hello_scenario() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(LlmResponse::text("hi there"))]));
        let orchestrator = orchestrator(backend);

        let answer = orchestrator
            .send_message(MessageRequest::new("hello", "s1"))
            .await
            .unwrap();

        assert_eq!(answer, "hi there");
        let history = orchestrator.history("s1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.turns()[1], Turn::user("hello"));
        assert_eq!(history.turns()[2], Turn::assistant("hi there", Vec::new()));
        assert!(history.system_prompt().contains("'Account', 'Contact', 'Lead'"));
    }

    #[tokio::test]
    async fn each_plain_exchange_adds_two_turns() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(LlmResponse::text("one")),
            Ok(LlmResponse::text("two")),
            Ok(LlmResponse::text("three")),
        ]));
        let orchestrator = orchestrator(backend);

        for (n, message) in ["a", "b", "c"].into_iter().enumerate() {
            orchestrator
                .send_message(MessageRequest::new(message, "s1"))
                .await
                .unwrap();
            assert_eq!(orchestrator.history("s1").await.unwrap().len(), 1 + 2 * (n + 1));
        }
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_state() {
        let backend = Arc::new(ScriptedBackend::new(Vec::new()));
        let orchestrator = orchestrator(backend.clone());

        let err = orchestrator
            .send_message(MessageRequest::new("   ", "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::InvalidInput { .. }));

        let err = orchestrator
            .stream_message(MessageRequest::new("hello", ""))
            .unwrap_err();
        assert!(matches!(err, AssistantError::InvalidInput { .. }));

        assert!(orchestrator.history("s1").await.is_none());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn tool_calls_are_audited_per_session() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(LlmResponse::default().with_tool_call(ToolCall::new(
                "call_1",
                "fetch_entity",
                r#"{"entityType": "Lead"}"#,
            ))),
            Ok(LlmResponse::text("You have no leads.")),
        ]));
        let connector =
            Arc::new(RecordingConnector::default().respond("fetch-entity", Ok(json!([]))));
        let orchestrator =
            orchestrator_with(backend, connector.clone(), OrchestratorConfig::default());

        orchestrator
            .send_message(MessageRequest::new("any leads?", "s1").with_connection_id("conn-9"))
            .await
            .unwrap();

        let records = orchestrator.tool_calls("s1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool_name, "fetch_entity");
        assert_eq!(records[0].arguments, json!({"entityType": "Lead"}));
        assert!(orchestrator.tool_calls("s2").await.unwrap().is_empty());
        assert_eq!(connector.operations()[0].connection_id, "conn-9");
    }

    #[tokio::test]
    async fn over_budget_history_is_summarized_before_completion() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(LlmResponse::text("first")),
            Ok(LlmResponse::text("second")),
        ]));
        let orchestrator = Arc::new(
            Orchestrator::new(
                backend.clone(),
                Arc::new(RecordingConnector::default()),
                Arc::new(catalog()),
                Arc::new(InMemoryAuditLog::new()),
                OrchestratorConfig::default()
                    .with_context_limit(600)
                    .with_system_prompt("sys"),
            )
            .with_summarizer(Arc::new(FixedSummarizer(Ok("Talked about x.".to_string())))),
        );

        orchestrator
            .send_message(MessageRequest::new("hello", "s1"))
            .await
            .unwrap();
        orchestrator
            .send_message(MessageRequest::new(long_message(), "s1"))
            .await
            .unwrap();

        let history = orchestrator.history("s1").await.unwrap();
        assert_eq!(
            history.turns(),
            &[
                Turn::system("Previous conversation summary: Talked about x.\n\nsys"),
                Turn::user(long_message()),
                Turn::assistant("second", Vec::new()),
            ]
        );
        assert_eq!(backend.requests()[1].messages.len(), 2);
    }

    #[tokio::test]
    async fn failed_summary_falls_back_to_recent_turns() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(LlmResponse::text("first")),
            Ok(LlmResponse::text("second")),
        ]));
        let orchestrator = Arc::new(
            Orchestrator::new(
                backend,
                Arc::new(RecordingConnector::default()),
                Arc::new(catalog()),
                Arc::new(InMemoryAuditLog::new()),
                OrchestratorConfig::default()
                    .with_context_limit(600)
                    .with_system_prompt("sys"),
            )
            .with_summarizer(Arc::new(FixedSummarizer(Err(SummarizationError::EmptySummary)))),
        );

        orchestrator
            .send_message(MessageRequest::new("hello", "s1"))
            .await
            .unwrap();
        orchestrator
            .send_message(MessageRequest::new(long_message(), "s1"))
            .await
            .unwrap();

        let history = orchestrator.history("s1").await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history.system_prompt(), "sys");
        assert_eq!(history.turns()[1], Turn::user("hello"));
        assert_eq!(history.turns()[3], Turn::user(long_message()));
    }

    #[tokio::test]
    async fn stream_yields_chunks_and_records_history() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![Reply::Deltas(vec![
            Ok(LlmDelta::Content("Hi! ".to_string())),
            Ok(LlmDelta::Content("How can I help?".to_string())),
        ])]));
        let orchestrator = orchestrator(backend);

        let chunks: Vec<_> = orchestrator
            .stream_message(MessageRequest::new("hello", "s1"))
            .unwrap()
            .collect()
            .await;

        let chunks: Vec<StreamChunk> = chunks.into_iter().map(Result::unwrap).collect();
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Content));
        let text: String = chunks.iter().filter_map(StreamChunk::text).collect();
        assert_eq!(text, "Hi! How can I help?");

        let history = orchestrator.history("s1").await.unwrap();
        assert_eq!(history.turns()[2], Turn::assistant("Hi! How can I help?", Vec::new()));
    }

    #[tokio::test]
    async fn stream_ends_with_backend_error() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![Reply::Deltas(vec![
            Ok(LlmDelta::Content("Let me check. ".to_string())),
            Err(LlmError::RequestFailed {
                reason: "upstream closed".to_string(),
            }),
        ])]));
        let orchestrator = orchestrator(backend);

        let items: Vec<_> = orchestrator
            .stream_message(MessageRequest::new("hello", "s1"))
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(
            items[1],
            Err(AssistantError::Backend(LlmError::RequestFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn cancelled_stream_reports_cancellation() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![Reply::Stall]));
        let orchestrator = orchestrator(backend);
        let cancel = CancellationToken::new();

        let stream = orchestrator
            .stream_message_with_cancellation(MessageRequest::new("hello", "s1"), cancel.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items, vec![Err(AssistantError::Cancelled)]);
        let history = orchestrator.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn abandoned_request_still_answers_its_tool_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(LlmResponse::default().with_tool_call(ToolCall::new("call_1", "fetch_emails", "{}"))),
            Ok(LlmResponse::text("No new mail.")),
            Ok(LlmResponse::text("Hello again!")),
        ]));
        let connector =
            Arc::new(RecordingConnector::default().with_delay(Duration::from_millis(200)));
        let orchestrator =
            orchestrator_with(backend, connector.clone(), OrchestratorConfig::default());

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            orchestrator.send_message(MessageRequest::new("check mail", "s1")),
        )
        .await;
        assert!(abandoned.is_err());

        let answer = orchestrator
            .send_message(MessageRequest::new("hello again", "s1"))
            .await
            .unwrap();

        assert_eq!(answer, "Hello again!");
        assert_eq!(connector.operations().len(), 1);
        let history = orchestrator.history("s1").await.unwrap();
        let roles: Vec<_> = history.turns().iter().map(Turn::role).collect();
        assert_eq!(
            roles,
            ["system", "user", "assistant", "tool", "assistant", "user", "assistant"]
        );
        assert!(!history.has_unanswered());
    }

    #[tokio::test]
    async fn concurrent_requests_for_one_session_do_not_interleave() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(LlmResponse::default().with_tool_call(ToolCall::new("call_1", "fetch_emails", "{}"))),
            Ok(LlmResponse::text("first done")),
            Ok(LlmResponse::text("second done")),
        ]));
        let orchestrator = orchestrator(backend);

        let (first, second) = tokio::join!(
            orchestrator.send_message(MessageRequest::new("one", "s1")),
            orchestrator.send_message(MessageRequest::new("two", "s1")),
        );
        first.unwrap();
        second.unwrap();

        let history = orchestrator.history("s1").await.unwrap();
        let roles: Vec<_> = history.turns().iter().map(Turn::role).collect();
        assert_eq!(
            roles,
            ["system", "user", "assistant", "tool", "assistant", "user", "assistant"]
        );
        assert!(!history.has_unanswered());
    }
}
