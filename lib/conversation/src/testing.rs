//! Scripted fakes shared by the crate's tests.

use crate::audit::{AuditLog, ToolCallRecord};
use crate::error::AuditError;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use switchboard_ai::{
    DeltaStream, LlmBackend, LlmDelta, LlmError, LlmProvider, LlmRequest, LlmResponse,
};
use switchboard_integration::{Connector, ConnectorError, Operation};

/// One scripted backend reply.
pub(crate) enum Reply {
    /// A whole response, replayed as deltas when streamed.
    Response(Result<LlmResponse, LlmError>),
    /// A raw delta feed; only valid for streaming.
    Deltas(Vec<Result<LlmDelta, LlmError>>),
    /// Never answers.
    Stall,
}

/// Backend that answers from a queue of replies and records every request.
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new(responses: Vec<Result<LlmResponse, LlmError>>) -> Self {
        Self::with_replies(responses.into_iter().map(Reply::Response).collect())
    }

    pub(crate) fn with_replies(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &LlmRequest) -> Option<Reply> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies.lock().unwrap().pop_front()
    }
}

fn exhausted() -> LlmError {
    LlmError::RequestFailed {
        reason: "script exhausted".to_string(),
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match self.next(request) {
            Some(Reply::Response(response)) => response,
            Some(Reply::Deltas(_)) => Err(LlmError::RequestFailed {
                reason: "delta script used for a one-shot request".to_string(),
            }),
            Some(Reply::Stall) => std::future::pending().await,
            None => Err(exhausted()),
        }
    }

    async fn stream(&self, request: &LlmRequest) -> Result<DeltaStream, LlmError> {
        match self.next(request) {
            Some(Reply::Response(response)) => {
                let deltas = response?.into_deltas().into_iter().map(Ok);
                Ok(futures::stream::iter(deltas).boxed())
            }
            Some(Reply::Deltas(deltas)) => Ok(futures::stream::iter(deltas).boxed()),
            Some(Reply::Stall) => Ok(futures::stream::pending().boxed()),
            None => Err(exhausted()),
        }
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::OpenAiCompatible
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Connector that records operations and answers per action name.
///
/// Actions without a canned answer succeed with an empty object.
#[derive(Default)]
pub(crate) struct RecordingConnector {
    responses: HashMap<String, Result<JsonValue, ConnectorError>>,
    operations: Mutex<Vec<Operation>>,
    delay: Option<Duration>,
}

impl RecordingConnector {
    pub(crate) fn respond(
        mut self,
        action: &str,
        response: Result<JsonValue, ConnectorError>,
    ) -> Self {
        self.responses.insert(action.to_string(), response);
        self
    }

    /// Makes every action take `delay` before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn operations(&self) -> Vec<Operation> {
        self.operations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn execute(&self, operation: Operation) -> Result<JsonValue, ConnectorError> {
        let response = self
            .responses
            .get(&operation.name)
            .cloned()
            .unwrap_or_else(|| Ok(serde_json::json!({})));
        self.operations.lock().unwrap().push(operation);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        response
    }
}

/// Audit log that rejects every write.
pub(crate) struct FailingAuditLog;

#[async_trait]
impl AuditLog for FailingAuditLog {
    async fn record(&self, _record: ToolCallRecord) -> Result<(), AuditError> {
        Err(AuditError::Unavailable {
            reason: "disk full".to_string(),
        })
    }

    async fn for_session(&self, _session_id: &str) -> Result<Vec<ToolCallRecord>, AuditError> {
        Ok(Vec::new())
    }
}
