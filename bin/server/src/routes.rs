//! HTTP routes.
//!
//! A thin adapter: handlers translate requests into [`MessageRequest`]s and
//! orchestrator results back into JSON or server-sent events.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive};
use axum::response::Sse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use switchboard_conversation::{MessageRequest, ToolCallRecord, Turn};
use switchboard_core::MessageId;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions/{session_id}/messages", post(send_message))
        .route("/sessions/{session_id}/stream", post(stream_message))
        .route("/sessions/{session_id}/history", get(history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of a message request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub message: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub provider: String,
}

impl MessageBody {
    fn into_request(self, session_id: String) -> MessageRequest {
        MessageRequest::new(self.message, session_id)
            .with_connection_id(self.connection_id)
            .with_provider(self.provider)
    }
}

/// Answer to a message request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message_id: MessageId,
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    session_id: String,
    turns: Vec<Turn>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<MessageResponse>, ApiError> {
    let response = state
        .orchestrator
        .send_message(body.into_request(session_id.clone()))
        .await?;
    let tool_calls = state.orchestrator.tool_calls(&session_id).await?;

    Ok(Json(MessageResponse {
        message_id: MessageId::new(),
        response,
        tool_calls,
    }))
}

/// Streams the answer as server-sent events: one `data` event per chunk,
/// an `error` event if the request fails, then a final `done` event.
///
/// Dropping the connection cancels the request at its next backend wait.
async fn stream_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let cancel = CancellationToken::new();
    let chunks = state
        .orchestrator
        .stream_message_with_cancellation(body.into_request(session_id), cancel.clone())?;

    let guard = cancel.drop_guard();
    let events = chunks
        .map(move |item| {
            let _ = &guard;
            Ok::<_, Infallible>(match item {
                Ok(chunk) => Event::default().json_data(&chunk).unwrap_or_else(|e| {
                    warn!(error = %e, "failed to serialize chunk");
                    Event::default().event("error").data(e.to_string())
                }),
                Err(e) => Event::default()
                    .event("error")
                    .data(json!({ "error": e.to_string() }).to_string()),
            })
        })
        .chain(tokio_stream::once(Ok(Event::default()
            .event("done")
            .data("[DONE]"))));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state
        .orchestrator
        .history(&session_id)
        .await
        .ok_or_else(|| ApiError::SessionNotFound {
            session_id: session_id.clone(),
        })?;

    Ok(Json(HistoryResponse {
        session_id,
        turns: history.turns().to_vec(),
    }))
}
