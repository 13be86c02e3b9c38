//! Error types for the server.
//!
//! - `ServerError`: process bootstrap failures, reported through rootcause
//! - `ApiError`: request failures, mapped to HTTP responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;
use switchboard_ai::LlmError;
use switchboard_conversation::{AssistantError, AuditError};

/// Errors while bringing the server up.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The tool catalog could not be loaded.
    Catalog { details: String },
    /// The completion backend could not be constructed.
    Backend { details: String },
    /// The action platform client could not be constructed.
    Connector { details: String },
    /// The listener could not be bound.
    Bind { addr: String, details: String },
    /// The server stopped with an error.
    Serve { details: String },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "failed to load configuration: {details}"),
            Self::Catalog { details } => write!(f, "failed to load tool catalog: {details}"),
            Self::Backend { details } => {
                write!(f, "failed to create completion backend: {details}")
            }
            Self::Connector { details } => {
                write!(f, "failed to create action platform client: {details}")
            }
            Self::Bind { addr, details } => write!(f, "failed to bind to '{addr}': {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for ServerError {}

/// Errors returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The assistant could not answer.
    Assistant(AssistantError),
    /// The audit log could not be read.
    Audit(AuditError),
    /// No conversation exists for the session.
    SessionNotFound { session_id: String },
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        Self::Assistant(err)
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        Self::Audit(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Assistant(AssistantError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            Self::Assistant(AssistantError::Backend(LlmError::Timeout)) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::Assistant(AssistantError::Backend(LlmError::RateLimited { .. })) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::Assistant(AssistantError::Backend(_)) => StatusCode::BAD_GATEWAY,
            Self::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Assistant(_) | Self::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            Self::Assistant(AssistantError::InvalidInput { reason }) => reason.clone(),
            Self::Assistant(err) => format!("Error communicating with assistant: {err}"),
            Self::Audit(err) => err.to_string(),
            Self::SessionNotFound { session_id } => format!("session '{session_id}' not found"),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
