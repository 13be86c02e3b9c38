//! Append-only record of completed tool calls.

use crate::error::AuditError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use switchboard_core::ToolCallRecordId;
use tokio::sync::RwLock;

/// One completed tool dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Unique record identifier.
    pub id: ToolCallRecordId,
    /// Session the call belongs to.
    pub session_id: String,
    /// Tool that ran.
    pub tool_name: String,
    /// Arguments as supplied by the model.
    pub arguments: JsonValue,
    /// Result handed back to the model.
    pub result: JsonValue,
    /// When the call completed.
    pub timestamp: DateTime<Utc>,
}

impl ToolCallRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: JsonValue,
        result: JsonValue,
    ) -> Self {
        Self {
            id: ToolCallRecordId::new(),
            session_id: session_id.into(),
            tool_name: tool_name.into(),
            arguments,
            result,
            timestamp: Utc::now(),
        }
    }
}

/// Storage for tool call records.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Appends a record.
    async fn record(&self, record: ToolCallRecord) -> Result<(), AuditError>;

    /// Returns a session's records, oldest first.
    async fn for_session(&self, session_id: &str) -> Result<Vec<ToolCallRecord>, AuditError>;
}

/// Process-lifetime audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<ToolCallRecord>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, record: ToolCallRecord) -> Result<(), AuditError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn for_session(&self, session_id: &str) -> Result<Vec<ToolCallRecord>, AuditError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }
}
