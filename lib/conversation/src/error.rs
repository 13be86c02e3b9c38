//! Error types for the conversation crate.
//!
//! - `HistoryError`: a turn would break the shape of a conversation history
//! - `CatalogError`: tool catalog loading and lookup
//! - `ToolError`: a single tool dispatch failed
//! - `SummarizationError`: history compaction could not produce a summary
//! - `AuditError`: the tool-call audit log rejected a write or read
//! - `AssistantError`: caller-facing failure of a whole request

use std::fmt;
use switchboard_ai::LlmError;
use switchboard_integration::ConnectorError;

/// Errors from history mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// A history must start with exactly one system turn.
    MissingSystemTurn,
    /// A system turn appeared after the first position.
    MisplacedSystemTurn,
    /// A tool turn answers no pending invocation.
    UnknownToolCall { tool_call_id: String },
    /// Invocations are still waiting for their tool turns.
    UnansweredToolCalls { pending: Vec<String> },
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSystemTurn => write!(f, "history must start with a system turn"),
            Self::MisplacedSystemTurn => {
                write!(f, "system turn is only allowed at the start of a history")
            }
            Self::UnknownToolCall { tool_call_id } => {
                write!(f, "tool turn '{tool_call_id}' answers no pending invocation")
            }
            Self::UnansweredToolCalls { pending } => {
                write!(f, "unanswered tool invocations: {}", pending.join(", "))
            }
        }
    }
}

impl std::error::Error for HistoryError {}

/// Errors from the tool catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The catalog file could not be read.
    ReadFailed { path: String, reason: String },
    /// The catalog document is malformed.
    ParseFailed { reason: String },
    /// Two tools share a name.
    DuplicateTool { name: String },
    /// A tool declaration is unusable.
    InvalidDeclaration { name: String, reason: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed { path, reason } => {
                write!(f, "failed to read tool catalog '{path}': {reason}")
            }
            Self::ParseFailed { reason } => write!(f, "failed to parse tool catalog: {reason}"),
            Self::DuplicateTool { name } => write!(f, "tool '{name}' is declared twice"),
            Self::InvalidDeclaration { name, reason } => {
                write!(f, "invalid declaration for tool '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// Errors from dispatching one tool invocation.
///
/// None of these abort a conversation turn; the engine records them as an
/// error payload in the tool turn so the model can react.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No such tool in the catalog.
    UnknownTool { name: String },
    /// Arguments failed validation.
    InvalidArguments { name: String, reason: String },
    /// The tool is declared but no action handles it.
    UnsupportedTool { name: String },
    /// The connector action failed.
    Connector(ConnectorError),
    /// Drafting the email body failed.
    Drafting(LlmError),
    /// The action did not finish in time.
    Timeout { name: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool { name } => write!(f, "tool '{name}' not found in configuration"),
            Self::InvalidArguments { name, reason } => {
                write!(f, "invalid arguments for tool '{name}': {reason}")
            }
            Self::UnsupportedTool { name } => write!(f, "unsupported tool: {name}"),
            Self::Connector(err) => write!(f, "connector error: {err}"),
            Self::Drafting(err) => write!(f, "email drafting failed: {err}"),
            Self::Timeout { name } => write!(f, "tool '{name}' timed out"),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<ConnectorError> for ToolError {
    fn from(err: ConnectorError) -> Self {
        Self::Connector(err)
    }
}

/// Errors from conversation summarization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizationError {
    /// The completion call failed.
    Backend(LlmError),
    /// The backend answered with nothing.
    EmptySummary,
    /// Summarization did not finish in time.
    Timeout,
}

impl fmt::Display for SummarizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(err) => write!(f, "summarization failed: {err}"),
            Self::EmptySummary => write!(f, "summarization returned no content"),
            Self::Timeout => write!(f, "summarization timed out"),
        }
    }
}

impl std::error::Error for SummarizationError {}

/// Errors from the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The log could not be written or read.
    Unavailable { reason: String },
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "audit log unavailable: {reason}"),
        }
    }
}

impl std::error::Error for AuditError {}

/// Caller-facing errors of a send or stream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantError {
    /// The request was malformed; nothing was changed.
    InvalidInput { reason: String },
    /// The completion backend failed.
    Backend(LlmError),
    /// The model kept calling tools past the round limit.
    MaxToolRoundsExceeded { max: usize },
    /// The caller cancelled the request.
    Cancelled,
    /// The session history rejected a turn.
    History(HistoryError),
    /// The task running the request stopped before producing an answer.
    Interrupted { reason: String },
}

impl fmt::Display for AssistantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { reason } => write!(f, "invalid input: {reason}"),
            Self::Backend(err) => write!(f, "completion backend error: {err}"),
            Self::MaxToolRoundsExceeded { max } => {
                write!(f, "exceeded the limit of {max} tool rounds")
            }
            Self::Cancelled => write!(f, "request cancelled"),
            Self::History(err) => write!(f, "history error: {err}"),
            Self::Interrupted { reason } => write!(f, "request interrupted: {reason}"),
        }
    }
}

impl std::error::Error for AssistantError {}

impl From<LlmError> for AssistantError {
    fn from(err: LlmError) -> Self {
        Self::Backend(err)
    }
}

impl From<HistoryError> for AssistantError {
    fn from(err: HistoryError) -> Self {
        Self::History(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_display() {
        let err = ToolError::InvalidArguments {
            name: "send_email".to_string(),
            reason: "missing field 'to'".to_string(),
        };
        assert!(err.to_string().contains("send_email"));
        assert!(err.to_string().contains("missing field 'to'"));
    }

    #[test]
    fn connector_errors_convert() {
        let err: ToolError = ConnectorError::Timeout.into();
        assert_eq!(err, ToolError::Connector(ConnectorError::Timeout));
        assert_eq!(err.to_string(), "connector error: operation timed out");
    }

    #[test]
    fn assistant_error_display() {
        let err = AssistantError::MaxToolRoundsExceeded { max: 10 };
        assert_eq!(err.to_string(), "exceeded the limit of 10 tool rounds");

        let err: AssistantError = LlmError::Timeout.into();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn unanswered_calls_are_listed() {
        let err = HistoryError::UnansweredToolCalls {
            pending: vec!["call_1".to_string(), "call_2".to_string()],
        };
        assert_eq!(err.to_string(), "unanswered tool invocations: call_1, call_2");
    }
}
