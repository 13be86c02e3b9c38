//! Conversation orchestration for switchboard.
//!
//! This crate provides:
//!
//! - **Turns and histories**: per-session conversation state with its shape
//!   enforced on every append
//! - **Conversation store**: process-lifetime session map with per-session
//!   locking
//! - **Context budget**: size estimation and summarization of long histories
//! - **Tool catalog and dispatch**: declared tools, argument validation and
//!   routing to connector actions, with an audit trail
//! - **Completion engine**: the request/tool/request loop, one-shot or
//!   streamed
//! - **Orchestrator**: the `send_message` / `stream_message` facade

pub mod audit;
pub mod budget;
pub mod catalog;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod store;
pub mod turn;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditLog, InMemoryAuditLog, ToolCallRecord};
pub use budget::{Compaction, ContextBudget, DEFAULT_CONTEXT_LIMIT, LlmSummarizer, Summarizer};
pub use catalog::{ProviderDefinition, ToolCatalog, ToolDefinition};
pub use dispatch::{DispatchContext, ToolDispatcher};
pub use engine::{
    ChunkKind, CompletionEngine, EngineConfig, FALLBACK_RESPONSE, StreamChunk,
};
pub use error::{
    AssistantError, AuditError, CatalogError, HistoryError, SummarizationError, ToolError,
};
pub use orchestrator::{ChunkStream, MessageRequest, Orchestrator, OrchestratorConfig};
pub use prompt::default_system_prompt;
pub use store::{ConversationStore, SessionGuard};
pub use turn::{History, Turn};
