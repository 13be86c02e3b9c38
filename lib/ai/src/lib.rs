//! Completion primitives for switchboard.
//!
//! This crate provides the backend abstraction the conversation engine
//! drives, an OpenAI-compatible HTTP implementation of it, and the email
//! drafting helper used when a send request arrives without a body.

pub mod backend;
pub mod draft;
pub mod error;
pub mod openai;

pub use backend::{
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DeltaStream, LlmBackend, LlmBackendConfig, LlmDelta,
    LlmMessage, LlmProvider, LlmRequest, LlmResponse, TokenUsage, ToolCall, ToolCallDelta,
    ToolDeclaration,
};
pub use draft::{EmailDraft, EmailDrafter};
pub use error::LlmError;
pub use openai::OpenAiCompatibleBackend;
