//! Core types shared across the switchboard assistant backend.
//!
//! Provides the rootcause-backed `Result` alias and the ULID identifiers
//! minted by the orchestration engine.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{MessageId, ParseIdError, ToolCallId, ToolCallRecordId};
