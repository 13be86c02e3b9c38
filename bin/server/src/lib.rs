//! switchboard HTTP server.
//!
//! Exposes the conversation orchestrator over JSON and server-sent events.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
