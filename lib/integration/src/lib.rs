//! Integration layer for switchboard.
//!
//! This crate provides:
//!
//! - **Connector trait**: common interface to the action platform
//! - **HTTP connector**: client for the platform's action-trigger API
//! - **Mailbox shaping**: cleanup of fetched messages for the model
//! - **Entity validation**: CRM record field checks

pub mod connector;
pub mod email;
pub mod entity;
pub mod error;
pub mod http;

pub use connector::{Connector, Operation};
pub use email::{EmailRecord, clean_and_format_emails, format_mailbox_result};
pub use entity::{EntityType, EntityWrite, validate_entity_fields};
pub use error::{ConnectorError, EntityValidationError};
pub use http::{ActionPlatformConfig, HttpActionConnector};
