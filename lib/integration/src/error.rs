//! Error types for the integration crate.
//!
//! - `ConnectorError`: failures of actions run on the connector platform
//! - `EntityValidationError`: CRM record fields rejected before any action

use std::fmt;

/// Errors from connector operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// Connection to the platform failed.
    ConnectionFailed { reason: String },
    /// The platform rejected the credentials.
    AuthenticationFailed { reason: String },
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// The action ran and reported a failure.
    ActionFailed { action: String, reason: String },
    /// The platform answered with something unreadable.
    ProtocolError { reason: String },
    /// Invalid client configuration.
    InvalidConfig { reason: String },
    /// Timeout waiting for response.
    Timeout,
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { reason } => {
                write!(f, "connection failed: {reason}")
            }
            Self::AuthenticationFailed { reason } => {
                write!(f, "authentication failed: {reason}")
            }
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::ActionFailed { action, reason } => {
                write!(f, "action '{action}' failed: {reason}")
            }
            Self::ProtocolError { reason } => {
                write!(f, "protocol error: {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid connector configuration: {reason}")
            }
            Self::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl std::error::Error for ConnectorError {}

/// Errors from CRM record field validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityValidationError {
    /// Not one of the known record kinds.
    UnknownEntityType { entity_type: String },
    /// The field set is not a JSON object.
    FieldsNotObject,
    /// A required field is absent.
    MissingField { entity_type: String, field: String },
    /// A field has the wrong type or format.
    InvalidField {
        entity_type: String,
        field: String,
        reason: String,
    },
    /// The identifying field of an update does not match the identifier.
    IdentifierMismatch { entity_type: String, field: String },
}

impl fmt::Display for EntityValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEntityType { entity_type } => {
                write!(f, "invalid entity type: {entity_type}")
            }
            Self::FieldsNotObject => write!(f, "entity fields must be an object"),
            Self::MissingField { entity_type, field } => {
                write!(f, "{entity_type} requires field '{field}'")
            }
            Self::InvalidField {
                entity_type,
                field,
                reason,
            } => {
                write!(f, "{entity_type} field '{field}' is invalid: {reason}")
            }
            Self::IdentifierMismatch { entity_type, field } => {
                write!(f, "{field} must match identifier for {entity_type} updates")
            }
        }
    }
}

impl std::error::Error for EntityValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_error_display() {
        let err = ConnectorError::ConnectionFailed {
            reason: "host unreachable".to_string(),
        };
        assert!(err.to_string().contains("connection failed"));
        assert!(err.to_string().contains("host unreachable"));
    }

    #[test]
    fn connector_error_rate_limited() {
        let err = ConnectorError::RateLimited {
            retry_after_secs: Some(60),
        };
        assert!(err.to_string().contains("60s"));
    }

    #[test]
    fn action_failure_names_the_action() {
        let err = ConnectorError::ActionFailed {
            action: "send-email".to_string(),
            reason: "HTTP 500".to_string(),
        };
        assert_eq!(err.to_string(), "action 'send-email' failed: HTTP 500");
    }

    #[test]
    fn identifier_mismatch_display() {
        let err = EntityValidationError::IdentifierMismatch {
            entity_type: "Case".to_string(),
            field: "CaseNumber".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "CaseNumber must match identifier for Case updates"
        );
    }
}
