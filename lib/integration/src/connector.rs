//! Connector trait and related types.
//!
//! The conversation layer reaches mailboxes and CRMs through a connector
//! platform that runs named actions against a provider connection. All such
//! platforms implement [`Connector`].

use crate::error::ConnectorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// An action request against one provider connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Integration key of the provider on the platform.
    pub provider_config_key: String,
    /// Connection to act on behalf of.
    pub connection_id: String,
    /// Action name, e.g. `fetch-emails`.
    pub name: String,
    /// Action input.
    pub parameters: JsonValue,
}

impl Operation {
    /// Creates a new operation with empty input.
    #[must_use]
    pub fn new(
        provider_config_key: impl Into<String>,
        connection_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            provider_config_key: provider_config_key.into(),
            connection_id: connection_id.into(),
            name: name.into(),
            parameters: JsonValue::Object(Default::default()),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        if let JsonValue::Object(ref mut map) = self.parameters {
            map.insert(key.into(), value);
        }
        self
    }

    /// Sets all parameters at once.
    #[must_use]
    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Trait for connector platforms.
///
/// Implementations return the action's response payload as-is; shaping it
/// for the model is left to the caller.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Runs an action.
    ///
    /// # Errors
    ///
    /// Returns an error if the action cannot be run or reports a failure.
    async fn execute(&self, operation: Operation) -> Result<JsonValue, ConnectorError>;
}
