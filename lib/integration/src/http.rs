//! HTTP client for the action-trigger API of the connector platform.

use crate::connector::{Connector, Operation};
use crate::error::ConnectorError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, instrument};

/// Default platform host.
pub const DEFAULT_BASE_URL: &str = "https://api.nango.dev";

/// Connection settings for the action platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlatformConfig {
    /// Platform base URL.
    pub base_url: String,
    /// Secret key sent as a bearer token.
    pub secret_key: String,
}

impl ActionPlatformConfig {
    /// Creates a configuration against the default host.
    #[must_use]
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            secret_key: secret_key.into(),
        }
    }

    /// Overrides the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Runs actions through `POST {base}/action/trigger`.
#[derive(Debug, Clone)]
pub struct HttpActionConnector {
    client: reqwest::Client,
    config: ActionPlatformConfig,
}

impl HttpActionConnector {
    /// Creates a connector.
    pub fn new(config: ActionPlatformConfig) -> switchboard_core::Result<Self, ConnectorError> {
        if config.secret_key.is_empty() {
            return Err(ConnectorError::InvalidConfig {
                reason: "secret key is required".to_string(),
            }
            .into());
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConnectorError::InvalidConfig {
                reason: e.to_string(),
            })?;

        debug!(secret_key_len = config.secret_key.len(), "action platform client initialized");
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/action/trigger", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Connector for HttpActionConnector {
    #[instrument(skip(self, operation), fields(action = %operation.name, provider = %operation.provider_config_key))]
    async fn execute(&self, operation: Operation) -> Result<JsonValue, ConnectorError> {
        let body = json!({
            "action_name": operation.name,
            "input": operation.parameters,
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.secret_key)
            .header("Connection-Id", &operation.connection_id)
            .header("Provider-Config-Key", &operation.provider_config_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConnectorError::Timeout
                } else {
                    ConnectorError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let reason = response.text().await.unwrap_or_default();
                return Err(ConnectorError::AuthenticationFailed { reason });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse().ok());
                return Err(ConnectorError::RateLimited { retry_after_secs });
            }
            _ if !status.is_success() => {
                let detail = response.text().await.unwrap_or_default();
                return Err(ConnectorError::ActionFailed {
                    action: operation.name,
                    reason: format!("HTTP {status}: {detail}"),
                });
            }
            _ => {}
        }

        let text = response
            .text()
            .await
            .map_err(|e| ConnectorError::ProtocolError {
                reason: e.to_string(),
            })?;
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        let payload: JsonValue =
            serde_json::from_str(&text).map_err(|e| ConnectorError::ProtocolError {
                reason: e.to_string(),
            })?;

        debug!(response_len = text.len(), "action completed");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector_for(server: &MockServer) -> HttpActionConnector {
        HttpActionConnector::new(ActionPlatformConfig::new("sk-test").with_base_url(server.uri()))
            .expect("connector")
    }

    #[test]
    fn requires_secret_key() {
        assert!(HttpActionConnector::new(ActionPlatformConfig::new("")).is_err());
    }

    #[tokio::test]
    async fn triggers_action_with_connection_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action/trigger"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("connection-id", "conn-42"))
            .and(header("provider-config-key", "google-mail"))
            .and(body_json(json!({
                "action_name": "send-email",
                "input": {"to": "a@example.com"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "m1", "threadId": "t1"})),
            )
            .mount(&server)
            .await;

        let op = Operation::new("google-mail", "conn-42", "send-email")
            .with_param("to", json!("a@example.com"));
        let result = connector_for(&server).execute(op).await.expect("execute");

        assert_eq!(result, json!({"id": "m1", "threadId": "t1"}));
    }

    #[tokio::test]
    async fn maps_server_errors_to_action_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = connector_for(&server)
            .execute(Operation::new("salesforce", "conn", "fetch-entity"))
            .await
            .unwrap_err();

        match err {
            ConnectorError::ActionFailed { action, reason } => {
                assert_eq!(action, "fetch-entity");
                assert!(reason.contains("boom"));
            }
            other => panic!("expected action failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn maps_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = connector_for(&server)
            .execute(Operation::new("salesforce", "conn", "fetch-entity"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ConnectorError::AuthenticationFailed {
                reason: "bad key".to_string()
            }
        );
    }
}
