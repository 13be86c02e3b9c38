//! Tool dispatch.
//!
//! Turns one model-requested invocation into one connector action: look the
//! tool up, validate its arguments, run the matching action, shape the
//! result and write an audit record. Nothing reaches the connector unless
//! lookup and validation pass.

use crate::audit::{AuditLog, ToolCallRecord};
use crate::catalog::ToolCatalog;
use crate::error::ToolError;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Duration;
use switchboard_ai::EmailDrafter;
use switchboard_integration::{
    Connector, EntityType, EntityWrite, Operation, format_mailbox_result, validate_entity_fields,
};
use tracing::{debug, info, instrument, warn};

/// Default deadline for one connector action.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Who a dispatch acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchContext {
    /// Session the invocation belongs to.
    pub session_id: String,
    /// Connection to act through; the provider's default is used if empty.
    pub connection_id: String,
    /// Provider for tools that do not name their own.
    pub provider: String,
}

impl DispatchContext {
    /// Creates a context.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        connection_id: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            connection_id: connection_id.into(),
            provider: provider.into(),
        }
    }
}

/// Validates and runs tool invocations.
pub struct ToolDispatcher {
    catalog: Arc<ToolCatalog>,
    connector: Arc<dyn Connector>,
    audit: Arc<dyn AuditLog>,
    drafter: Option<EmailDrafter>,
    action_timeout: Duration,
}

impl ToolDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        catalog: Arc<ToolCatalog>,
        connector: Arc<dyn Connector>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            catalog,
            connector,
            audit,
            drafter: None,
            action_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Sets the drafter used for emails requested without a body.
    #[must_use]
    pub fn with_drafter(mut self, drafter: EmailDrafter) -> Self {
        self.drafter = Some(drafter);
        self
    }

    /// Sets the per-action deadline.
    #[must_use]
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Runs one invocation.
    ///
    /// `raw_args` is the argument text as produced by the model; blank text
    /// counts as an empty object.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTool` or `InvalidArguments` before any external call,
    /// and the action's failure otherwise.
    #[instrument(skip(self, raw_args, ctx), fields(session_id = %ctx.session_id))]
    pub async fn execute(
        &self,
        tool_name: &str,
        raw_args: &str,
        ctx: &DispatchContext,
    ) -> Result<JsonValue, ToolError> {
        let tool = self
            .catalog
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: tool_name.to_string(),
            })?;

        let args = parse_arguments(tool_name, raw_args)?;
        let validated = self.catalog.validate_args(tool_name, &args)?;
        debug!(tool_name, "arguments validated");

        let provider = tool.provider.as_deref().unwrap_or(&ctx.provider);
        let provider_config_key = self
            .catalog
            .provider_config_key(provider)
            .unwrap_or(provider)
            .to_string();
        let connection_id = if ctx.connection_id.is_empty() {
            self.catalog
                .connection_id(provider)
                .unwrap_or_default()
                .to_string()
        } else {
            ctx.connection_id.clone()
        };
        let target = Target {
            provider_config_key,
            connection_id,
        };

        let result = match tool_name {
            "fetch_emails" => self.fetch_emails(&target, validated).await?,
            "send_email" => self.send_email(&target, validated).await?,
            "fetch_entity" => self.fetch_entity(&target, &validated).await?,
            "update_entity" => self.update_entity(&target, &validated).await?,
            "create_entity" => self.create_entity(&target, &validated).await?,
            _ => {
                return Err(ToolError::UnsupportedTool {
                    name: tool_name.to_string(),
                });
            }
        };

        let record = ToolCallRecord::new(&ctx.session_id, tool_name, args, result.clone());
        match tokio::time::timeout(self.action_timeout, self.audit.record(record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(tool_name, error = %e, "failed to record tool call"),
            Err(_) => warn!(tool_name, "timed out recording tool call"),
        }

        info!(tool_name, "tool call completed");
        Ok(result)
    }

    async fn run(&self, target: &Target, action: &str, input: JsonValue) -> Result<JsonValue, ToolError> {
        let operation = Operation::new(
            &target.provider_config_key,
            &target.connection_id,
            action,
        )
        .with_parameters(input);

        tokio::time::timeout(self.action_timeout, self.connector.execute(operation))
            .await
            .map_err(|_| ToolError::Timeout {
                name: action.to_string(),
            })?
            .map_err(ToolError::from)
    }

    async fn fetch_emails(&self, target: &Target, args: JsonValue) -> Result<JsonValue, ToolError> {
        let response = self.run(target, "fetch-emails", args).await?;
        Ok(format_mailbox_result(response))
    }

    async fn send_email(&self, target: &Target, args: JsonValue) -> Result<JsonValue, ToolError> {
        let to = string_arg(&args, "to").unwrap_or_default();
        let subject = string_arg(&args, "subject").unwrap_or_default();

        let body = match (string_arg(&args, "body"), string_arg(&args, "user_query")) {
            (Some(body), _) if !body.is_empty() => body.to_string(),
            (_, Some(purpose)) => {
                let drafter = self.drafter.as_ref().ok_or_else(|| ToolError::InvalidArguments {
                    name: "send_email".to_string(),
                    reason: "no body given and email drafting is not configured".to_string(),
                })?;
                drafter
                    .draft(to, subject, purpose)
                    .await
                    .map_err(ToolError::Drafting)?
                    .body
            }
            _ => {
                return Err(ToolError::InvalidArguments {
                    name: "send_email".to_string(),
                    reason: "either 'body' or 'user_query' is required".to_string(),
                });
            }
        };

        let mut email = json!({ "to": to, "subject": subject, "body": body });
        if let Some(headers) = args.get("headers") {
            email["headers"] = headers.clone();
        }

        let response = self.run(target, "send-email", email).await?;
        Ok(json!({
            "status": "success",
            "data": {
                "id": response.get("id").cloned().unwrap_or(JsonValue::Null),
                "threadId": response.get("threadId").cloned().unwrap_or(JsonValue::Null),
                "generated_body": body,
            }
        }))
    }

    async fn fetch_entity(&self, target: &Target, args: &JsonValue) -> Result<JsonValue, ToolError> {
        let entity_type = entity_type_arg("fetch_entity", args)?;
        let response = self
            .run(target, "fetch-entity", json!({ "entityType": entity_type.as_str() }))
            .await?;
        Ok(success(response))
    }

    async fn update_entity(&self, target: &Target, args: &JsonValue) -> Result<JsonValue, ToolError> {
        let entity_type = entity_type_arg("update_entity", args)?;
        let identifier = string_arg(args, "identifier").unwrap_or_default();
        let fields = validate_entity_fields(
            entity_type,
            args.get("fields").unwrap_or(&JsonValue::Null),
            &EntityWrite::Update { identifier },
        )
        .map_err(|e| ToolError::InvalidArguments {
            name: "update_entity".to_string(),
            reason: e.to_string(),
        })?;

        let response = self
            .run(
                target,
                "update-entity",
                json!({
                    "entityType": entity_type.as_str(),
                    "identifier": identifier,
                    "fields": fields,
                }),
            )
            .await?;
        Ok(success(response))
    }

    async fn create_entity(&self, target: &Target, args: &JsonValue) -> Result<JsonValue, ToolError> {
        let entity_type = entity_type_arg("create_entity", args)?;
        let fields = validate_entity_fields(
            entity_type,
            args.get("fields").unwrap_or(&JsonValue::Null),
            &EntityWrite::Create,
        )
        .map_err(|e| ToolError::InvalidArguments {
            name: "create_entity".to_string(),
            reason: e.to_string(),
        })?;

        let response = self
            .run(
                target,
                "create-entity",
                json!({ "entityType": entity_type.as_str(), "fields": fields }),
            )
            .await?;
        Ok(success(response))
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.catalog.len())
            .field("drafter", &self.drafter.is_some())
            .field("action_timeout", &self.action_timeout)
            .finish_non_exhaustive()
    }
}

struct Target {
    provider_config_key: String,
    connection_id: String,
}

/// Parses model-produced argument text; blank text is an empty object.
fn parse_arguments(tool_name: &str, raw: &str) -> Result<JsonValue, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
        name: tool_name.to_string(),
        reason: format!("arguments are not valid JSON: {e}"),
    })
}

fn string_arg<'a>(args: &'a JsonValue, key: &str) -> Option<&'a str> {
    args.get(key).and_then(JsonValue::as_str)
}

fn entity_type_arg(tool_name: &str, args: &JsonValue) -> Result<EntityType, ToolError> {
    string_arg(args, "entityType")
        .unwrap_or_default()
        .parse()
        .map_err(|e: switchboard_integration::EntityValidationError| {
            ToolError::InvalidArguments {
                name: tool_name.to_string(),
                reason: e.to_string(),
            }
        })
}

fn success(data: JsonValue) -> JsonValue {
    json!({ "status": "success", "data": data })
}
