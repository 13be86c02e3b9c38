//! Tool catalog.
//!
//! Declares the tools the model may call and the providers they act on, and
//! validates model-supplied arguments against each tool's parameter schema.
//! Loaded once at startup from a JSON document:
//!
//! ```json
//! {
//!   "tools": [{ "name": "...", "description": "...", "parameters": {...}, "provider": "..." }],
//!   "providers": { "salesforce": { "provider_config_key": "...", "connection_id": "...", "objects": ["Lead"] } }
//! }
//! ```

use crate::error::{CatalogError, ToolError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::path::Path;
use switchboard_ai::ToolDeclaration;
use switchboard_integration::EntityType;
use tracing::{debug, info};

/// Definition of a tool available during conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON-schema-like parameter specification.
    pub parameters: JsonValue,
    /// Provider the tool acts on; the request's provider is used if absent.
    #[serde(default)]
    pub provider: Option<String>,
}

impl ToolDefinition {
    /// Creates a new tool definition with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
            provider: None,
        }
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Connection details of one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDefinition {
    /// Integration key on the connector platform.
    pub provider_config_key: String,
    /// Default connection, used when a request names none.
    #[serde(default)]
    pub connection_id: Option<String>,
    /// Record kinds the provider exposes.
    #[serde(default)]
    pub objects: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    tools: Vec<ToolDefinition>,
    #[serde(default)]
    providers: HashMap<String, ProviderDefinition>,
}

/// Registry of available tools and providers.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
    providers: HashMap<String, ProviderDefinition>,
}

impl ToolCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> switchboard_core::Result<Self, CatalogError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading tool catalog");
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_json(&text)?)
    }

    /// Parses a catalog from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or declares a tool
    /// twice.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument =
            serde_json::from_str(text).map_err(|e| CatalogError::ParseFailed {
                reason: e.to_string(),
            })?;

        let mut catalog = Self::new();
        for tool in document.tools {
            catalog.register(tool)?;
        }
        for (name, provider) in document.providers {
            catalog.register_provider(name, provider);
        }
        debug!(
            tools = catalog.len(),
            providers = catalog.providers.len(),
            "tool catalog ready"
        );
        Ok(catalog)
    }

    /// Registers a tool definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or the parameter schema is not
    /// an object.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), CatalogError> {
        if self.index.contains_key(&definition.name) {
            return Err(CatalogError::DuplicateTool {
                name: definition.name,
            });
        }
        if !definition.parameters.is_object() {
            return Err(CatalogError::InvalidDeclaration {
                name: definition.name,
                reason: "parameters must be an object".to_string(),
            });
        }
        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(definition);
        Ok(())
    }

    /// Registers a provider.
    pub fn register_provider(&mut self, name: impl Into<String>, provider: ProviderDefinition) {
        self.providers.insert(name.into(), provider);
    }

    /// Gets a tool definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Returns all tool definitions in declaration order.
    pub fn all(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Converts definitions to the declarations sent with each completion.
    #[must_use]
    pub fn tool_declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(ToolDefinition::declaration).collect()
    }

    /// Record kinds exposed by a provider; empty for unknown providers.
    #[must_use]
    pub fn provider_objects(&self, provider: &str) -> &[String] {
        self.providers
            .get(provider)
            .map(|p| p.objects.as_slice())
            .unwrap_or_default()
    }

    /// Integration key of a provider, if configured.
    #[must_use]
    pub fn provider_config_key(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .map(|p| p.provider_config_key.as_str())
    }

    /// Default connection of a provider, if configured.
    #[must_use]
    pub fn connection_id(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.connection_id.as_deref())
    }

    /// Validates arguments against a tool's parameter schema.
    ///
    /// Declared properties are type-checked, required ones enforced and
    /// undeclared ones dropped. Null counts as absent. Entity tools also
    /// get their `entityType` checked against the known record kinds.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTool` for undeclared tools and `InvalidArguments` for
    /// any violation.
    pub fn validate_args(&self, name: &str, args: &JsonValue) -> Result<JsonValue, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        let invalid = |reason: String| ToolError::InvalidArguments {
            name: name.to_string(),
            reason,
        };

        let JsonValue::Object(args) = args else {
            return Err(invalid("arguments must be a JSON object".to_string()));
        };

        let empty = Map::new();
        let properties = tool
            .parameters
            .get("properties")
            .and_then(JsonValue::as_object)
            .unwrap_or(&empty);
        let required: Vec<&str> = tool
            .parameters
            .get("required")
            .and_then(JsonValue::as_array)
            .map(|keys| keys.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default();

        let mut validated = Map::new();
        for (key, schema) in properties {
            match args.get(key) {
                None | Some(JsonValue::Null) => {
                    if required.contains(&key.as_str()) {
                        return Err(invalid(format!("missing required field '{key}'")));
                    }
                }
                Some(value) => {
                    check_property(key, schema, value).map_err(invalid)?;
                    validated.insert(key.clone(), value.clone());
                }
            }
        }

        if name.contains("entity") {
            if let Some(entity_type) = validated.get("entityType").and_then(JsonValue::as_str) {
                entity_type
                    .parse::<EntityType>()
                    .map_err(|e| invalid(e.to_string()))?;
            }
        }

        Ok(JsonValue::Object(validated))
    }
}

fn check_property(key: &str, schema: &JsonValue, value: &JsonValue) -> Result<(), String> {
    let expected = schema.get("type").and_then(JsonValue::as_str);
    let ok = match expected {
        Some("string") => {
            let allowed = schema.get("enum").and_then(JsonValue::as_array);
            match (value.as_str(), allowed) {
                (Some(s), Some(allowed)) if !allowed.iter().any(|v| v.as_str() == Some(s)) => {
                    return Err(format!(
                        "field '{key}' must be one of {}",
                        JsonValue::Array(allowed.clone())
                    ));
                }
                (Some(_), _) => true,
                (None, _) => false,
            }
        }
        Some("integer") => value.as_f64().is_some_and(|n| n.fract() == 0.0),
        Some("number") => value.is_number(),
        Some("boolean") => value.is_boolean(),
        Some("object") => value.is_object(),
        Some("array") => value.is_array(),
        _ => true,
    };

    if ok {
        Ok(())
    } else {
        Err(format!(
            "field '{key}' must be of type {}",
            expected.unwrap_or("any")
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    pub(crate) const CATALOG: &str = r#"{
        "tools": [
            {
                "name": "fetch_emails",
                "description": "Fetch recent emails from the user's mailbox",
                "parameters": {"type": "object", "properties": {"limit": {"type": "integer"}}},
                "provider": "google-mail"
            },
            {
                "name": "send_email",
                "description": "Send an email",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "to": {"type": "string"},
                        "subject": {"type": "string"},
                        "body": {"type": "string"},
                        "user_query": {"type": "string"},
                        "headers": {"type": "object"}
                    },
                    "required": ["to", "subject"]
                },
                "provider": "google-mail"
            },
            {
                "name": "fetch_entity",
                "description": "Fetch CRM records",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "entityType": {"type": "string", "enum": ["Account", "Contact", "Deal", "Article", "Case", "Lead", "Opportunity"]}
                    },
                    "required": ["entityType"]
                },
                "provider": "salesforce"
            },
            {
                "name": "update_entity",
                "description": "Update a CRM record",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "entityType": {"type": "string"},
                        "identifier": {"type": "string"},
                        "fields": {"type": "object"}
                    },
                    "required": ["entityType", "identifier", "fields"]
                },
                "provider": "salesforce"
            },
            {
                "name": "create_entity",
                "description": "Create a CRM record",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "entityType": {"type": "string"},
                        "fields": {"type": "object"}
                    },
                    "required": ["entityType", "fields"]
                },
                "provider": "salesforce"
            }
        ],
        "providers": {
            "salesforce": {
                "provider_config_key": "salesforce-2",
                "connection_id": "sf-default",
                "objects": ["Account", "Contact", "Lead"]
            },
            "google-mail": {"provider_config_key": "google-mail"}
        }
    }"#;

    pub(crate) fn catalog() -> ToolCatalog {
        ToolCatalog::from_json(CATALOG).expect("catalog")
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = ToolCatalog::load(file.path()).expect("load");

        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.tool_declarations()[0].name, "fetch_emails");
        assert_eq!(catalog.provider_config_key("salesforce"), Some("salesforce-2"));
        assert_eq!(catalog.connection_id("salesforce"), Some("sf-default"));
        assert_eq!(catalog.connection_id("google-mail"), None);
        assert_eq!(catalog.provider_objects("salesforce"), ["Account", "Contact", "Lead"]);
        assert!(catalog.provider_objects("hubspot").is_empty());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ToolCatalog::load(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn duplicate_tools_are_rejected() {
        let text = r#"{"tools": [
            {"name": "a", "description": "", "parameters": {}},
            {"name": "a", "description": "", "parameters": {}}
        ]}"#;
        assert_eq!(
            ToolCatalog::from_json(text).unwrap_err(),
            CatalogError::DuplicateTool {
                name: "a".to_string()
            }
        );
    }

    #[test]
    fn unknown_tool() {
        assert_eq!(
            catalog().validate_args("delete_everything", &json!({})),
            Err(ToolError::UnknownTool {
                name: "delete_everything".to_string()
            })
        );
    }

    #[test]
    fn required_fields_enforced_and_extras_dropped() {
        let catalog = catalog();

        let err = catalog
            .validate_args("send_email", &json!({"to": "a@example.com"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref reason, .. } if reason.contains("subject")));

        let validated = catalog
            .validate_args(
                "send_email",
                &json!({"to": "a@example.com", "subject": "Hi", "cc": "x", "body": null}),
            )
            .unwrap();
        assert_eq!(validated, json!({"to": "a@example.com", "subject": "Hi"}));
    }

    #[test]
    fn property_types_checked() {
        let catalog = catalog();

        assert!(catalog.validate_args("fetch_emails", &json!({"limit": 5})).is_ok());
        assert!(catalog.validate_args("fetch_emails", &json!({"limit": 2.5})).is_err());
        assert!(
            catalog
                .validate_args(
                    "update_entity",
                    &json!({"entityType": "Lead", "identifier": "x", "fields": "nope"})
                )
                .is_err()
        );
        assert!(catalog.validate_args("fetch_emails", &json!([1])).is_err());
    }

    #[test]
    fn enum_and_entity_kind_checked() {
        let catalog = catalog();

        let err = catalog
            .validate_args("fetch_entity", &json!({"entityType": "Invoice"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref reason, .. } if reason.contains("one of")));

        // Allowed by the schema enum but not a known record kind.
        let err = catalog
            .validate_args("fetch_entity", &json!({"entityType": "Opportunity"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref reason, .. } if reason.contains("invalid entity type")));

        assert!(catalog.validate_args("fetch_entity", &json!({"entityType": "Lead"})).is_ok());
    }
}
