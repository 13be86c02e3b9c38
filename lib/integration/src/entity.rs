//! CRM record kinds and field validation.
//!
//! Create and update payloads are checked against a small per-kind field
//! table before any action reaches the CRM. Fields outside the table are
//! passed through untouched.

use crate::error::EntityValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://\S+$").expect("valid regex"));

/// Record kinds known to the CRM tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Account,
    Contact,
    Deal,
    Article,
    Case,
    Lead,
}

impl EntityType {
    /// All known kinds.
    pub const ALL: [Self; 6] = [
        Self::Account,
        Self::Contact,
        Self::Deal,
        Self::Article,
        Self::Case,
        Self::Lead,
    ];

    /// Returns the kind's name as used in tool arguments.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "Account",
            Self::Contact => "Contact",
            Self::Deal => "Deal",
            Self::Article => "Article",
            Self::Case => "Case",
            Self::Lead => "Lead",
        }
    }

    /// The field that must equal the identifier of an update.
    #[must_use]
    pub fn identifier_field(self) -> &'static str {
        match self {
            Self::Account | Self::Deal => "name",
            Self::Contact | Self::Lead => "Email",
            Self::Article => "Title",
            Self::Case => "CaseNumber",
        }
    }

    fn fields(self) -> &'static [FieldRule] {
        match self {
            Self::Account => ACCOUNT_FIELDS,
            Self::Contact => CONTACT_FIELDS,
            Self::Deal => DEAL_FIELDS,
            Self::Article => ARTICLE_FIELDS,
            Self::Case => CASE_FIELDS,
            Self::Lead => LEAD_FIELDS,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = EntityValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EntityValidationError::UnknownEntityType {
                entity_type: s.to_string(),
            })
    }
}

/// Which write is being validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityWrite<'a> {
    Create,
    /// Update of the record named by the identifier.
    Update { identifier: &'a str },
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Text,
    Email,
    Url,
    /// Positive integer.
    Integer,
    /// Positive number.
    Number,
}

#[derive(Debug, Clone, Copy)]
struct FieldRule {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

impl FieldRule {
    const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    fn check(&self, value: &JsonValue) -> Result<(), String> {
        match self.kind {
            FieldKind::Text => value
                .as_str()
                .map(|_| ())
                .ok_or_else(|| "expected a string".to_string()),
            FieldKind::Email => match value.as_str() {
                Some(s) if EMAIL.is_match(s) => Ok(()),
                _ => Err("expected an email address".to_string()),
            },
            FieldKind::Url => match value.as_str() {
                Some(s) if URL.is_match(s) => Ok(()),
                _ => Err("expected a URL".to_string()),
            },
            FieldKind::Integer => match value.as_u64() {
                Some(n) if n > 0 => Ok(()),
                _ => Err("expected a positive integer".to_string()),
            },
            FieldKind::Number => match value.as_f64() {
                Some(n) if n > 0.0 => Ok(()),
                _ => Err("expected a positive number".to_string()),
            },
        }
    }
}

const ACCOUNT_FIELDS: &[FieldRule] = &[
    FieldRule::required("name", FieldKind::Text),
    FieldRule::optional("Website", FieldKind::Url),
    FieldRule::optional("Description", FieldKind::Text),
    FieldRule::optional("NumberOfEmployees", FieldKind::Integer),
];

const CONTACT_FIELDS: &[FieldRule] = &[
    FieldRule::required("LastName", FieldKind::Text),
    FieldRule::optional("FirstName", FieldKind::Text),
    FieldRule::optional("Email", FieldKind::Email),
    FieldRule::optional("Phone", FieldKind::Text),
    FieldRule::optional("AccountId", FieldKind::Text),
];

const DEAL_FIELDS: &[FieldRule] = &[
    FieldRule::required("Name", FieldKind::Text),
    FieldRule::optional("Amount", FieldKind::Number),
    FieldRule::required("StageName", FieldKind::Text),
    FieldRule::required("CloseDate", FieldKind::Text),
    FieldRule::optional("AccountId", FieldKind::Text),
];

const ARTICLE_FIELDS: &[FieldRule] = &[
    FieldRule::required("Title", FieldKind::Text),
    FieldRule::required("UrlName", FieldKind::Text),
    FieldRule::optional("Summary", FieldKind::Text),
];

const CASE_FIELDS: &[FieldRule] = &[
    FieldRule::required("Subject", FieldKind::Text),
    FieldRule::required("Status", FieldKind::Text),
    FieldRule::optional("Priority", FieldKind::Text),
    FieldRule::optional("Description", FieldKind::Text),
    FieldRule::optional("AccountId", FieldKind::Text),
    FieldRule::optional("ContactId", FieldKind::Text),
];

const LEAD_FIELDS: &[FieldRule] = &[
    FieldRule::required("LastName", FieldKind::Text),
    FieldRule::required("Company", FieldKind::Text),
    FieldRule::optional("FirstName", FieldKind::Text),
    FieldRule::optional("Email", FieldKind::Email),
    FieldRule::optional("Status", FieldKind::Text),
    FieldRule::optional("Phone", FieldKind::Text),
];

/// Validates the fields of a create or update.
///
/// Both creates and updates must carry every required field of the kind;
/// an update's identifying field must also equal the identifier.
///
/// # Errors
///
/// Returns the first violation found.
pub fn validate_entity_fields(
    entity_type: EntityType,
    fields: &JsonValue,
    write: &EntityWrite<'_>,
) -> Result<Map<String, JsonValue>, EntityValidationError> {
    let JsonValue::Object(map) = fields else {
        return Err(EntityValidationError::FieldsNotObject);
    };
    debug!(%entity_type, ?write, fields = map.len(), "validating entity fields");

    for rule in entity_type.fields() {
        match map.get(rule.name) {
            None | Some(JsonValue::Null) => {
                if rule.required {
                    return Err(EntityValidationError::MissingField {
                        entity_type: entity_type.to_string(),
                        field: rule.name.to_string(),
                    });
                }
            }
            Some(value) => {
                rule.check(value)
                    .map_err(|reason| EntityValidationError::InvalidField {
                        entity_type: entity_type.to_string(),
                        field: rule.name.to_string(),
                        reason,
                    })?;
            }
        }
    }

    if let EntityWrite::Update { identifier } = write {
        let field = entity_type.identifier_field();
        if map.get(field).and_then(JsonValue::as_str) != Some(*identifier) {
            return Err(EntityValidationError::IdentifierMismatch {
                entity_type: entity_type.to_string(),
                field: field.to_string(),
            });
        }
    }

    Ok(map.clone())
}
