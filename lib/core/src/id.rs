//! Strongly-typed ULID identifiers.
//!
//! Sessions are keyed by caller-supplied opaque strings and do not appear
//! here; these ids are minted by switchboard itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a freshly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ulid::from_str(raw).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }
    };
}

define_id!(
    /// Identifier of one audited tool dispatch.
    ToolCallRecordId,
    "tcr"
);

define_id!(
    /// Identifier assigned to a tool invocation the model left unnamed.
    ToolCallId,
    "call"
);

define_id!(
    /// Identifier of an outbound message produced by a transport adapter.
    MessageId,
    "msg"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_display_format() {
        let id = ToolCallRecordId::new();
        assert!(id.to_string().starts_with("tcr_"));
    }

    #[test]
    fn parse_with_and_without_prefix() {
        let id = MessageId::new();
        let parsed: MessageId = id.to_string().parse().expect("prefixed");
        assert_eq!(id, parsed);

        let bare: MessageId = id.as_ulid().to_string().parse().expect("bare");
        assert_eq!(id, bare);
    }

    #[test]
    fn parse_invalid_ulid() {
        let err = "tcr_nope".parse::<ToolCallRecordId>().unwrap_err();
        assert_eq!(err.id_type, "ToolCallRecordId");
    }

    #[test]
    fn ids_sort_by_creation() {
        let first = ToolCallRecordId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ToolCallRecordId::new();
        assert!(first < second);
    }

    #[test]
    fn id_serializes_transparently() {
        let id = ToolCallRecordId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
    }
}
