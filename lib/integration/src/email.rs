//! Mailbox result shaping.
//!
//! Raw messages returned by a mailbox action are noisy: tracking links,
//! unsubscribe footers, decorative characters. They are reduced to short
//! plain-text blocks before being handed to the model.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::LazyLock;
use tracing::debug;

const SUBJECT_MAX_CHARS: usize = 100;
const BODY_MAX_CHARS: usize = 300;
const SEPARATOR: &str = "-------------------------------------------";

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(?https?://\S+\)?").expect("valid regex")
});
static FOOTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(unsubscribe|manage preferences|this email was sent by).*$")
        .expect("valid regex")
});
static SPECIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9_\s.,!?;:@-]").expect("valid regex")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// One message as returned by the mailbox action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailRecord {
    pub sender: String,
    pub recipients: String,
    pub date: String,
    pub subject: String,
    pub body: String,
}

/// Cleans and renders messages as text blocks, one per message.
#[must_use]
pub fn clean_and_format_emails(emails: &[EmailRecord]) -> Vec<String> {
    debug!(count = emails.len(), "formatting emails");
    emails
        .iter()
        .map(|email| {
            let subject = clean_text(&email.subject, SUBJECT_MAX_CHARS, false);
            let body = clean_text(&email.body, BODY_MAX_CHARS, true);
            format!(
                "From: {}\nTo: {}\nDate: {}\nSubject: {}\n\n{}\n\n{SEPARATOR}",
                email.sender, email.recipients, email.date, subject, body
            )
            .trim()
            .to_string()
        })
        .collect()
}

/// Wraps a mailbox action response for the model.
///
/// An array of messages becomes `{status, data: {emails, count}}` with each
/// message rendered by [`clean_and_format_emails`]; any other payload is
/// passed through under `data`.
#[must_use]
pub fn format_mailbox_result(payload: JsonValue) -> JsonValue {
    let JsonValue::Array(items) = payload else {
        return json!({ "status": "success", "data": payload });
    };

    let records: Vec<EmailRecord> = items
        .iter()
        .map(|item| serde_json::from_value(item.clone()).unwrap_or_default())
        .collect();
    let emails = clean_and_format_emails(&records);

    json!({
        "status": "success",
        "data": {
            "count": emails.len(),
            "emails": emails,
        }
    })
}

fn clean_text(text: &str, max_chars: usize, is_body: bool) -> String {
    let mut text = URL.replace_all(text, "").into_owned();
    if is_body {
        text = FOOTER.replace(&text, "").into_owned();
    }
    let text = SPECIAL.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = text.trim();

    if text.chars().count() > max_chars {
        let mut truncated: String = text.chars().take(max_chars - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        text.to_string()
    }
}
