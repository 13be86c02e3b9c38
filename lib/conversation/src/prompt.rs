//! Default system instruction for new sessions.

/// Builds the system instruction that seeds every new session.
///
/// `objects` are the CRM record kinds the configured provider exposes.
#[must_use]
pub fn default_system_prompt(objects: &[String]) -> String {
    let objects = objects
        .iter()
        .map(|o| format!("'{o}'"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are an AI assistant that can use various tools to help answer questions and perform tasks.
You can fetch, update, and create Salesforce records for the following objects: {objects}.
You can also fetch emails and send emails from Google Mail.
Use the 'fetch_entity' tool for Salesforce data and the 'fetch_emails' tool for emails, and 'send_email' to send.
Use the 'create_entity' tool and 'update_entity' tool for creating and making changes.
Always use the correct tool and object names when making tool calls.

Important guidelines:
1. The required fields must be included in update requests, even if they aren't changing.
2. Account, Deal, and Article updates require the Name/Title field to match the identifier (use 'name').
3. Contact and Lead updates require the Email field to match the identifier (use 'email').
4. Case updates require the CaseNumber field to match the identifier.

If uncertain about fields, include them to ensure all required data is present.
Always structure tool call responses in a clear, user-friendly format."
    )
}
