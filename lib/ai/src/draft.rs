//! Email body drafting.

use crate::backend::{LlmBackend, LlmMessage, LlmRequest};
use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

const DRAFTING_SYSTEM_PROMPT: &str = "You are an AI assistant tasked with generating email content.";

/// A drafted email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    /// Subject line, carried through unchanged.
    pub subject: String,
    /// Generated body text.
    pub body: String,
}

/// Writes email bodies from a recipient, a subject and a stated purpose.
#[derive(Clone)]
pub struct EmailDrafter {
    backend: Arc<dyn LlmBackend>,
    temperature: f32,
    max_tokens: u32,
}

impl EmailDrafter {
    /// Creates a drafter on top of a completion backend.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            temperature: crate::backend::DEFAULT_TEMPERATURE,
            max_tokens: crate::backend::DEFAULT_MAX_TOKENS,
        }
    }

    /// Drafts a professional email body.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion call fails.
    #[instrument(skip(self, purpose), fields(to = %to))]
    pub async fn draft(&self, to: &str, subject: &str, purpose: &str) -> Result<EmailDraft, LlmError> {
        let prompt = format!(
            "Generate an email with the following details:\n\
             - To: {to}\n\
             - Subject: {subject}\n\
             - Purpose: {purpose}\n\n\
             Please provide the email body in a professional tone."
        );

        let request = LlmRequest::new(vec![
            LlmMessage::system(DRAFTING_SYSTEM_PROMPT),
            LlmMessage::user(prompt),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self.backend.generate(&request).await?;
        let body = response.content.trim().to_string();
        debug!(body_len = body.len(), "email body drafted");

        Ok(EmailDraft {
            subject: subject.to_string(),
            body,
        })
    }
}

impl std::fmt::Debug for EmailDrafter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailDrafter")
            .field("model", &self.backend.model())
            .finish_non_exhaustive()
    }
}
