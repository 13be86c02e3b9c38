//! Context budget accounting and history compaction.
//!
//! Size is estimated as roughly one token per four characters of turn text
//! and serialized tool invocations. Once a history goes over budget it is
//! summarized into its system turn; if that fails, it is cut down to the
//! system turn and the latest few turns instead.

use crate::error::SummarizationError;
use crate::turn::{History, Turn};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use switchboard_ai::{LlmBackend, LlmMessage, LlmRequest};
use tracing::{info, instrument, warn};

/// Default context budget, in estimated tokens.
pub const DEFAULT_CONTEXT_LIMIT: usize = 4096;

/// Turns kept after the system turn when summarization fails.
pub const FALLBACK_WINDOW: usize = 3;

const CHARS_PER_TOKEN: usize = 4;

/// Produces a short text summary of conversation turns.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarizes the given turns.
    async fn summarize(&self, turns: &[Turn]) -> Result<String, SummarizationError>;
}

/// What [`ContextBudget::enforce`] did to a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compaction {
    /// The history was within budget.
    Unchanged,
    /// The history was replaced by a summary.
    Summarized,
    /// Summarization failed; only the latest turns were kept.
    Truncated,
}

/// Budget on the estimated size of a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    limit: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LIMIT)
    }
}

impl ContextBudget {
    /// Creates a budget of `limit` estimated tokens.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Returns the limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Estimates the size of a history.
    #[must_use]
    pub fn estimate(&self, history: &History) -> usize {
        history.turns().iter().map(estimate_turn).sum()
    }

    /// Returns true if the history is over budget.
    #[must_use]
    pub fn exceeds(&self, history: &History) -> bool {
        self.estimate(history) > self.limit
    }

    /// Compacts the history if it is over budget.
    ///
    /// Summarization failures, timeouts included, are absorbed by falling
    /// back to [`History::retain_recent`].
    #[instrument(skip_all, fields(limit = self.limit))]
    pub async fn enforce(
        &self,
        history: &mut History,
        summarizer: &dyn Summarizer,
        deadline: Duration,
    ) -> Compaction {
        let estimate = self.estimate(history);
        if estimate <= self.limit {
            return Compaction::Unchanged;
        }
        info!(estimate, "context limit exceeded, summarizing conversation");

        let summary = tokio::time::timeout(deadline, summarizer.summarize(history.conversation()))
            .await
            .unwrap_or(Err(SummarizationError::Timeout));

        match summary {
            Ok(summary) => {
                history.replace_with_summary(&summary);
                Compaction::Summarized
            }
            Err(e) => {
                warn!(error = %e, "summarization failed, keeping latest turns");
                history.retain_recent(FALLBACK_WINDOW);
                Compaction::Truncated
            }
        }
    }
}

fn estimate_turn(turn: &Turn) -> usize {
    let tool_calls_len = match turn {
        Turn::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
            serde_json::to_string(tool_calls).map_or(0, |s| s.len())
        }
        _ => 0,
    };
    (turn.content().len() + tool_calls_len).div_ceil(CHARS_PER_TOKEN)
}

/// Summarizer backed by a completion backend.
#[derive(Clone)]
pub struct LlmSummarizer {
    backend: Arc<dyn LlmBackend>,
}

impl LlmSummarizer {
    /// Creates a summarizer.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, turns: &[Turn]) -> Result<String, SummarizationError> {
        let transcript = turns
            .iter()
            .filter(|turn| !matches!(turn, Turn::System { .. }))
            .map(|turn| {
                let speaker = if matches!(turn, Turn::User { .. }) {
                    "User"
                } else {
                    "Assistant"
                };
                format!("{speaker}: {}", turn.content())
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You are an AI assistant. Please summarize the following conversation succinctly:\n\n{transcript}"
        );

        let request = LlmRequest::new(vec![
            LlmMessage::system("You are a helpful assistant that summarizes conversations."),
            LlmMessage::user(prompt),
        ])
        .with_temperature(0.5)
        .with_max_tokens(150);

        let response = self
            .backend
            .generate(&request)
            .await
            .map_err(SummarizationError::Backend)?;
        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(SummarizationError::EmptySummary);
        }
        info!(summary_len = summary.len(), "conversation summarized");
        Ok(summary.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use switchboard_ai::{LlmError, LlmResponse, ToolCall};

    struct FixedSummarizer(Result<String, SummarizationError>);

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _turns: &[Turn]) -> Result<String, SummarizationError> {
            self.0.clone()
        }
    }

    struct StalledSummarizer;

    #[async_trait]
    impl Summarizer for StalledSummarizer {
        async fn summarize(&self, _turns: &[Turn]) -> Result<String, SummarizationError> {
            std::future::pending().await
        }
    }

    fn long_history(turns: usize) -> History {
        let mut history = History::new("You are helpful.");
        for i in 0..turns {
            history.push_user(format!("question {i} {}", "x".repeat(400))).unwrap();
            history
                .push_assistant(format!("answer {i} {}", "y".repeat(400)), Vec::new())
                .unwrap();
        }
        history
    }

    #[test]
    fn estimate_grows_with_content() {
        let budget = ContextBudget::default();
        let mut history = History::new("sys");
        let mut previous = budget.estimate(&history);

        for text in ["a", "hello there", "a much longer message than before"] {
            history.push_user(text).unwrap();
            history.push_assistant(text, Vec::new()).unwrap();
            let current = budget.estimate(&history);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn estimate_counts_tool_calls() {
        let budget = ContextBudget::default();
        let mut plain = History::new("sys");
        plain.push_user("q").unwrap();
        plain.push_assistant("", Vec::new()).unwrap();

        let mut with_call = History::new("sys");
        with_call.push_user("q").unwrap();
        with_call
            .push_assistant("", vec![ToolCall::new("call_1", "fetch_emails", "{}")])
            .unwrap();

        assert!(budget.estimate(&with_call) > budget.estimate(&plain));
    }

    #[test]
    fn estimate_rounds_up_per_turn() {
        let budget = ContextBudget::new(10);
        let history = History::new("abcde");
        assert_eq!(budget.estimate(&history), 2);
    }

    #[tokio::test]
    async fn within_budget_is_untouched() {
        let budget = ContextBudget::default();
        let mut history = long_history(1);
        let before = history.clone();

        let outcome = budget
            .enforce(&mut history, &FixedSummarizer(Ok("s".into())), Duration::from_secs(1))
            .await;

        assert_eq!(outcome, Compaction::Unchanged);
        assert_eq!(history, before);
    }

    #[tokio::test]
    async fn over_budget_collapses_to_summary() {
        let budget = ContextBudget::new(100);
        let mut history = long_history(3);
        assert!(budget.exceeds(&history));

        let outcome = budget
            .enforce(
                &mut history,
                &FixedSummarizer(Ok("They asked three questions.".into())),
                Duration::from_secs(1),
            )
            .await;

        assert_eq!(outcome, Compaction::Summarized);
        assert_eq!(history.len(), 1);
        assert!(matches!(history.turns()[0], Turn::System { .. }));
        assert!(history.system_prompt().starts_with("Previous conversation summary:"));
        assert!(history.system_prompt().ends_with("You are helpful."));
    }

    #[tokio::test]
    async fn failed_summary_keeps_latest_turns() {
        let budget = ContextBudget::new(100);
        let mut history = long_history(3);
        let expected_tail = history.turns()[4..].to_vec();

        let outcome = budget
            .enforce(
                &mut history,
                &FixedSummarizer(Err(SummarizationError::EmptySummary)),
                Duration::from_secs(1),
            )
            .await;

        assert_eq!(outcome, Compaction::Truncated);
        assert_eq!(history.len(), 4);
        assert_eq!(history.system_prompt(), "You are helpful.");
        assert_eq!(&history.turns()[1..], expected_tail.as_slice());
    }

    #[tokio::test]
    async fn stalled_summary_times_out_into_fallback() {
        let budget = ContextBudget::new(100);
        let mut history = long_history(3);

        let outcome = budget
            .enforce(&mut history, &StalledSummarizer, Duration::from_millis(20))
            .await;

        assert_eq!(outcome, Compaction::Truncated);
    }

    #[tokio::test]
    async fn llm_summarizer_builds_transcript() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(LlmResponse::text(
            "  User greeted.  ",
        ))]));
        let summarizer = LlmSummarizer::new(backend.clone());

        let summary = summarizer
            .summarize(&[Turn::user("hello"), Turn::assistant("hi there", Vec::new())])
            .await
            .unwrap();

        assert_eq!(summary, "User greeted.");
        let request = backend.requests().remove(0);
        assert_eq!(request.temperature, Some(0.5));
        assert_eq!(request.max_tokens, Some(150));
        match &request.messages[1] {
            LlmMessage::User { content } => {
                assert!(content.ends_with("User: hello\nAssistant: hi there"));
            }
            other => panic!("expected user prompt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn llm_summarizer_reports_backend_failure() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(LlmError::Timeout)]));
        let summarizer = LlmSummarizer::new(backend);

        assert_eq!(
            summarizer.summarize(&[Turn::user("hello")]).await,
            Err(SummarizationError::Backend(LlmError::Timeout))
        );
    }
}
