//! Conversation turns and histories.
//!
//! A [`History`] is the ordered list of turns of one session. It refuses any
//! mutation that would break its shape: exactly one leading system turn, and
//! every tool turn answering a still-pending invocation.

use crate::error::HistoryError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use switchboard_ai::{LlmMessage, ToolCall};

/// One entry of a conversation, tagged by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Turn {
    /// System instruction.
    System { content: String },
    /// User input.
    User { content: String },
    /// Model output with the invocations it requested.
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Result of one invocation.
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Turn {
    /// Creates a system turn.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Creates a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    /// Creates a tool turn.
    #[must_use]
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// Returns the text content.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    /// Returns the role name.
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Converts the turn to the backend message shape.
    #[must_use]
    pub fn to_message(&self) -> LlmMessage {
        match self {
            Self::System { content } => LlmMessage::System {
                content: content.clone(),
            },
            Self::User { content } => LlmMessage::User {
                content: content.clone(),
            },
            Self::Assistant {
                content,
                tool_calls,
            } => LlmMessage::Assistant {
                content: content.clone(),
                tool_calls: tool_calls.clone(),
            },
            Self::Tool {
                tool_call_id,
                name,
                content,
            } => LlmMessage::Tool {
                tool_call_id: tool_call_id.clone(),
                name: name.clone(),
                content: content.clone(),
            },
        }
    }
}

/// The ordered turns of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    /// Creates a history holding only the system turn.
    #[must_use]
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
        }
    }

    /// Rebuilds a history from turns, checking every invariant.
    ///
    /// # Errors
    ///
    /// Returns an error if the turns do not form a valid history.
    pub fn from_turns(turns: Vec<Turn>) -> Result<Self, HistoryError> {
        let mut iter = turns.into_iter();
        let Some(Turn::System { content }) = iter.next() else {
            return Err(HistoryError::MissingSystemTurn);
        };

        let mut history = Self::new(content);
        for turn in iter {
            history.push(turn)?;
        }
        Ok(history)
    }

    /// Returns the turns, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns the number of turns, the system turn included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: a history holds at least its system turn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the system instruction.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        self.turns.first().map_or("", Turn::content)
    }

    /// Returns the turns after the system turn.
    #[must_use]
    pub fn conversation(&self) -> &[Turn] {
        self.turns.get(1..).unwrap_or_default()
    }

    /// Appends a turn.
    ///
    /// User and assistant turns are refused while invocations are pending;
    /// a tool turn must answer one of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the turn would break the history's shape.
    pub fn push(&mut self, turn: Turn) -> Result<(), HistoryError> {
        match &turn {
            Turn::System { .. } => return Err(HistoryError::MisplacedSystemTurn),
            Turn::User { .. } | Turn::Assistant { .. } => {
                let pending = self.pending_tool_call_ids();
                if !pending.is_empty() {
                    return Err(HistoryError::UnansweredToolCalls { pending });
                }
            }
            Turn::Tool { tool_call_id, .. } => {
                if !self.pending_tool_call_ids().contains(tool_call_id) {
                    return Err(HistoryError::UnknownToolCall {
                        tool_call_id: tool_call_id.clone(),
                    });
                }
            }
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Appends a user turn.
    ///
    /// # Errors
    ///
    /// Returns an error if invocations are still pending.
    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), HistoryError> {
        self.push(Turn::user(content))
    }

    /// Appends an assistant turn.
    ///
    /// # Errors
    ///
    /// Returns an error if invocations are still pending.
    pub fn push_assistant(
        &mut self,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Result<(), HistoryError> {
        self.push(Turn::assistant(content, tool_calls))
    }

    /// Appends the result of a pending invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if no pending invocation has this id.
    pub fn push_tool(
        &mut self,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), HistoryError> {
        self.push(Turn::tool(tool_call_id, name, content))
    }

    /// Ids of every invocation requested so far, answered or not.
    #[must_use]
    pub fn tool_call_ids(&self) -> HashSet<&str> {
        self.turns
            .iter()
            .filter_map(|turn| match turn {
                Turn::Assistant { tool_calls, .. } => Some(tool_calls),
                _ => None,
            })
            .flatten()
            .map(|call| call.id.as_str())
            .collect()
    }

    /// Ids of requested invocations that have no tool turn yet, in request
    /// order.
    #[must_use]
    pub fn pending_tool_call_ids(&self) -> Vec<String> {
        let answered: HashSet<&str> = self
            .turns
            .iter()
            .filter_map(|turn| match turn {
                Turn::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();

        self.turns
            .iter()
            .filter_map(|turn| match turn {
                Turn::Assistant { tool_calls, .. } => Some(tool_calls),
                _ => None,
            })
            .flatten()
            .filter(|call| !answered.contains(call.id.as_str()))
            .map(|call| call.id.clone())
            .collect()
    }

    /// Returns true if any requested invocation is still unanswered.
    #[must_use]
    pub fn has_unanswered(&self) -> bool {
        !self.pending_tool_call_ids().is_empty()
    }

    /// Replaces the whole history with a single system turn carrying the
    /// summary ahead of the original instruction.
    pub fn replace_with_summary(&mut self, summary: &str) {
        let prompt = format!(
            "Previous conversation summary: {summary}\n\n{}",
            self.system_prompt()
        );
        self.turns = vec![Turn::system(prompt)];
    }

    /// Keeps the system turn and at most `count` of the latest turns.
    ///
    /// Tool turns left at the front of the window lose the assistant turn
    /// that requested them and are dropped as well.
    pub fn retain_recent(&mut self, count: usize) {
        let start = self.turns.len().saturating_sub(count).max(1);
        let mut recent: Vec<Turn> = self.turns.drain(start..).collect();
        let orphans = recent
            .iter()
            .take_while(|turn| matches!(turn, Turn::Tool { .. }))
            .count();
        recent.drain(..orphans);
        self.turns.truncate(1);
        self.turns.extend(recent);
    }

    /// Converts the history to backend messages.
    #[must_use]
    pub fn to_messages(&self) -> Vec<LlmMessage> {
        self.turns.iter().map(Turn::to_message).collect()
    }
}
