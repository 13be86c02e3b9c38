//! In-memory conversation store.
//!
//! Holds one [`History`] per session key for the life of the process. Each
//! history sits behind its own async mutex; an orchestration request holds
//! that lock from its first append to its last, so two requests for the same
//! session never interleave turns. Different sessions never contend.
//!
//! Releasing the lock publishes a snapshot of the history. Readers that only
//! want to look at a session see the last published snapshot and never wait
//! on a request in flight.

use crate::error::HistoryError;
use crate::turn::{History, Turn};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};
use tracing::debug;

#[derive(Debug, Clone)]
struct Session {
    history: Arc<Mutex<History>>,
    published: Arc<watch::Sender<History>>,
}

impl Session {
    fn new(history: History) -> Self {
        Self {
            published: Arc::new(watch::Sender::new(history.clone())),
            history: Arc::new(Mutex::new(history)),
        }
    }
}

/// Exclusive access to one session's history.
///
/// Dropping the guard publishes the history for readers.
#[derive(Debug)]
pub struct SessionGuard {
    history: OwnedMutexGuard<History>,
    published: Arc<watch::Sender<History>>,
}

impl Deref for SessionGuard {
    type Target = History;

    fn deref(&self) -> &History {
        &self.history
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut History {
        &mut self.history
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.published.send_replace(History::clone(&self.history));
    }
}

/// Process-wide map of session histories.
#[derive(Debug)]
pub struct ConversationStore {
    sessions: RwLock<HashMap<String, Session>>,
    system_prompt: String,
}

impl ConversationStore {
    /// Creates an empty store whose new sessions are seeded with the given
    /// system instruction.
    #[must_use]
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            system_prompt: system_prompt.into(),
        }
    }

    async fn session(&self, session_id: &str) -> Session {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "initialized new message history");
                Session::new(History::new(self.system_prompt.clone()))
            })
            .clone()
    }

    /// Locks a session's history, creating it if absent.
    ///
    /// Waits while another request holds the same session.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        let session = self.session(session_id).await;
        SessionGuard {
            history: session.history.lock_owned().await,
            published: session.published,
        }
    }

    /// Returns a copy of a session's history, creating it if absent.
    ///
    /// Waits for a request in flight to finish.
    pub async fn get(&self, session_id: &str) -> History {
        self.lock(session_id).await.clone()
    }

    /// Returns the last published history of a session, if the session
    /// exists.
    ///
    /// Never waits on a request in flight; its turns show up once it ends.
    pub async fn find(&self, session_id: &str) -> Option<History> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id)?;
        Some(History::clone(&session.published.borrow()))
    }

    /// Appends one turn to a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the turn would break the history's shape.
    pub async fn append(&self, session_id: &str, turn: Turn) -> Result<(), HistoryError> {
        self.lock(session_id).await.push(turn)
    }

    /// Replaces a session's history wholesale.
    pub async fn replace(&self, session_id: &str, history: History) {
        *self.lock(session_id).await = history;
    }

    /// Returns the number of sessions seen.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns true if no session has been created yet.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
