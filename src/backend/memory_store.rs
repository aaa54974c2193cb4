//! In-memory session storage.
//!
//! Suitable for development, testing, and single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{SessionBackend, SessionRecord};
use crate::{Result, SessionError};

/// In-memory session storage.
///
/// Stores records in a `HashMap` protected by a `RwLock`, keyed by session
/// ID. Clones share the same storage.
///
/// # Note
///
/// Sessions are lost when the process restarts.
/// For persistent storage, use [`FileSessionBackend`](super::FileSessionBackend).
#[derive(Clone, Default)]
pub struct MemorySessionBackend {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sessions currently stored.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns true if there are no sessions stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> SessionError {
    SessionError::Backend("Lock poisoned".to_owned())
}

impl SessionBackend for MemorySessionBackend {
    fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(session_id).cloned())
    }

    fn persist(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .map_err(poisoned)?
            .insert(session_id.to_owned(), record.clone());
        Ok(())
    }

    fn destroy(&self, session_id: &str) -> Result<()> {
        self.sessions.write().map_err(poisoned)?.remove(session_id);
        Ok(())
    }
}
