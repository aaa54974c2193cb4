//! Backend session storage.

mod file_store;
mod memory_store;

pub use file_store::FileSessionBackend;
use indexmap::IndexMap;
pub use memory_store::MemorySessionBackend;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::crypto::generate_session_id;

/// The backend-resident data of one session.
///
/// `entries` maps keys to sealed blobs in insertion order. The last rotation
/// time is the only plaintext value and sits beside the entries; it
/// serializes as the reserved `last_access_time` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access_time: Option<i64>,

    #[serde(flatten)]
    pub entries: IndexMap<String, String>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record whose identifier was issued at `now`.
    pub fn started_at(now: i64) -> Self {
        Self {
            last_access_time: Some(now),
            entries: IndexMap::new(),
        }
    }

    /// Returns true if the record holds no entries and no timestamp.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.last_access_time.is_none()
    }
}

/// Storage for session records keyed by session identifier.
///
/// Implementations:
/// - [`MemorySessionBackend`]: process-resident storage
/// - [`FileSessionBackend`]: one JSON file per session
pub trait SessionBackend: Send + Sync {
    /// Allocates an identifier not currently in use.
    fn create_id(&self) -> Result<String> {
        loop {
            let id = generate_session_id();
            if self.load(&id)?.is_none() {
                return Ok(id);
            }
        }
    }

    /// Loads the record stored under `session_id`, if any.
    fn load(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Stores `record` under `session_id`, replacing any previous record.
    fn persist(&self, session_id: &str, record: &SessionRecord) -> Result<()>;

    /// Frees the storage of `session_id`. Unknown identifiers are ignored.
    fn destroy(&self, session_id: &str) -> Result<()>;
}
