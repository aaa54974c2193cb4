//! File-based session storage.
//!
//! Stores sessions as JSON files in a directory.

use std::fs;
use std::path::PathBuf;

use super::{SessionBackend, SessionRecord};
use crate::crypto::is_valid_session_id;
use crate::{Result, SessionError};

/// File-based session storage.
///
/// Each session is stored as a JSON file named `{session_id}.json`
/// in the configured directory. Identifiers that are not plain ASCII
/// alphanumerics never touch the filesystem.
///
/// # Example
///
/// ```rust,ignore
/// use sealed_session::backend::FileSessionBackend;
///
/// let backend = FileSessionBackend::new("/var/lib/myapp/sessions")?;
/// ```
pub struct FileSessionBackend {
    directory: PathBuf,
}

impl FileSessionBackend {
    /// Creates a new file session backend.
    ///
    /// Creates the directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let dir = directory.into();
        fs::create_dir_all(&dir).map_err(|e| {
            SessionError::Backend(format!("Failed to create session directory: {e}"))
        })?;
        Ok(Self { directory: dir })
    }

    /// Returns the path for a session file.
    fn session_path(&self, session_id: &str) -> PathBuf {
        self.directory.join(format!("{session_id}.json"))
    }
}

fn backend_error(operation: &str, e: impl std::fmt::Display) -> SessionError {
    log::error!(target: "sealed_session::backend", "msg=\"session storage error\" operation=\"{operation}\" error=\"{e}\"");
    SessionError::Backend(format!("Failed to {operation}: {e}"))
}

impl SessionBackend for FileSessionBackend {
    fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        if !is_valid_session_id(session_id) {
            return Ok(None);
        }

        let path = self.session_path(session_id);

        if !path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(&path).map_err(|e| backend_error("read session file", e))?;

        let record: SessionRecord =
            serde_json::from_str(&content).map_err(|e| backend_error("parse session file", e))?;

        Ok(Some(record))
    }

    fn persist(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        if !is_valid_session_id(session_id) {
            return Err(SessionError::Backend(
                "Refusing to persist invalid session id".to_owned(),
            ));
        }

        let content =
            serde_json::to_string_pretty(record).map_err(|e| backend_error("serialize session", e))?;

        // Write then rename so readers never observe a half-written file.
        let path = self.session_path(session_id);
        let staging = self.directory.join(format!(".{session_id}.json.tmp"));
        fs::write(&staging, content).map_err(|e| backend_error("write session file", e))?;
        fs::rename(&staging, &path).map_err(|e| backend_error("replace session file", e))?;

        Ok(())
    }

    fn destroy(&self, session_id: &str) -> Result<()> {
        if !is_valid_session_id(session_id) {
            return Ok(());
        }

        let path = self.session_path(session_id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| backend_error("delete session file", e))?;
        }

        Ok(())
    }
}
