//! File-based daily encryption keys.
//!
//! Stores one hex-encoded key per day as `session_key_{YYYYMMDD}.key`
//! in the configured directory.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use fs2::FileExt;

use super::KeyProvider;
use crate::clock::{Clock, SystemClock};
use crate::{EncryptionKey, Result, SessionError};

const KEY_FILE_PREFIX: &str = "session_key_";
const KEY_FILE_EXTENSION: &str = "key";
const LOCK_FILE_NAME: &str = ".session_key.lock";

/// Daily rotating key provider.
///
/// The first caller on a new day generates the key under an exclusive
/// advisory lock and deletes the key files of every other day. Other
/// processes that lose the race read the file the winner wrote. The key is
/// cached in memory until the date changes.
///
/// Keys from previous days are gone once a new key exists, so values sealed
/// before the boundary no longer decrypt.
///
/// # Example
///
/// ```rust,ignore
/// use sealed_session::FileKeyProvider;
///
/// let keys = FileKeyProvider::new("/var/lib/myapp/keys")?;
/// ```
pub struct FileKeyProvider {
    directory: PathBuf,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<(NaiveDate, EncryptionKey)>>,
}

impl FileKeyProvider {
    /// Creates a provider that follows the system clock.
    ///
    /// Creates the directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::KeyProvider` if the directory cannot be created.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        Self::with_clock(directory, Arc::new(SystemClock))
    }

    /// Creates a provider whose notion of "today" comes from `clock`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::KeyProvider` if the directory cannot be created.
    pub fn with_clock(directory: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = directory.into();
        fs::create_dir_all(&dir).map_err(|e| {
            SessionError::KeyProvider(format!("Failed to create key directory: {e}"))
        })?;
        Ok(Self {
            directory: dir,
            clock,
            cached: RwLock::new(None),
        })
    }

    fn key_file_name(date: NaiveDate) -> String {
        format!(
            "{KEY_FILE_PREFIX}{}.{KEY_FILE_EXTENSION}",
            date.format("%Y%m%d")
        )
    }

    /// Returns the path of the key file for `date`.
    pub fn key_path(&self, date: NaiveDate) -> PathBuf {
        self.directory.join(Self::key_file_name(date))
    }

    /// Reads a populated key file. Missing and empty files yield `None`.
    fn read_key(&self, date: NaiveDate) -> Result<Option<EncryptionKey>> {
        let path = self.key_path(date);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| SessionError::KeyProvider(format!("Failed to read key file: {e}")))?;

        if content.trim().is_empty() {
            return Ok(None);
        }

        EncryptionKey::from_hex(&content).map(Some)
    }

    fn generate_key(&self, date: NaiveDate) -> Result<EncryptionKey> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.directory.join(LOCK_FILE_NAME))
            .map_err(|e| key_io_error("open key lock", &e))?;

        FileExt::lock_exclusive(&lock).map_err(|e| key_io_error("lock key directory", &e))?;

        let result = self.generate_locked(date);

        if let Err(e) = FileExt::unlock(&lock) {
            log::warn!(target: "sealed_session::keys", "msg=\"failed to release key lock\" error=\"{e}\"");
        }

        result
    }

    fn generate_locked(&self, date: NaiveDate) -> Result<EncryptionKey> {
        // Another process may have won the race while we waited for the lock.
        if let Some(key) = self.read_key(date)? {
            return Ok(key);
        }

        self.remove_stale_keys(date)?;

        let key = EncryptionKey::generate();
        let path = self.key_path(date);

        // Readers skip the lock, so the key file must appear complete or not at all.
        let staging = self
            .directory
            .join(format!(".{}.tmp", Self::key_file_name(date)));
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)
            .map_err(|e| key_io_error("create key file", &e))?;
        file.write_all(key.to_hex().as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| key_io_error("write key file", &e))?;
        drop(file);
        fs::rename(&staging, &path).map_err(|e| key_io_error("install key file", &e))?;

        log::info!(target: "sealed_session::keys", "msg=\"encryption key generated\" date=\"{}\"", date.format("%Y%m%d"));

        Ok(key)
    }

    fn remove_stale_keys(&self, today: NaiveDate) -> Result<()> {
        let current = Self::key_file_name(today);
        let entries =
            fs::read_dir(&self.directory).map_err(|e| key_io_error("read key directory", &e))?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            let is_key_file = name.starts_with(KEY_FILE_PREFIX)
                && name.ends_with(&format!(".{KEY_FILE_EXTENSION}"));

            if is_key_file && name != current {
                fs::remove_file(entry.path()).map_err(|e| key_io_error("delete stale key", &e))?;
                log::info!(target: "sealed_session::keys", "msg=\"stale encryption key deleted\" file=\"{name}\"");
            }
        }

        Ok(())
    }
}

impl KeyProvider for FileKeyProvider {
    fn get_key(&self) -> Result<EncryptionKey> {
        let today = self.clock.now().date_naive();

        if let Ok(cached) = self.cached.read() {
            if let Some((date, key)) = cached.as_ref() {
                if *date == today {
                    return Ok(key.clone());
                }
            }
        }

        let key = match self.read_key(today)? {
            Some(key) => key,
            None => self.generate_key(today)?,
        };

        if let Ok(mut cached) = self.cached.write() {
            *cached = Some((today, key.clone()));
        }

        Ok(key)
    }
}

fn key_io_error(operation: &str, e: &std::io::Error) -> SessionError {
    log::error!(target: "sealed_session::keys", "msg=\"key storage error\" operation=\"{operation}\" error=\"{e}\"");
    SessionError::KeyProvider(format!("Failed to {operation}: {e}"))
}
