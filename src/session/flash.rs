//! One-shot flash messages.
//!
//! Flash data lives in its own session, so it has its own identifier, cookie
//! and rotation schedule, independent of the session that wrote it.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Session, SessionContext};
use crate::{Result, SessionConfig};

/// Name of the session that holds flash messages.
pub const FLASH_SESSION_NAME: &str = "session_flash_data";

/// Reads and writes messages that are visible to exactly one read.
///
/// Messages that are never read stay in the flash session until its
/// identifier is revoked.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use sealed_session::backend::MemorySessionBackend;
/// use sealed_session::keys::StaticKeyProvider;
/// use sealed_session::transport::CookieTransport;
/// use sealed_session::{FlashMessenger, SessionContext};
///
/// let ctx = SessionContext::new(
///     Arc::new(MemorySessionBackend::new()),
///     Arc::new(StaticKeyProvider::random()),
///     Arc::new(CookieTransport::new()),
/// );
///
/// let flash = FlashMessenger::new(&ctx);
/// flash.set_flash("notice", "Saved").unwrap();
/// assert_eq!(flash.get_flash::<String>("notice").unwrap().as_deref(), Some("Saved"));
/// assert_eq!(flash.get_flash::<String>("notice").unwrap(), None);
/// ```
pub struct FlashMessenger<'a> {
    ctx: &'a SessionContext,
    config: SessionConfig,
}

impl<'a> FlashMessenger<'a> {
    /// Creates a messenger with default cookie attributes.
    pub fn new(ctx: &'a SessionContext) -> Self {
        Self::with_config(ctx, &SessionConfig::default())
    }

    /// Creates a messenger whose session copies `base`'s cookie attributes
    /// and timeout, under the flash session name.
    pub fn with_config(ctx: &'a SessionContext, base: &SessionConfig) -> Self {
        Self {
            ctx,
            config: base.clone().with_name(FLASH_SESSION_NAME),
        }
    }

    /// Stores `value` under `key` until it is read.
    ///
    /// # Errors
    ///
    /// Fails like [`Session::with_config`] and [`Session::set`].
    pub fn set_flash<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let mut session = self.open()?;
        session.set(key, value)
    }

    /// Returns the message under `key` and removes it.
    ///
    /// The entry is removed even when it cannot be decrypted, since it would
    /// never become readable again.
    ///
    /// # Errors
    ///
    /// Fails like [`Session::with_config`], [`Session::get`] and
    /// [`Session::destroy`].
    pub fn get_flash<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut session = self.open()?;
        if !session.contains(key) {
            return Ok(None);
        }
        let value = session.get(key);
        session.destroy(key)?;
        value
    }

    fn open(&self) -> Result<Session<'a>> {
        Session::with_config(self.ctx, self.config.clone())
    }
}
