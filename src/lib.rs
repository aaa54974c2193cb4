//! Server-side sessions with values encrypted at rest.
//!
//! A [`Session`] keeps per-client key/value data in a [`SessionBackend`],
//! encrypting every value with the daily key supplied by a [`KeyProvider`].
//! Session identifiers travel through a [`SessionTransport`] (usually the
//! cookie adapter in [`transport`]) and are rotated once they outlive the
//! configured timeout. Flash messages live in a second, fixed-name session
//! and disappear after the first read.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use sealed_session::backend::MemorySessionBackend;
//! use sealed_session::keys::StaticKeyProvider;
//! use sealed_session::transport::CookieTransport;
//! use sealed_session::{Session, SessionContext};
//!
//! let ctx = SessionContext::new(
//!     Arc::new(MemorySessionBackend::new()),
//!     Arc::new(StaticKeyProvider::random()),
//!     Arc::new(CookieTransport::new()),
//! );
//!
//! let mut session = Session::open(&ctx, "app", &serde_json::json!({}), false).unwrap();
//! session.set("username", "david").unwrap();
//! assert_eq!(session.get::<String>("username").unwrap().as_deref(), Some("david"));
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod keys;
mod secret;
pub mod session;
#[cfg(feature = "tracing")]
mod tracing_config;
pub mod transport;

use std::fmt;

pub use backend::{SessionBackend, SessionRecord};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{SameSite, SessionConfig};
pub use keys::{FileKeyProvider, KeyProvider, StaticKeyProvider};
pub use secret::EncryptionKey;
pub use session::{
    FLASH_SESSION_NAME, FlashMessenger, IdentityRotator, LAST_ACCESS_TIME, Session, SessionContext,
};
#[cfg(feature = "tracing")]
pub use tracing_config::TracingConfig;
pub use transport::SessionTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A configuration field was present with the wrong type or value.
    InvalidConfiguration { field: String },
    /// The encryption key could not be read or generated.
    KeyProvider(String),
    DecryptionFailure(String),
    EncryptionFailure(String),
    Serialization(String),
    /// The backend session storage failed.
    Backend(String),
    /// The key is reserved for session bookkeeping.
    ReservedKey(String),
}

impl std::error::Error for SessionError {}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidConfiguration { field } => {
                write!(f, "Invalid session configuration: field '{field}'")
            }
            SessionError::KeyProvider(msg) => write!(f, "Encryption key unavailable: {msg}"),
            SessionError::DecryptionFailure(msg) => write!(f, "Failed to decrypt value: {msg}"),
            SessionError::EncryptionFailure(msg) => write!(f, "Failed to encrypt value: {msg}"),
            SessionError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            SessionError::Backend(msg) => write!(f, "Session backend error: {msg}"),
            SessionError::ReservedKey(key) => write!(f, "Key '{key}' is reserved"),
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_field() {
        let err = SessionError::InvalidConfiguration {
            field: "timeout".to_owned(),
        };
        assert_eq!(err.to_string(), "Invalid session configuration: field 'timeout'");
    }

    #[test]
    fn test_display_reserved_key() {
        let err = SessionError::ReservedKey(LAST_ACCESS_TIME.to_owned());
        assert_eq!(err.to_string(), "Key 'last_access_time' is reserved");
    }
}
