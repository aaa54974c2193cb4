//! Key material wrapper.
//!
//! Keeps raw key bytes out of logs and debug output.

use std::fmt;

use crate::{Result, SessionError};

/// Length of an AES-256 key in bytes.
pub const KEY_LENGTH: usize = 32;

/// A 256-bit symmetric encryption key.
///
/// `EncryptionKey` implements `Debug` to show `[REDACTED]` instead of the key
/// bytes, so a key can sit inside structs that get logged.
///
/// # Example
///
/// ```rust
/// use sealed_session::EncryptionKey;
///
/// let key = EncryptionKey::new([7u8; 32]);
/// assert_eq!(format!("{key:?}"), "EncryptionKey([REDACTED])");
/// assert_eq!(key.expose_secret()[0], 7);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LENGTH]);

impl EncryptionKey {
    #[must_use]
    pub fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Generates a key from the operating system's secure RNG.
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parses a hex-encoded key, as stored in key files.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::KeyProvider` if the text is not hex or does not
    /// decode to exactly 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let decoded = hex::decode(encoded.trim())
            .map_err(|e| SessionError::KeyProvider(format!("Malformed key file: {e}")))?;
        let bytes: [u8; KEY_LENGTH] = decoded.try_into().map_err(|v: Vec<u8>| {
            SessionError::KeyProvider(format!(
                "Key must be {KEY_LENGTH} bytes, found {}",
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Exposes the raw key bytes.
    ///
    /// Use this only when handing the key to a cipher.
    #[must_use]
    pub fn expose_secret(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

impl From<[u8; KEY_LENGTH]> for EncryptionKey {
    fn from(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}
