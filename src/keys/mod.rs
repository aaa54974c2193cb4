//! Encryption key providers.

mod file;

pub use file::FileKeyProvider;

use crate::{EncryptionKey, Result};

/// Supplies the symmetric key that seals session values.
///
/// Implementations:
/// - [`FileKeyProvider`]: one key per calendar day, persisted in a directory
/// - [`StaticKeyProvider`]: a fixed key, for tests or externally managed keys
pub trait KeyProvider: Send + Sync {
    /// Returns the key currently in force.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::KeyProvider` if the key cannot be produced.
    /// Callers cannot recover from this: no value can be sealed or opened.
    fn get_key(&self) -> Result<EncryptionKey>;
}

/// A provider that always hands out the same key.
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    key: EncryptionKey,
}

impl StaticKeyProvider {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Creates a provider around a freshly generated key.
    pub fn random() -> Self {
        Self::new(EncryptionKey::generate())
    }
}

impl KeyProvider for StaticKeyProvider {
    fn get_key(&self) -> Result<EncryptionKey> {
        Ok(self.key.clone())
    }
}
