use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{EncryptionKey, Result, SessionError};

/// Length of generated session identifiers in characters.
pub const SESSION_ID_LENGTH: usize = 32;

/// Length of the AES-GCM nonce prepended to every ciphertext.
pub const NONCE_LENGTH: usize = 12;

/// Generates a cryptographically secure random token.
///
/// The token consists of alphanumeric characters (a-z, A-Z, 0-9),
/// providing approximately 5.95 bits of entropy per character.
///
/// # Example
///
/// ```rust
/// use sealed_session::crypto::generate_token;
///
/// let token = generate_token(32);
/// assert_eq!(token.len(), 32);
/// ```
pub fn generate_token(length: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(rng.sample(rand::distributions::Alphanumeric)))
        .collect()
}

/// Generates a fresh session identifier.
pub fn generate_session_id() -> String {
    generate_token(SESSION_ID_LENGTH)
}

/// Returns true if `id` could have come from [`generate_session_id`].
///
/// Identifiers reach file names and cookie values, so anything outside
/// ASCII alphanumerics is refused.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 128 && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Serializes `value` to JSON and seals it under `key`.
///
/// The blob is `base64(nonce || ciphertext)` with a random nonce per call,
/// so encrypting the same value twice yields different blobs.
///
/// # Errors
///
/// Returns `SessionError::Serialization` if the value cannot be serialized,
/// or `SessionError::EncryptionFailure` if the cipher rejects it.
pub fn encrypt<T: Serialize + ?Sized>(value: &T, key: &EncryptionKey) -> Result<String> {
    let plaintext =
        serde_json::to_vec(value).map_err(|e| SessionError::Serialization(e.to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(key.expose_secret())
        .map_err(|e| SessionError::EncryptionFailure(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|e| SessionError::EncryptionFailure(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(sealed))
}

/// Opens a blob produced by [`encrypt`] and deserializes the value.
///
/// # Errors
///
/// Returns `SessionError::DecryptionFailure` for a malformed blob, a blob
/// sealed under another key, or a tampered ciphertext. Returns
/// `SessionError::Serialization` if the plaintext is not a `T`.
pub fn decrypt<T: DeserializeOwned>(blob: &str, key: &EncryptionKey) -> Result<T> {
    let sealed = BASE64
        .decode(blob)
        .map_err(|e| SessionError::DecryptionFailure(format!("Invalid encoding: {e}")))?;

    if sealed.len() < NONCE_LENGTH {
        return Err(SessionError::DecryptionFailure(
            "Invalid encrypted data: too short".to_owned(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key.expose_secret())
        .map_err(|e| SessionError::DecryptionFailure(e.to_string()))?;

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            SessionError::DecryptionFailure("Ciphertext rejected by key".to_owned())
        })?;

    serde_json::from_slice(&plaintext).map_err(|e| SessionError::Serialization(e.to_string()))
}
