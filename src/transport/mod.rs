//! Session identifier transport.

mod cookie;

pub use cookie::{CookieTransport, expired_cookie, session_cookie};

use crate::SessionConfig;

/// Carries session identifiers between client and server.
///
/// The request side yields the identifier the client presented for a session
/// name; the response side learns about identifiers that were issued,
/// regenerated, or revoked while handling the request.
pub trait SessionTransport: Send + Sync {
    /// Returns the identifier the client sent for session `name`.
    fn incoming_id(&self, name: &str) -> Option<String>;

    /// Tells the client to use `session_id` for `config.name` from now on.
    fn commit_id(&self, config: &SessionConfig, session_id: &str);

    /// Tells the client to forget its identifier for `config.name`.
    fn expire(&self, config: &SessionConfig);
}
