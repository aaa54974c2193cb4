//! Cookie transport for session identifiers.
//!
//! Reads identifiers from a `Cookie` request header and collects the
//! `Set-Cookie` values the response must carry.

use std::collections::HashMap;
use std::sync::Mutex;

use indexmap::IndexMap;

use super::SessionTransport;
use crate::SessionConfig;
use crate::crypto::is_valid_session_id;

/// Per-request cookie transport.
///
/// # Example
///
/// ```rust
/// use sealed_session::SessionConfig;
/// use sealed_session::SessionTransport;
/// use sealed_session::transport::CookieTransport;
///
/// let transport = CookieTransport::from_cookie_header("simple_session=abc123; theme=dark");
/// assert_eq!(transport.incoming_id("simple_session").as_deref(), Some("abc123"));
///
/// transport.commit_id(&SessionConfig::default(), "def456");
/// assert_eq!(
///     transport.set_cookie_headers(),
///     ["simple_session=def456; Path=/; Max-Age=3600; Secure; HttpOnly; SameSite=Strict"]
/// );
/// ```
#[derive(Debug, Default)]
pub struct CookieTransport {
    incoming: HashMap<String, String>,
    outgoing: Mutex<IndexMap<String, String>>,
}

impl CookieTransport {
    /// Creates a transport for a request that carried no cookies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport from the value of a `Cookie` request header.
    ///
    /// Malformed pairs are skipped. If a name repeats, the first value wins.
    pub fn from_cookie_header(header: &str) -> Self {
        let mut incoming = HashMap::new();
        for pair in header.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            incoming
                .entry(name.to_owned())
                .or_insert_with(|| value.trim().trim_matches('"').to_owned());
        }
        Self {
            incoming,
            outgoing: Mutex::new(IndexMap::new()),
        }
    }

    /// Returns the `Set-Cookie` header values to send, one per session name.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        match self.outgoing.lock() {
            Ok(outgoing) => outgoing.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }

    fn queue(&self, name: &str, header: String) {
        let mut outgoing = match self.outgoing.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        outgoing.insert(name.to_owned(), header);
    }
}

impl SessionTransport for CookieTransport {
    fn incoming_id(&self, name: &str) -> Option<String> {
        let value = self.incoming.get(name)?;
        if is_valid_session_id(value) {
            Some(value.clone())
        } else {
            log::warn!(target: "sealed_session::transport", "msg=\"session cookie rejected\" name=\"{name}\" cookie_prefix=\"{}...\"", value.chars().take(8).collect::<String>());
            None
        }
    }

    fn commit_id(&self, config: &SessionConfig, session_id: &str) {
        self.queue(&config.name, session_cookie(config, session_id));
    }

    fn expire(&self, config: &SessionConfig) {
        self.queue(&config.name, expired_cookie(config));
    }
}

/// Formats the `Set-Cookie` value that hands `session_id` to the client.
pub fn session_cookie(config: &SessionConfig, session_id: &str) -> String {
    format_cookie(config, session_id, config.timeout)
}

/// Formats the `Set-Cookie` value that removes the session cookie.
pub fn expired_cookie(config: &SessionConfig) -> String {
    format_cookie(config, "", 0)
}

fn format_cookie(config: &SessionConfig, value: &str, max_age: i64) -> String {
    let mut cookie = format!("{}={value}; Path=/; Max-Age={max_age}", config.name);
    if config.secure {
        cookie.push_str("; Secure");
    }
    if config.http_only {
        cookie.push_str("; HttpOnly");
    }
    cookie.push_str("; SameSite=");
    cookie.push_str(config.same_site.as_str());
    cookie
}
