//! Session configuration and validation of configuration bags.
//!
//! Configuration arrives either as a [`SessionConfig`] built in code or as a
//! loosely typed bag (a JSON object) whose recognized fields are
//! `name`, `secure`, `httpOnly`, `sameSite` and `timeout`.
//!
//! # Example
//!
//! ```rust
//! use sealed_session::config::{SameSite, SessionConfig};
//! use serde_json::json;
//!
//! let config = SessionConfig::from_bag(&json!({"timeout": 600, "sameSite": "Lax"})).unwrap();
//! assert_eq!(config.name, "simple_session");
//! assert_eq!(config.timeout, 600);
//! assert_eq!(config.same_site, SameSite::Lax);
//!
//! assert!(SessionConfig::from_bag(&json!({"timeout": "3600"})).is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde_json::{Map, Value};

use crate::{Result, SessionError};

pub const DEFAULT_SESSION_NAME: &str = "simple_session";

/// Default identifier lifetime in seconds.
pub const DEFAULT_TIMEOUT_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    None,
    Lax,
    #[default]
    Strict,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::None => "None",
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameSite {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(SameSite::None),
            "lax" => Ok(SameSite::Lax),
            "strict" => Ok(SameSite::Strict),
            _ => Err(invalid("sameSite")),
        }
    }
}

/// Settings for one named session.
///
/// Use `SessionConfig::default()` for production defaults: secure,
/// HTTP-only, `SameSite=Strict` cookies and a one hour identifier lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session (and cookie) name. Must be a cookie token, see [`is_cookie_token`].
    pub name: String,

    /// Only send the cookie over HTTPS.
    pub secure: bool,

    /// Hide the cookie from client-side scripts.
    pub http_only: bool,

    pub same_site: SameSite,

    /// Seconds an identifier may live before it is regenerated.
    ///
    /// Default: 3600
    pub timeout: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SESSION_NAME.to_owned(),
            secure: true,
            http_only: true,
            same_site: SameSite::Strict,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration suitable for local development over plain HTTP.
    pub fn development() -> Self {
        Self {
            secure: false,
            same_site: SameSite::Lax,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Checks that `name` can be used as a cookie name.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfiguration` for the field `name`.
    pub fn check_name(&self) -> Result<()> {
        if is_cookie_token(&self.name) {
            Ok(())
        } else {
            log::warn!(target: "sealed_session::config", "msg=\"invalid session configuration\" field=\"name\"");
            Err(invalid("name"))
        }
    }

    /// Returns the identifier lifetime as a `chrono::Duration`.
    #[inline]
    pub fn timeout_duration(&self) -> Duration {
        Duration::seconds(self.timeout)
    }

    /// Builds a configuration from a bag, filling absent fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfiguration` naming the first field
    /// whose type does not match (see [`validate`]).
    pub fn from_bag(bag: &Value) -> Result<Self> {
        let fields = validate(bag)?;
        let mut config = Self::default();

        if let Some(name) = fields.get("name").and_then(Value::as_str) {
            config.name = name.to_owned();
        }
        if let Some(secure) = fields.get("secure").and_then(Value::as_bool) {
            config.secure = secure;
        }
        if let Some(http_only) = fields.get("httpOnly").and_then(Value::as_bool) {
            config.http_only = http_only;
        }
        if let Some(same_site) = fields.get("sameSite").and_then(Value::as_str) {
            config.same_site = same_site.parse()?;
        }
        if let Some(timeout) = fields.get("timeout").and_then(Value::as_i64) {
            config.timeout = timeout;
        }

        Ok(config)
    }

    /// Resolves the configuration for a session constructed with an explicit
    /// `name` next to a bag.
    ///
    /// When `use_this_name_first` is true, or the bag carries no name, `name`
    /// wins. Otherwise the bag's `name` is used.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfiguration` if the bag is invalid.
    pub fn resolve(name: &str, bag: &Value, use_this_name_first: bool) -> Result<Self> {
        let mut config = Self::from_bag(bag)?;
        let bag_has_name = bag.get("name").is_some();
        if use_this_name_first || !bag_has_name {
            config.name = name.to_owned();
        }
        config.check_name()?;
        Ok(config)
    }
}

/// Checks the type of every recognized field present in `bag`.
///
/// Field types: `name` string that is a cookie token, `secure` bool, `httpOnly` bool, `sameSite`
/// string naming `Strict`, `Lax` or `None`, `timeout` non-negative integer.
/// Absent and unrecognized fields are not checked.
///
/// # Errors
///
/// Returns `SessionError::InvalidConfiguration` naming the offending field,
/// or the field `config` if the bag is not an object.
pub fn validate(bag: &Value) -> Result<&Map<String, Value>> {
    let fields = bag.as_object().ok_or_else(|| invalid("config"))?;

    for (field, value) in fields {
        let ok = match field.as_str() {
            "name" => value.as_str().is_some_and(is_cookie_token),
            "secure" | "httpOnly" => value.is_boolean(),
            "sameSite" => value.as_str().is_some_and(|s| s.parse::<SameSite>().is_ok()),
            "timeout" => value.as_i64().is_some_and(|t| t >= 0),
            _ => true,
        };
        if !ok {
            log::warn!(target: "sealed_session::config", "msg=\"invalid session configuration\" field=\"{field}\"");
            return Err(invalid(field));
        }
    }

    Ok(fields)
}

/// Returns true if `name` is a cookie name token (RFC 6265): one or more
/// visible ASCII characters other than separators.
pub fn is_cookie_token(name: &str) -> bool {
    const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={}";
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !SEPARATORS.contains(&b))
}

fn invalid(field: &str) -> SessionError {
    SessionError::InvalidConfiguration {
        field: field.to_owned(),
    }
}
