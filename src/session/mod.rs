//! Encrypted sessions.

mod flash;
mod rotation;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub use flash::{FLASH_SESSION_NAME, FlashMessenger};
use indexmap::IndexMap;
pub use rotation::IdentityRotator;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[cfg(feature = "tracing")]
use crate::TracingConfig;
use crate::backend::{SessionBackend, SessionRecord};
use crate::clock::{Clock, SystemClock};
use crate::keys::KeyProvider;
use crate::transport::SessionTransport;
use crate::{EncryptionKey, Result, SameSite, SessionConfig, SessionError, crypto};

/// Reserved key holding the time of the last identifier rotation.
///
/// Its value is a plaintext Unix timestamp in seconds. It is the one value in
/// a session that is not encrypted, it cannot be set or destroyed through
/// [`Session::set`] / [`Session::destroy`], and [`Session::get_all`] leaves it
/// out. Read it with [`Session::last_access_time`].
pub const LAST_ACCESS_TIME: &str = "last_access_time";

/// Identifier and in-memory record of a session started in this request.
#[derive(Debug)]
struct SessionState {
    id: String,
    record: SessionRecord,
}

type SharedState = Arc<Mutex<SessionState>>;

/// The collaborators of one request's sessions.
///
/// Backend, key provider and clock are process-wide and shared behind `Arc`.
/// The transport and the sessions already started belong to a single
/// request: build one context per request. Every [`Session`] opened under the
/// same name in one context works on the same identifier and record.
pub struct SessionContext {
    backend: Arc<dyn SessionBackend>,
    keys: Arc<dyn KeyProvider>,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn SessionTransport>,
    started: Mutex<HashMap<String, SharedState>>,
    #[cfg(feature = "tracing")]
    tracing: Option<TracingConfig>,
}

impl SessionContext {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        keys: Arc<dyn KeyProvider>,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        Self {
            backend,
            keys,
            clock: Arc::new(SystemClock),
            transport,
            started: Mutex::new(HashMap::new()),
            #[cfg(feature = "tracing")]
            tracing: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(feature = "tracing")]
    pub fn with_tracing(mut self) -> Self {
        self.tracing = Some(TracingConfig::default_span());
        self
    }

    #[cfg(feature = "tracing")]
    pub fn with_tracing_config(mut self, config: TracingConfig) -> Self {
        self.tracing = Some(config);
        self
    }

    /// Returns the current identifier of session `name` if it was started in
    /// this request.
    pub fn started_id(&self, name: &str) -> Option<String> {
        let state = self.started().get(name).cloned()?;
        let id = lock_state(&state).id.clone();
        Some(id)
    }

    fn started(&self) -> MutexGuard<'_, HashMap<String, SharedState>> {
        // The map only ever holds complete inserts, so a poisoned guard is usable.
        match self.started.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn started_state(&self, name: &str) -> Option<SharedState> {
        self.started().get(name).cloned()
    }

    fn mark_started(&self, name: &str, state: SharedState) {
        self.started().insert(name.to_owned(), state);
    }

    fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }
}

// A state is only replaced after a successful persist, so a poisoned guard
// still holds a consistent identifier and record.
fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One named session with encrypted values.
///
/// Every value is serialized to JSON and sealed with the key in force when
/// the session was opened. Mutations are written through to the backend
/// before they return; if the backend write fails, the in-memory state is
/// left as it was.
///
/// Handles opened under the same name in one [`SessionContext`] share their
/// identifier and data, so a change made through one, including
/// [`Session::destroy_all`] and [`Session::regenerate_id`], is seen by all.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use sealed_session::backend::MemorySessionBackend;
/// use sealed_session::keys::StaticKeyProvider;
/// use sealed_session::transport::CookieTransport;
/// use sealed_session::{Session, SessionConfig, SessionContext};
///
/// let ctx = SessionContext::new(
///     Arc::new(MemorySessionBackend::new()),
///     Arc::new(StaticKeyProvider::random()),
///     Arc::new(CookieTransport::new()),
/// );
///
/// let mut session = Session::with_config(&ctx, SessionConfig::default()).unwrap();
/// session.set("username", "david").unwrap();
/// assert_eq!(session.get::<String>("username").unwrap().as_deref(), Some("david"));
///
/// session.destroy_all().unwrap();
/// assert_eq!(session.get::<String>("username").unwrap(), None);
/// ```
pub struct Session<'a> {
    ctx: &'a SessionContext,
    config: SessionConfig,
    key: EncryptionKey,
    state: SharedState,
}

impl<'a> Session<'a> {
    /// Opens the session named `name`, configured by `bag`.
    ///
    /// `bag` may carry `name`, `secure`, `httpOnly`, `sameSite` and `timeout`.
    /// When `use_this_name_first` is true, `name` wins over the bag's `name`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfiguration` for a mistyped bag field
    /// or a name that is not a cookie token, `SessionError::KeyProvider` if no
    /// key is available, and `SessionError::Backend` if the backend cannot
    /// start the session.
    pub fn open(
        ctx: &'a SessionContext,
        name: &str,
        bag: &Value,
        use_this_name_first: bool,
    ) -> Result<Self> {
        let config = SessionConfig::resolve(name, bag, use_this_name_first)?;
        Self::with_config(ctx, config)
    }

    /// Opens a session from a configuration built in code.
    ///
    /// If the session was not started yet in this request, it is resumed from
    /// the identifier the client presented or created fresh, and then its
    /// identifier is rotated if it has outlived `config.timeout`. A session
    /// that was already started in this request is joined as it stands,
    /// without rotation.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfiguration` if `config.name` is not a
    /// cookie token, `SessionError::KeyProvider` if no key is available and
    /// `SessionError::Backend` if the backend fails.
    pub fn with_config(ctx: &'a SessionContext, config: SessionConfig) -> Result<Self> {
        config.check_name()?;

        #[cfg(feature = "tracing")]
        {
            if let Some(ref tracing_config) = ctx.tracing {
                let span = tracing::info_span!(
                    "session",
                    name = tracing_config.span_name,
                    session = %config.name
                );
                let _entered = span.enter();
                let result = Self::start(ctx, config);
                match &result {
                    Ok(_) => tracing::info!("session started"),
                    Err(e) => tracing::warn!(error = %e, "session start failed"),
                }
                return result;
            }
        }

        Self::start(ctx, config)
    }

    fn start(ctx: &'a SessionContext, config: SessionConfig) -> Result<Self> {
        let key = ctx.keys.get_key()?;

        if let Some(state) = ctx.started_state(&config.name) {
            return Ok(Self {
                ctx,
                config,
                key,
                state,
            });
        }

        let now = ctx.now();
        let resumed = match ctx.transport.incoming_id(&config.name) {
            Some(id) => ctx.backend.load(&id)?.map(|record| (id, record)),
            None => None,
        };

        let (id, record) = match resumed {
            Some(found) => found,
            None => {
                let id = ctx.backend.create_id()?;
                let record = SessionRecord::started_at(now);
                ctx.backend.persist(&id, &record)?;
                ctx.transport.commit_id(&config, &id);
                log::info!(target: "sealed_session::session", "msg=\"session created\" name=\"{}\"", config.name);
                (id, record)
            }
        };

        let state = Arc::new(Mutex::new(SessionState { id, record }));
        ctx.mark_started(&config.name, state.clone());

        let mut session = Self {
            ctx,
            config,
            key,
            state,
        };

        IdentityRotator::new(session.config.timeout).run(&mut session, now)?;

        Ok(session)
    }

    /// Seals `value` and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ReservedKey` for [`LAST_ACCESS_TIME`],
    /// `SessionError::Serialization` / `SessionError::EncryptionFailure` if the
    /// value cannot be sealed, and `SessionError::Backend` if it cannot be
    /// persisted.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        if key == LAST_ACCESS_TIME {
            return Err(SessionError::ReservedKey(key.to_owned()));
        }

        let blob = crypto::encrypt(value, &self.key)?;
        self.write_through(|record| {
            record.entries.insert(key.to_owned(), blob);
        })
    }

    /// Returns the value stored under `key`, or `None` if there is none.
    ///
    /// [`LAST_ACCESS_TIME`] is returned as stored, without decryption.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::DecryptionFailure` if the value was sealed under
    /// another key or is corrupt, and `SessionError::Serialization` if it is
    /// not a `T`. Other keys stay readable.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let state = self.state();

        if key == LAST_ACCESS_TIME {
            return state
                .record
                .last_access_time
                .map(|t| {
                    serde_json::from_value(Value::from(t))
                        .map_err(|e| SessionError::Serialization(e.to_string()))
                })
                .transpose();
        }

        match state.record.entries.get(key) {
            Some(blob) => self.unseal(key, blob).map(Some),
            None => Ok(None),
        }
    }

    /// Returns every ordinary key with its decrypted value, in insertion order.
    ///
    /// [`LAST_ACCESS_TIME`] is not included.
    ///
    /// # Errors
    ///
    /// Fails with the first entry that cannot be decrypted.
    pub fn get_all(&self) -> Result<IndexMap<String, Value>> {
        self.state()
            .record
            .entries
            .iter()
            .map(|(key, blob)| -> Result<(String, Value)> {
                Ok((key.clone(), self.unseal(key, blob)?))
            })
            .collect()
    }

    /// Returns a copy of the raw entries, still sealed.
    pub fn all(&self) -> IndexMap<String, String> {
        self.state().record.entries.clone()
    }

    /// Returns the Unix time of the last identifier rotation.
    pub fn last_access_time(&self) -> Option<i64> {
        self.state().record.last_access_time
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().record.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().record.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().record.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().record.entries.is_empty()
    }

    /// Removes `key`. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ReservedKey` for [`LAST_ACCESS_TIME`] and
    /// `SessionError::Backend` if the change cannot be persisted.
    pub fn destroy(&mut self, key: &str) -> Result<()> {
        if key == LAST_ACCESS_TIME {
            return Err(SessionError::ReservedKey(key.to_owned()));
        }

        self.write_through(|record| {
            record.entries.shift_remove(key);
        })
    }

    /// Destroys the backend session and starts over with an empty one.
    ///
    /// The old identifier is revoked. The empty session is persisted under a
    /// new identifier, so the session stays usable afterwards.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Backend` if the backend fails.
    pub fn destroy_all(&mut self) -> Result<()> {
        let now = self.ctx.now();
        let mut state = self.state();

        self.ctx.backend.destroy(&state.id)?;
        self.ctx.transport.expire(&self.config);

        let id = self.ctx.backend.create_id()?;
        let record = SessionRecord::started_at(now);
        self.ctx.backend.persist(&id, &record)?;

        self.ctx.transport.commit_id(&self.config, &id);
        state.id = id;
        state.record = record;

        log::info!(target: "sealed_session::session", "msg=\"session destroyed\" name=\"{}\"", self.config.name);

        Ok(())
    }

    /// Same as [`Session::destroy_all`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Backend` if the backend fails.
    pub fn restart(&mut self) -> Result<()> {
        self.destroy_all()
    }

    /// Moves the session data to a new identifier and revokes the old one.
    ///
    /// Records the current time as [`LAST_ACCESS_TIME`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Backend` if the backend fails. The session keeps
    /// its old identifier in that case.
    pub fn regenerate_id(&mut self) -> Result<()> {
        let now = self.ctx.now();
        self.regenerate_id_at(now)
    }

    fn regenerate_id_at(&mut self, now: i64) -> Result<()> {
        let mut state = self.state();

        let id = self.ctx.backend.create_id()?;
        let mut record = state.record.clone();
        record.last_access_time = Some(now);

        self.ctx.backend.persist(&id, &record)?;
        self.ctx.backend.destroy(&state.id)?;

        self.ctx.transport.commit_id(&self.config, &id);
        state.id = id;
        state.record = record;

        log::info!(target: "sealed_session::session", "msg=\"session identifier rotated\" name=\"{}\"", self.config.name);

        Ok(())
    }

    /// Stores a one-shot message for the next reader.
    ///
    /// The flash session shares this session's cookie attributes.
    ///
    /// # Errors
    ///
    /// See [`FlashMessenger::set_flash`].
    pub fn set_flash_message<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        FlashMessenger::with_config(self.ctx, &self.config).set_flash(key, value)
    }

    /// Reads and removes a one-shot message.
    ///
    /// # Errors
    ///
    /// See [`FlashMessenger::get_flash`].
    pub fn get_flash_message<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        FlashMessenger::with_config(self.ctx, &self.config).get_flash(key)
    }

    /// Returns the current identifier.
    pub fn id(&self) -> String {
        self.state().id.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn session_name(&self) -> &str {
        &self.config.name
    }

    pub fn is_secure(&self) -> bool {
        self.config.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.config.http_only
    }

    pub fn same_site(&self) -> SameSite {
        self.config.same_site
    }

    /// Identifier lifetime in seconds.
    pub fn session_timeout(&self) -> i64 {
        self.config.timeout
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }

    fn unseal<T: DeserializeOwned>(&self, key: &str, blob: &str) -> Result<T> {
        crypto::decrypt(blob, &self.key).inspect_err(|e| {
            log::warn!(target: "sealed_session::session", "msg=\"session value unreadable\" name=\"{}\" key=\"{key}\" error=\"{e}\"", self.config.name);
        })
    }

    /// Applies `change` to a copy of the record, persists it, then adopts it.
    fn write_through(&mut self, change: impl FnOnce(&mut SessionRecord)) -> Result<()> {
        let mut state = self.state();
        let mut record = state.record.clone();
        change(&mut record);
        self.ctx.backend.persist(&state.id, &record)?;
        state.record = record;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::backend::MemorySessionBackend;
    use crate::clock::FixedClock;
    use crate::keys::StaticKeyProvider;
    use crate::transport::CookieTransport;

    struct Harness {
        backend: Arc<MemorySessionBackend>,
        keys: Arc<StaticKeyProvider>,
        clock: Arc<FixedClock>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                backend: Arc::new(MemorySessionBackend::new()),
                keys: Arc::new(StaticKeyProvider::random()),
                clock: Arc::new(FixedClock::new(
                    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
                )),
            }
        }

        fn request(&self, cookies: Arc<CookieTransport>) -> SessionContext {
            SessionContext::new(self.backend.clone(), self.keys.clone(), cookies)
                .with_clock(self.clock.clone())
        }
    }

    fn cookie_for(headers: &[String], name: &str) -> String {
        headers
            .iter()
            .find_map(|h| h.strip_prefix(&format!("{name}=")))
            .and_then(|rest| rest.split(';').next())
            .unwrap()
            .to_owned()
    }

    #[test]
    fn test_set_get_roundtrip() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();

        session.set("username", "david").unwrap();
        session.set("cart", &json!({"items": [1, 2]})).unwrap();

        assert_eq!(
            session.get::<String>("username").unwrap().as_deref(),
            Some("david")
        );
        assert_eq!(
            session.get::<Value>("cart").unwrap(),
            Some(json!({"items": [1, 2]}))
        );
        assert_eq!(session.get::<String>("missing").unwrap(), None);
    }

    #[test]
    fn test_values_are_sealed_in_backend() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();
        session.set("username", "david").unwrap();

        let stored = h.backend.load(&session.id()).unwrap().unwrap();
        let blob = &stored.entries["username"];
        assert!(!blob.contains("david"));
        assert_eq!(session.all()["username"], *blob);
    }

    #[test]
    fn test_write_through_on_every_mutation() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();

        session.set("a", &1).unwrap();
        session.set("b", &2).unwrap();
        assert_eq!(h.backend.load(&session.id()).unwrap().unwrap().entries.len(), 2);

        session.destroy("a").unwrap();
        let stored = h.backend.load(&session.id()).unwrap().unwrap();
        assert_eq!(stored.entries.len(), 1);
        assert!(stored.entries.contains_key("b"));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();
        session.set("k", "v").unwrap();

        session.destroy("k").unwrap();
        session.destroy("k").unwrap();
        assert!(!session.contains("k"));
        assert!(session.is_empty());
    }

    #[test]
    fn test_reserved_key_is_protected() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();

        assert!(matches!(
            session.set(LAST_ACCESS_TIME, &0),
            Err(SessionError::ReservedKey(_))
        ));
        assert!(matches!(
            session.destroy(LAST_ACCESS_TIME),
            Err(SessionError::ReservedKey(_))
        ));

        let stamp = session.last_access_time().unwrap();
        assert_eq!(session.get::<i64>(LAST_ACCESS_TIME).unwrap(), Some(stamp));
    }

    #[test]
    fn test_get_all_decrypts_in_order_without_reserved_key() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();

        session.set("username", "david").unwrap();
        session.set("age", &40).unwrap();

        let all = session.get_all().unwrap();
        let keys: Vec<&str> = all.keys().map(String::as_str).collect();
        assert_eq!(keys, ["username", "age"]);
        assert_eq!(all["username"], json!("david"));
        assert_eq!(all["age"], json!(40));
        assert!(!all.contains_key(LAST_ACCESS_TIME));
        assert_eq!(session.keys(), ["username", "age"]);
    }

    #[test]
    fn test_destroy_all_revokes_identifier() {
        let h = Harness::new();
        let cookies = Arc::new(CookieTransport::new());
        let ctx = h.request(cookies.clone());
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();
        session.set("username", "david").unwrap();
        let old_id = session.id();

        session.destroy_all().unwrap();

        assert_ne!(session.id(), old_id);
        assert!(h.backend.load(&old_id).unwrap().is_none());
        assert_eq!(session.get::<String>("username").unwrap(), None);
        assert_eq!(session.last_access_time(), Some(h.clock.now().timestamp()));
        assert_eq!(cookie_for(&cookies.set_cookie_headers(), "app"), session.id());

        // Still usable afterwards.
        session.set("username", "eve").unwrap();
        assert_eq!(
            session.get::<String>("username").unwrap().as_deref(),
            Some("eve")
        );
    }

    #[test]
    fn test_restart_matches_destroy_all() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();
        session.set("k", "v").unwrap();

        session.restart().unwrap();
        assert!(session.is_empty());
        assert!(h.backend.load(&session.id()).unwrap().unwrap().entries.is_empty());
    }

    #[test]
    fn test_resumes_from_cookie_within_timeout() {
        let h = Harness::new();
        let first = Arc::new(CookieTransport::new());
        let id = {
            let ctx = h.request(first.clone());
            let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();
            session.set("username", "david").unwrap();
            session.id()
        };

        h.clock.advance(Duration::seconds(3600));
        let header = format!("app={}", cookie_for(&first.set_cookie_headers(), "app"));
        let ctx = h.request(Arc::new(CookieTransport::from_cookie_header(&header)));
        let session = Session::open(&ctx, "app", &json!({}), false).unwrap();

        assert_eq!(session.id(), id);
        assert_eq!(
            session.get::<String>("username").unwrap().as_deref(),
            Some("david")
        );
    }

    #[test]
    fn test_rotates_after_timeout() {
        let h = Harness::new();
        let first = Arc::new(CookieTransport::new());
        let (id, stamp) = {
            let ctx = h.request(first.clone());
            let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();
            session.set("username", "david").unwrap();
            (session.id(), session.last_access_time().unwrap())
        };

        h.clock.advance(Duration::seconds(3601));
        let header = format!("app={id}");
        let cookies = Arc::new(CookieTransport::from_cookie_header(&header));
        let ctx = h.request(cookies.clone());
        let session = Session::open(&ctx, "app", &json!({}), false).unwrap();

        assert_ne!(session.id(), id);
        assert_eq!(session.last_access_time(), Some(stamp + 3601));
        assert_eq!(
            session.get::<String>("username").unwrap().as_deref(),
            Some("david")
        );
        assert!(h.backend.load(&id).unwrap().is_none());
        assert_eq!(cookie_for(&cookies.set_cookie_headers(), "app"), session.id());
    }

    #[test]
    fn test_unknown_cookie_gets_fresh_session() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::from_cookie_header("app=doesnotexist")));
        let session = Session::open(&ctx, "app", &json!({}), false).unwrap();

        assert_ne!(session.id(), "doesnotexist");
        assert!(session.is_empty());
    }

    #[test]
    fn test_second_open_in_request_is_resumed_without_rotation() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));

        let mut first = Session::open(&ctx, "app", &json!({"timeout": 0}), false).unwrap();
        first.set("k", "v").unwrap();

        h.clock.advance(Duration::seconds(10));
        let second = Session::open(&ctx, "app", &json!({"timeout": 0}), false).unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.last_access_time(), first.last_access_time());
        assert_eq!(second.get::<String>("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_invalid_config_aborts_open() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));

        let result = Session::open(&ctx, "app", &json!({"timeout": "3600"}), false);
        assert!(matches!(
            result,
            Err(SessionError::InvalidConfiguration { ref field }) if field == "timeout"
        ));
        assert!(h.backend.is_empty());
        assert!(ctx.started_id("app").is_none());
    }

    #[test]
    fn test_key_failure_aborts_open() {
        struct BrokenKeys;
        impl KeyProvider for BrokenKeys {
            fn get_key(&self) -> Result<EncryptionKey> {
                Err(SessionError::KeyProvider("disk gone".to_owned()))
            }
        }

        let backend = Arc::new(MemorySessionBackend::new());
        let ctx = SessionContext::new(
            backend.clone(),
            Arc::new(BrokenKeys),
            Arc::new(CookieTransport::new()),
        );

        assert!(matches!(
            Session::open(&ctx, "app", &json!({}), false),
            Err(SessionError::KeyProvider(_))
        ));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_decryption_failure_is_per_key() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();
        session.set("good", "fine").unwrap();
        let id = session.id();

        let foreign = crypto::encrypt("other", &EncryptionKey::generate()).unwrap();
        let mut stored = h.backend.load(&id).unwrap().unwrap();
        stored.entries.insert("bad".to_owned(), foreign);
        h.backend.persist(&id, &stored).unwrap();

        let header = format!("app={id}");
        let next = h.request(Arc::new(CookieTransport::from_cookie_header(&header)));
        let reopened = Session::open(&next, "app", &json!({}), false).unwrap();
        assert!(matches!(
            reopened.get::<String>("bad"),
            Err(SessionError::DecryptionFailure(_))
        ));
        assert_eq!(
            reopened.get::<String>("good").unwrap().as_deref(),
            Some("fine")
        );
        assert!(reopened.get_all().is_err());
    }

    #[test]
    fn test_accessors_reflect_config() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let bag = json!({"name": "ignored", "secure": false, "sameSite": "Lax", "timeout": 90});
        let session = Session::open(&ctx, "chosen", &bag, true).unwrap();

        assert_eq!(session.session_name(), "chosen");
        assert!(!session.is_secure());
        assert!(session.is_http_only());
        assert_eq!(session.same_site(), SameSite::Lax);
        assert_eq!(session.session_timeout(), 90);
    }

    #[test]
    fn test_regenerate_id_preserves_data() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut session = Session::open(&ctx, "app", &json!({}), false).unwrap();
        session.set("role", "admin").unwrap();
        let old_id = session.id();

        session.regenerate_id().unwrap();

        assert_ne!(session.id(), old_id);
        assert_eq!(ctx.started_id("app"), Some(session.id()));
        assert_eq!(
            session.get::<String>("role").unwrap().as_deref(),
            Some("admin")
        );
        assert!(h.backend.load(&old_id).unwrap().is_none());
    }

    #[test]
    fn test_new_session_is_stamped_not_rotated() {
        let h = Harness::new();
        let cookies = Arc::new(CookieTransport::new());
        let ctx = h.request(cookies.clone());
        let session = Session::open(&ctx, "app", &json!({}), false).unwrap();

        let now = h.clock.now().timestamp();
        assert_eq!(session.last_access_time(), Some(now));
        assert_eq!(h.backend.len(), 1);
        assert_eq!(
            h.backend.load(&session.id()).unwrap().unwrap().last_access_time,
            Some(now)
        );
        assert_eq!(cookie_for(&cookies.set_cookie_headers(), "app"), session.id());
    }

    #[test]
    fn test_handles_of_one_name_share_state() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut a = Session::open(&ctx, "app", &json!({}), false).unwrap();
        let mut b = Session::open(&ctx, "app", &json!({}), false).unwrap();

        a.set("one", &1).unwrap();
        b.set("two", &2).unwrap();

        assert_eq!(a.keys(), ["one", "two"]);
        let stored = h.backend.load(&a.id()).unwrap().unwrap();
        assert_eq!(
            stored.entries.keys().map(String::as_str).collect::<Vec<_>>(),
            ["one", "two"]
        );
    }

    #[test]
    fn test_destroy_all_through_one_handle_revokes_for_all() {
        let h = Harness::new();
        let cookies = Arc::new(CookieTransport::new());
        let ctx = h.request(cookies.clone());
        let mut a = Session::open(&ctx, "app", &json!({}), false).unwrap();
        let mut b = Session::open(&ctx, "app", &json!({}), false).unwrap();
        a.set("role", "admin").unwrap();
        let old_id = a.id();

        a.destroy_all().unwrap();
        b.set("x", &1).unwrap();

        assert!(h.backend.load(&old_id).unwrap().is_none());
        assert_eq!(b.id(), a.id());
        assert_eq!(b.get::<String>("role").unwrap(), None);

        let stored = h.backend.load(&a.id()).unwrap().unwrap();
        assert_eq!(
            stored.entries.keys().map(String::as_str).collect::<Vec<_>>(),
            ["x"]
        );
        assert_eq!(cookie_for(&cookies.set_cookie_headers(), "app"), a.id());
    }

    #[test]
    fn test_regenerate_id_through_one_handle_moves_all() {
        let h = Harness::new();
        let ctx = h.request(Arc::new(CookieTransport::new()));
        let mut a = Session::open(&ctx, "app", &json!({}), false).unwrap();
        let mut b = Session::open(&ctx, "app", &json!({}), false).unwrap();
        let old_id = a.id();

        a.regenerate_id().unwrap();
        b.set("after", "login").unwrap();

        assert!(h.backend.load(&old_id).unwrap().is_none());
        assert_eq!(b.id(), a.id());
        assert_eq!(
            a.get::<String>("after").unwrap().as_deref(),
            Some("login")
        );
    }

    #[test]
    fn test_open_rejects_name_that_is_not_a_cookie_token() {
        let h = Harness::new();
        let cookies = Arc::new(CookieTransport::new());
        let ctx = h.request(cookies.clone());

        let result = Session::open(&ctx, "app; Domain=evil.example", &json!({}), false);
        assert!(matches!(
            result,
            Err(SessionError::InvalidConfiguration { ref field }) if field == "name"
        ));

        let config = SessionConfig::default().with_name("a=b");
        assert!(Session::with_config(&ctx, config).is_err());
        assert!(h.backend.is_empty());
        assert!(cookies.set_cookie_headers().is_empty());
    }
}
