//! Server-side Sessions
//!
//! Sessions are keyed by an opaque random token; the token is the only
//! thing the client ever holds. Mutations are buffered on the `Session`
//! value and become visible to other holders of the token only once
//! `SessionStore::save` commits them. Dropping an unsaved `Session`
//! discards its pending changes.

use crate::config::{AuthConfig, MAX_SESSION_TTL};
use crate::error::{bounded, AuthError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Attribute holding the authenticated principal
pub const USERNAME_KEY: &str = "username";

/// Random bytes per token (hex encoded to twice as many characters)
pub const TOKEN_BYTES: usize = 32;

// ============================================
// Token
// ============================================

/// Opaque session identifier
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh token from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let mut encoded = String::with_capacity(TOKEN_BYTES * 2);
        for byte in bytes {
            let _ = write!(encoded, "{:02x}", byte);
        }
        Self(encoded)
    }

    /// Accept only strings shaped like a generated token
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == TOKEN_BYTES * 2
            && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));

        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Enough to correlate log lines, not enough to replay.
        write!(f, "SessionToken({}…)", &self.0[..8])
    }
}

// ============================================
// Session value
// ============================================

/// Committed state of a session as held by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub attributes: HashMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Pending attribute writes; `None` removes the key
pub type SessionChanges = HashMap<String, Option<String>>;

/// A session acquired for the duration of one request
#[derive(Debug, Clone)]
pub struct Session {
    token: SessionToken,
    attributes: HashMap<String, String>,
    pending: SessionChanges,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn from_record(token: SessionToken, record: SessionRecord) -> Self {
        Self {
            token,
            attributes: record.attributes,
            pending: HashMap::new(),
            expires_at: record.expires_at,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Read an attribute, including this holder's unsaved writes
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.pending.get(key) {
            Some(value) => value.as_deref(),
            None => self.attributes.get(key).map(String::as_str),
        }
    }

    /// Buffer an attribute write until `save`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pending.insert(key.into(), Some(value.into()));
    }

    /// Buffer an attribute removal until `save`
    pub fn remove(&mut self, key: impl Into<String>) {
        self.pending.insert(key.into(), None);
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Committed principal, ignoring unsaved writes
    pub fn username(&self) -> Option<&str> {
        self.attributes.get(USERNAME_KEY).map(String::as_str)
    }

    pub fn is_authenticated(&self) -> bool {
        self.username().is_some()
    }
}

// ============================================
// Backend
// ============================================

/// Storage for committed session records
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Store a brand-new record
    async fn insert(&self, token: &SessionToken, record: SessionRecord) -> Result<(), AuthError>;

    /// Fetch a record; expired records are dropped and reported as missing
    async fn load(&self, token: &SessionToken) -> Result<Option<SessionRecord>, AuthError>;

    /// Apply changes to an existing live record in one step
    ///
    /// Returns `None` without writing if the record is gone or expired.
    async fn commit(
        &self,
        token: &SessionToken,
        changes: &SessionChanges,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, AuthError>;

    /// Delete a record; deleting a missing record is not an error
    async fn remove(&self, token: &SessionToken) -> Result<(), AuthError>;

    /// Delete every record expired at `now`, returning how many went
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AuthError>;
}

/// Process-local session backend
#[derive(Debug, Default)]
pub struct MemorySessionBackend {
    sessions: RwLock<HashMap<SessionToken, SessionRecord>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionBackend for MemorySessionBackend {
    async fn insert(&self, token: &SessionToken, record: SessionRecord) -> Result<(), AuthError> {
        self.sessions.write().await.insert(token.clone(), record);
        Ok(())
    }

    async fn load(&self, token: &SessionToken) -> Result<Option<SessionRecord>, AuthError> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return Ok(None),
                Some(record) if !record.is_expired(now) => return Ok(Some(record.clone())),
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write().await;
        if sessions.get(token).is_some_and(|r| r.is_expired(now)) {
            sessions.remove(token);
        }
        Ok(None)
    }

    async fn commit(
        &self,
        token: &SessionToken,
        changes: &SessionChanges,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, AuthError> {
        let mut sessions = self.sessions.write().await;

        if sessions.get(token).is_some_and(|r| r.is_expired(Utc::now())) {
            sessions.remove(token);
        }
        let Some(record) = sessions.get_mut(token) else {
            return Ok(None);
        };

        for (key, value) in changes {
            match value {
                Some(value) => {
                    record.attributes.insert(key.clone(), value.clone());
                }
                None => {
                    record.attributes.remove(key);
                }
            }
        }
        record.expires_at = expires_at;

        Ok(Some(record.clone()))
    }

    async fn remove(&self, token: &SessionToken) -> Result<(), AuthError> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AuthError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired(now));
        Ok(before - sessions.len())
    }
}

// ============================================
// Store
// ============================================

/// Creates, resolves, commits and destroys sessions
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    ttl: Duration,
    timeout: std::time::Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, ttl: Duration, timeout: std::time::Duration) -> Self {
        Self {
            backend,
            ttl,
            timeout,
        }
    }

    /// In-memory store using the configured lifetime and deadline
    pub fn memory(config: &AuthConfig) -> Self {
        Self::new(
            Arc::new(MemorySessionBackend::new()),
            Duration::seconds(config.session_ttl.clamp(1, MAX_SESSION_TTL)),
            config.store_timeout(),
        )
    }

    /// Idle lifetime of a session
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Allocate a fresh anonymous session
    pub async fn create(&self) -> Result<Session, AuthError> {
        let token = SessionToken::generate();
        let record = SessionRecord {
            attributes: HashMap::new(),
            expires_at: Utc::now() + self.ttl,
        };

        bounded(self.timeout, self.backend.insert(&token, record.clone())).await?;
        tracing::debug!(token = ?token, "Session created");

        Ok(Session::from_record(token, record))
    }

    /// Resolve a client-supplied token
    ///
    /// `Ok(None)` covers unknown, malformed and expired tokens alike.
    pub async fn get(&self, raw_token: &str) -> Result<Option<Session>, AuthError> {
        let Some(token) = SessionToken::parse(raw_token) else {
            return Ok(None);
        };

        let record = bounded(self.timeout, self.backend.load(&token)).await?;
        Ok(record.map(|record| Session::from_record(token, record)))
    }

    /// Commit a session's pending changes and slide its expiry
    ///
    /// Fails with `InvalidSession` if the token was destroyed or expired in
    /// the meantime; the token is never brought back.
    pub async fn save(&self, session: &mut Session) -> Result<(), AuthError> {
        let expires_at = Utc::now() + self.ttl;

        let committed = bounded(
            self.timeout,
            self.backend.commit(&session.token, &session.pending, expires_at),
        )
        .await?;

        match committed {
            Some(record) => {
                session.attributes = record.attributes;
                session.expires_at = record.expires_at;
                session.pending.clear();
                Ok(())
            }
            None => {
                tracing::debug!(token = ?session.token, "Save on a vanished session");
                Err(AuthError::InvalidSession)
            }
        }
    }

    /// Invalidate a token immediately; idempotent
    pub async fn destroy(&self, token: &SessionToken) -> Result<(), AuthError> {
        bounded(self.timeout, self.backend.remove(token)).await?;
        tracing::debug!(token = ?token, "Session destroyed");
        Ok(())
    }

    /// Drop every expired session
    pub async fn purge_expired(&self) -> Result<usize, AuthError> {
        bounded(self.timeout, self.backend.purge_expired(Utc::now())).await
    }

    /// Sweep expired sessions on a fixed interval until the handle is dropped
    pub fn spawn_sweeper(&self, interval: std::time::Duration) -> SweeperHandle {
        let store = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "Expired sessions swept"),
                    Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
                }
            }
        });

        SweeperHandle(handle)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Background sweeper; aborted on drop
#[derive(Debug)]
pub struct SweeperHandle(JoinHandle<()>);

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(backend: Arc<MemorySessionBackend>, ttl: Duration) -> SessionStore {
        SessionStore::new(backend, ttl, std::time::Duration::from_secs(1))
    }

    fn store() -> SessionStore {
        SessionStore::memory(&AuthConfig::default())
    }

    /// Backend whose every operation fails like an unreachable database
    struct DownBackend;

    #[async_trait]
    impl SessionBackend for DownBackend {
        async fn insert(&self, _: &SessionToken, _: SessionRecord) -> Result<(), AuthError> {
            Err(AuthError::Persistence("connection refused".into()))
        }
        async fn load(&self, _: &SessionToken) -> Result<Option<SessionRecord>, AuthError> {
            Err(AuthError::Persistence("connection refused".into()))
        }
        async fn commit(
            &self,
            _: &SessionToken,
            _: &SessionChanges,
            _: DateTime<Utc>,
        ) -> Result<Option<SessionRecord>, AuthError> {
            Err(AuthError::Persistence("connection refused".into()))
        }
        async fn remove(&self, _: &SessionToken) -> Result<(), AuthError> {
            Err(AuthError::Persistence("connection refused".into()))
        }
        async fn purge_expired(&self, _: DateTime<Utc>) -> Result<usize, AuthError> {
            Err(AuthError::Persistence("connection refused".into()))
        }
    }

    #[test]
    fn test_token_shape() {
        let token = SessionToken::generate();
        assert_eq!(token.as_str().len(), TOKEN_BYTES * 2);
        assert_eq!(SessionToken::parse(token.as_str()), Some(token.clone()));
        assert_ne!(SessionToken::generate(), token);
    }

    #[test]
    fn test_token_parse_rejects_malformed() {
        let token = SessionToken::generate();

        assert!(SessionToken::parse("").is_none());
        assert!(SessionToken::parse(&token.as_str()[..TOKEN_BYTES]).is_none());
        assert!(SessionToken::parse(&token.as_str().to_uppercase()).is_none());
        assert!(SessionToken::parse(&format!("{}0", token.as_str())).is_none());
        assert!(SessionToken::parse(&"g".repeat(TOKEN_BYTES * 2)).is_none());
    }

    #[test]
    fn test_token_debug_redacted() {
        let token = SessionToken::generate();
        assert!(!format!("{:?}", token).contains(token.as_str()));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = store();

        let session = store.create().await.unwrap();
        let token = session.token().as_str().to_string();

        let mut fetched = store.get(&token).await.unwrap().unwrap();
        assert_eq!(fetched.username(), None);

        fetched.set(USERNAME_KEY, "bob");
        store.save(&mut fetched).await.unwrap();

        let fetched = store.get(&token).await.unwrap().unwrap();
        assert_eq!(fetched.username(), Some("bob"));

        store.destroy(fetched.token()).await.unwrap();
        assert!(store.get(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_not_visible_until_save() {
        let store = store();
        let session = store.create().await.unwrap();
        let token = session.token().as_str().to_string();

        let mut writer = store.get(&token).await.unwrap().unwrap();
        writer.set(USERNAME_KEY, "bob");
        assert_eq!(writer.get(USERNAME_KEY), Some("bob"));
        assert!(writer.is_dirty());

        let reader = store.get(&token).await.unwrap().unwrap();
        assert_eq!(reader.get(USERNAME_KEY), None);

        drop(writer);
        let reader = store.get(&token).await.unwrap().unwrap();
        assert!(!reader.is_authenticated());
    }

    #[tokio::test]
    async fn test_saves_merge_per_key() {
        let store = store();
        let session = store.create().await.unwrap();
        let token = session.token().as_str().to_string();

        let mut first = store.get(&token).await.unwrap().unwrap();
        let mut second = store.get(&token).await.unwrap().unwrap();
        first.set("theme", "dark");
        second.set(USERNAME_KEY, "bob");
        store.save(&mut first).await.unwrap();
        store.save(&mut second).await.unwrap();

        let merged = store.get(&token).await.unwrap().unwrap();
        assert_eq!(merged.get("theme"), Some("dark"));
        assert_eq!(merged.username(), Some("bob"));
    }

    #[tokio::test]
    async fn test_remove_attribute() {
        let store = store();
        let mut session = store.create().await.unwrap();
        session.set(USERNAME_KEY, "bob");
        store.save(&mut session).await.unwrap();

        session.remove(USERNAME_KEY);
        store.save(&mut session).await.unwrap();

        let fetched = store.get(session.token().as_str()).await.unwrap().unwrap();
        assert!(!fetched.is_authenticated());
    }

    #[tokio::test]
    async fn test_destroy_idempotent() {
        let store = store();
        let session = store.create().await.unwrap();

        store.destroy(session.token()).await.unwrap();
        store.destroy(session.token()).await.unwrap();
        store.destroy(&SessionToken::generate()).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_after_destroy_does_not_resurrect() {
        let store = store();
        let mut session = store.create().await.unwrap();
        store.destroy(session.token()).await.unwrap();

        session.set(USERNAME_KEY, "mallory");
        assert_eq!(store.save(&mut session).await, Err(AuthError::InvalidSession));
        assert!(store.get(session.token().as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_tokens() {
        let store = store();

        assert!(store.get("").await.unwrap().is_none());
        assert!(store.get("../../etc/passwd").await.unwrap().is_none());
        assert!(store
            .get(SessionToken::generate().as_str())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_no_prefix_matching() {
        let store = store();
        let session = store.create().await.unwrap();
        let token = session.token().as_str();

        let mut near = token[..TOKEN_BYTES * 2 - 1].to_string();
        near.push(if token.ends_with('0') { '1' } else { '0' });
        assert!(store.get(&near).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_invalid() {
        let backend = Arc::new(MemorySessionBackend::new());
        let store = store_with(backend.clone(), Duration::milliseconds(20));

        let session = store.create().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(store.get(session.token().as_str()).await.unwrap().is_none());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = Arc::new(MemorySessionBackend::new());
        let short = store_with(backend.clone(), Duration::milliseconds(20));
        let long = store_with(backend.clone(), Duration::hours(1));

        short.create().await.unwrap();
        short.create().await.unwrap();
        let kept = long.create().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(long.purge_expired().await.unwrap(), 2);
        assert_eq!(backend.len().await, 1);
        assert!(long.get(kept.token().as_str()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweeper_purges() {
        let backend = Arc::new(MemorySessionBackend::new());
        let store = store_with(backend.clone(), Duration::milliseconds(10));
        store.create().await.unwrap();

        let _sweeper = store.spawn_sweeper(std::time::Duration::from_millis(20));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces() {
        let store = SessionStore::new(
            Arc::new(DownBackend),
            Duration::hours(1),
            std::time::Duration::from_secs(1),
        );

        assert!(matches!(store.create().await, Err(AuthError::Persistence(_))));
        assert!(matches!(
            store.get(SessionToken::generate().as_str()).await,
            Err(AuthError::Persistence(_))
        ));

        let mut session = Session::from_record(
            SessionToken::generate(),
            SessionRecord {
                attributes: HashMap::new(),
                expires_at: Utc::now() + Duration::hours(1),
            },
        );
        session.set(USERNAME_KEY, "bob");
        assert!(matches!(
            store.save(&mut session).await,
            Err(AuthError::Persistence(_))
        ));
        assert!(session.is_dirty(), "failed save must keep pending changes uncommitted");
        assert!(!session.is_authenticated());

        assert!(matches!(
            store.destroy(session.token()).await,
            Err(AuthError::Persistence(_))
        ));
    }
}
