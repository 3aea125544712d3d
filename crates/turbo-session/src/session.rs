//! Session management on top of the key-value store.

use crate::{KvStore, SessionError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// Maximum retry attempts for optimistic concurrency control.
const MAX_UPDATE_RETRIES: u32 = 3;

/// Default session lifetime: 7 days.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// A unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new session ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new cryptographically secure session ID.
    pub fn generate() -> Self {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use rand::Rng;

        let bytes: [u8; 18] = rand::thread_rng().gen();
        Self(format!("sess_{}", URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Get the session ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session lifetime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds of inactivity after which a session reads as absent.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Session data stored in the key-value store.
///
/// Generic over the user data type `T`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData<T> {
    /// The session ID.
    pub id: SessionId,
    /// User-defined session data.
    pub data: T,
    /// Version for optimistic concurrency control.
    pub version: u64,
    /// When the session was created (Unix timestamp).
    pub created_at: u64,
    /// When the session was last written (Unix timestamp).
    pub last_accessed: u64,
    /// When the session stops being readable (Unix timestamp).
    pub expires_at: u64,
}

impl<T> SessionData<T> {
    /// Check if the session has outlived its TTL.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Session manager for per-visit state.
///
/// Clones share the same underlying store.
///
/// # Example
///
/// ```rust,ignore
/// use turbo_session::{Session, SessionId};
///
/// let sessions = Session::<Visit>::in_memory();
/// let id = SessionId::generate();
///
/// sessions.update(&id, |visit| {
///     visit.pages_seen += 1;
///     Ok(())
/// })?;
/// ```
pub struct Session<T> {
    store: Arc<KvStore>,
    config: SessionConfig,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("config", &self.config).finish()
    }
}

impl<T> Session<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    /// Create a session manager over a shared store.
    pub fn new(store: Arc<KvStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config,
            _phantom: PhantomData,
        }
    }

    /// Create a session manager over a fresh private store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(KvStore::new()), SessionConfig::default())
    }

    /// Get session data, or create a new session if it doesn't exist.
    pub fn get_or_create(&self, id: &SessionId) -> Result<T, SessionError> {
        match self.get(id)? {
            Some(data) => Ok(data),
            None => self
                .update(id, |_| Ok::<_, SessionError>(()))
                .map(|(data, ())| data),
        }
    }

    /// Get session data if it exists and has not expired.
    pub fn get(&self, id: &SessionId) -> Result<Option<T>, SessionError> {
        Ok(self.get_versioned(id)?.map(|s| s.data))
    }

    /// Get full session data including version.
    pub fn get_versioned(&self, id: &SessionId) -> Result<Option<SessionData<T>>, SessionError> {
        Ok(self
            .load(id)?
            .map(|(data, _)| data)
            .filter(|data| !data.is_expired(now_secs())))
    }

    /// Set session data (unconditional write).
    pub fn set(&self, id: &SessionId, data: &T) -> Result<(), SessionError> {
        let data = data.clone();
        self.update(id, move |current| {
            *current = data.clone();
            Ok::<_, SessionError>(())
        })
        .map(|_| ())
    }

    /// Delete a session.
    pub fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        self.store.delete(&self.session_key(id))
    }

    /// Check if a live session exists.
    pub fn exists(&self, id: &SessionId) -> Result<bool, SessionError> {
        Ok(self.get_versioned(id)?.is_some())
    }

    /// Delete every session past its expiry. Returns how many were removed.
    ///
    /// A session rewritten while the sweep runs is left alone.
    pub fn purge_expired(&self) -> Result<usize, SessionError> {
        let now = now_secs();
        let prefix = crate::store_key!("session", "");
        let mut purged = 0;
        for key in self.store.keys()? {
            if !key.starts_with(&prefix) {
                continue;
            }
            let Some((expiry, revision)) = self.store.get_with_revision::<Expiry>(&key)? else {
                continue;
            };
            if now >= expiry.expires_at && self.store.delete_if_revision(&key, revision)? {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::debug!(purged, "expired sessions purged");
        }
        Ok(purged)
    }

    /// Update session data with a closure, using optimistic concurrency control.
    ///
    /// The closure receives the current data (default data for a new or
    /// expired session) and may fail with any error that a `SessionError`
    /// converts into, which aborts the update without writing.
    /// The write is a compare-and-set on the store revision; if another writer
    /// got in first, the closure is re-run on fresh data, up to
    /// `MAX_UPDATE_RETRIES` times.
    ///
    /// # Returns
    /// - `Ok((T, R))` - The written data and the closure's result
    /// - `Err(SessionError::ConcurrentModification)` - If all retries failed
    pub fn update<F, R, E>(&self, id: &SessionId, mut f: F) -> Result<(T, R), E>
    where
        F: FnMut(&mut T) -> Result<R, E>,
        E: From<SessionError>,
    {
        let key = self.session_key(id);

        for attempt in 0..MAX_UPDATE_RETRIES {
            let now = now_secs();
            let current = self.load(id)?;

            let (mut data, version, created_at, revision) = match current {
                Some((session_data, revision)) if !session_data.is_expired(now) => (
                    session_data.data,
                    session_data.version,
                    session_data.created_at,
                    Some(revision),
                ),
                // expired sessions start over but still CAS against the old revision
                Some((_, revision)) => (T::default(), 0, now, Some(revision)),
                None => (T::default(), 0, now, None),
            };

            let result = f(&mut data)?;

            let session_data = SessionData {
                id: id.clone(),
                data: data.clone(),
                version: version + 1,
                created_at,
                last_accessed: now,
                expires_at: now.saturating_add(self.config.ttl_secs),
            };

            if self.store.compare_and_set(&key, revision, &session_data)? {
                return Ok((data, result));
            }

            tracing::debug!(session = %id, attempt, "session write raced, retrying");
        }

        Err(SessionError::ConcurrentModification(format!(
            "session {id}: max retries exceeded"
        ))
        .into())
    }

    fn load(&self, id: &SessionId) -> Result<Option<(SessionData<T>, u64)>, SessionError> {
        self.store.get_with_revision(&self.session_key(id))
    }

    fn session_key(&self, id: &SessionId) -> String {
        crate::store_key!("session", id)
    }
}

/// The part of a stored session the expiry sweep needs.
#[derive(Deserialize)]
struct Expiry {
    expires_at: u64,
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Visit {
        pages: u32,
    }

    #[test]
    fn test_session_id_generate_format() {
        let id = SessionId::generate();
        let s = id.as_str();

        assert!(s.starts_with("sess_"));
        // 18 bytes base64 = 24 chars, plus "sess_"
        assert_eq!(s.len(), 29);
    }

    #[test]
    fn test_session_id_generate_uniqueness() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_session_id_serialization() {
        let id = SessionId::new("serialize-me");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""serialize-me""#);
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_get_does_not_create() {
        let sessions = Session::<Visit>::in_memory();
        let id = SessionId::new("s1");
        assert!(sessions.get(&id).unwrap().is_none());
        assert!(!sessions.exists(&id).unwrap());
    }

    #[test]
    fn test_get_or_create_then_update() {
        let sessions = Session::<Visit>::in_memory();
        let id = SessionId::new("s1");
        assert_eq!(sessions.get_or_create(&id).unwrap(), Visit::default());

        let (visit, previous) = sessions
            .update(&id, |v| {
                let before = v.pages;
                v.pages += 2;
                Ok::<_, SessionError>(before)
            })
            .unwrap();
        assert_eq!(previous, 0);
        assert_eq!(visit.pages, 2);
        assert_eq!(sessions.get_versioned(&id).unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_failed_closure_writes_nothing() {
        let sessions = Session::<Visit>::in_memory();
        let id = SessionId::new("s1");
        let result = sessions.update(&id, |v| {
            v.pages = 9;
            Err::<(), _>(SessionError::StoreError("boom".into()))
        });
        assert!(result.is_err());
        assert!(sessions.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_zero_ttl_session_reads_as_absent() {
        let sessions = Session::<Visit>::new(
            Arc::new(KvStore::new()),
            SessionConfig { ttl_secs: 0 },
        );
        let id = SessionId::new("s1");
        sessions.set(&id, &Visit { pages: 1 }).unwrap();
        assert!(sessions.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_purge_expired_removes_only_expired() {
        let store = Arc::new(KvStore::new());
        let expired = Session::<Visit>::new(Arc::clone(&store), SessionConfig { ttl_secs: 0 });
        let live = Session::<Visit>::new(Arc::clone(&store), SessionConfig::default());
        for i in 0..5 {
            expired.set(&SessionId::new(format!("old{i}")), &Visit { pages: 1 }).unwrap();
        }
        live.set(&SessionId::new("fresh"), &Visit { pages: 1 }).unwrap();
        store.set("other:key", &1).unwrap();

        assert_eq!(live.purge_expired().unwrap(), 5);
        assert_eq!(
            store.keys().unwrap(),
            vec!["other:key".to_string(), "session:fresh".to_string()]
        );
        assert_eq!(live.purge_expired().unwrap(), 0);
    }

    #[test]
    fn test_delete() {
        let sessions = Session::<Visit>::in_memory();
        let id = SessionId::new("s1");
        sessions.set(&id, &Visit { pages: 1 }).unwrap();
        sessions.delete(&id).unwrap();
        assert!(sessions.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_writes() {
        let sessions = Session::<Visit>::in_memory();
        let id = SessionId::new("shared");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sessions = sessions.clone();
                let id = id.clone();
                thread::spawn(move || {
                    let mut applied = 0;
                    for _ in 0..50 {
                        let result = sessions.update(&id, |v| {
                            v.pages += 1;
                            Ok::<_, SessionError>(())
                        });
                        if result.is_ok() {
                            applied += 1;
                        }
                    }
                    applied
                })
            })
            .collect();

        let applied: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(sessions.get(&id).unwrap().unwrap().pages, applied);
    }
}
