//! Session capability.
//!
//! The pipeline never owns session storage. It talks to a [`SessionStore`]
//! (Redis, a database table, or the in-process [`MemorySessionStore`]) and
//! hands handlers a request-scoped [`Session`] view. Every store call may
//! block or fail independently of the request being served.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::RwLock;

/// Key/value state carried by one session.
pub type SessionValues = HashMap<String, String>;

/// Length of generated session tokens.
const TOKEN_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend failure: {0}")]
    Backend(String),
    #[error("no session attached to this request")]
    NotAttached,
}

/// Storage behind sessions, keyed by an opaque token.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Values for `token`, or `None` if it is unknown or expired.
    async fn load(&self, token: &str) -> Result<Option<SessionValues>, SessionError>;

    /// Create or replace the values for `token`, live for `ttl`.
    async fn save(&self, token: &str, values: &SessionValues, ttl: Duration) -> Result<(), SessionError>;

    async fn delete(&self, token: &str) -> Result<(), SessionError>;
}

/// Cookie and lifetime settings for [`EnableSession`](crate::middleware::EnableSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub lifetime: Duration,
    /// Adds the `Secure` attribute; enable whenever TLS terminates in front.
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_owned(),
            lifetime: Duration::from_secs(12 * 60 * 60),
            secure: false,
        }
    }
}

// ── Session handle ────────────────────────────────────────────────────────────

/// Request-scoped view of one session.
///
/// Clones share state: the middleware keeps one clone and inspects it after
/// the handler returns to decide whether anything has to be persisted.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

struct SessionState {
    token: Option<String>,
    values: SessionValues,
    modified: bool,
    destroyed: bool,
    /// Token abandoned by [`Session::renew`]; deleted at commit time.
    retired: Option<String>,
}

/// What the middleware must do once the handler is finished.
pub(crate) enum Outcome {
    Unchanged,
    Save { token: String, values: SessionValues, retired: Option<String> },
    Destroy { token: Option<String> },
}

impl Session {
    pub(crate) fn new(token: Option<String>, values: SessionValues) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                token,
                values,
                modified: false,
                destroyed: false,
                retired: None,
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.with_state(|s| s.values.get(key).cloned())
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.with_state(|s| {
            s.values.insert(key.into(), value.into());
            s.modified = true;
        });
    }

    pub fn remove(&self, key: &str) {
        self.pop(key);
    }

    /// Remove and return a value. The usual way to read a flash message.
    pub fn pop(&self, key: &str) -> Option<String> {
        self.with_state(|s| {
            let value = s.values.remove(key);
            if value.is_some() {
                s.modified = true;
            }
            value
        })
    }

    /// Keep the values but move them to a fresh token. Call on privilege
    /// changes such as login to defeat session fixation.
    pub fn renew(&self) {
        self.with_state(|s| {
            if let Some(old) = s.token.take() {
                s.retired.get_or_insert(old);
            }
            s.modified = true;
        });
    }

    /// Drop every value and expire the cookie.
    pub fn destroy(&self) {
        self.with_state(|s| {
            s.values.clear();
            s.destroyed = true;
        });
    }

    pub(crate) fn outcome(&self) -> Outcome {
        self.with_state(|s| {
            if s.destroyed {
                let token = s.token.take().or_else(|| s.retired.take());
                return Outcome::Destroy { token };
            }
            if !s.modified {
                return Outcome::Unchanged;
            }
            let token = s.token.get_or_insert_with(generate_token).clone();
            Outcome::Save { token, values: s.values.clone(), retired: s.retired.take() }
        })
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

// ── In-process store ──────────────────────────────────────────────────────────

/// A [`SessionStore`] kept in process memory. Sessions do not survive a
/// restart and are not shared between replicas.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

struct Entry {
    values: SessionValues,
    deadline: Instant,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Expired entries are already invisible to
    /// `load`; this only reclaims memory.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.deadline > now);
        before - entries.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, token: &str) -> Result<Option<SessionValues>, SessionError> {
        let entries = self.entries.read().await;
        Ok(entries.get(token)
            .filter(|e| e.deadline > Instant::now())
            .map(|e| e.values.clone()))
    }

    async fn save(&self, token: &str, values: &SessionValues, ttl: Duration) -> Result<(), SessionError> {
        let entry = Entry { values: values.clone(), deadline: Instant::now() + ttl };
        self.entries.write().await.insert(token.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        self.entries.write().await.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_session_needs_no_write() {
        let session = Session::new(Some("tok".into()), SessionValues::new());
        assert_eq!(session.get("flash"), None);
        assert!(matches!(session.outcome(), Outcome::Unchanged));
    }

    #[test]
    fn put_on_new_session_generates_token() {
        let session = Session::new(None, SessionValues::new());
        session.put("flash", "saved");
        match session.outcome() {
            Outcome::Save { token, values, retired } => {
                assert_eq!(token.len(), TOKEN_LEN);
                assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
                assert_eq!(values.get("flash").map(String::as_str), Some("saved"));
                assert!(retired.is_none());
            }
            _ => panic!("expected a save"),
        }
    }

    #[test]
    fn pop_returns_once_and_marks_modified() {
        let mut values = SessionValues::new();
        values.insert("flash".into(), "hello".into());
        let session = Session::new(Some("tok".into()), values);

        assert_eq!(session.pop("flash").as_deref(), Some("hello"));
        assert_eq!(session.pop("flash"), None);
        assert!(matches!(session.outcome(), Outcome::Save { ref token, .. } if token == "tok"));
    }

    #[test]
    fn renew_retires_the_old_token() {
        let session = Session::new(Some("old".into()), SessionValues::new());
        session.renew();
        session.put("user", "1");
        match session.outcome() {
            Outcome::Save { token, retired, .. } => {
                assert_ne!(token, "old");
                assert_eq!(retired.as_deref(), Some("old"));
            }
            _ => panic!("expected a save"),
        }
    }

    #[test]
    fn destroy_wins_over_modifications() {
        let session = Session::new(Some("tok".into()), SessionValues::new());
        session.put("user", "1");
        session.destroy();
        assert!(matches!(session.outcome(), Outcome::Destroy { token: Some(ref t) } if t == "tok"));
    }

    #[tokio::test]
    async fn memory_store_honours_ttl() {
        let store = MemorySessionStore::new();
        let mut values = SessionValues::new();
        values.insert("k".into(), "v".into());

        store.save("live", &values, Duration::from_secs(60)).await.unwrap();
        store.save("dead", &values, Duration::ZERO).await.unwrap();

        assert_eq!(store.load("live").await.unwrap(), Some(values));
        assert_eq!(store.load("dead").await.unwrap(), None);
        assert_eq!(store.purge_expired().await, 1);

        store.delete("live").await.unwrap();
        assert_eq!(store.load("live").await.unwrap(), None);
    }
}
