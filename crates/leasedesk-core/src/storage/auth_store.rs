//! Typed write-through access to the persisted auth keys.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, warn};

use super::{KeyValueStore, MemoryStore, StoreError};
use crate::auth::{LockoutState, Session};
use crate::models::UserRecord;
use crate::utils::lock;

pub const KEY_TOKEN: &str = "auth.token";
pub const KEY_USER: &str = "auth.user";
pub const KEY_SESSION_EXPIRY: &str = "auth.sessionExpiry";
pub const KEY_FAILED_ATTEMPTS: &str = "auth.failedAttempts";
pub const KEY_LOCKOUT_UNTIL: &str = "auth.lockoutUntil";

const KEY_PROBE: &str = "auth.probe";

const AUTH_KEYS: [&str; 5] = [
    KEY_TOKEN,
    KEY_USER,
    KEY_SESSION_EXPIRY,
    KEY_FAILED_ATTEMPTS,
    KEY_LOCKOUT_UNTIL,
];

/// Session and lockout persistence over a `KeyValueStore`.
///
/// The first failed write switches the store into degraded mode: the known
/// auth keys are mirrored into a `MemoryStore` and every later read and
/// write goes there for the rest of the process lifetime. Login and logout
/// keep working; the state just will not survive a restart.
///
/// Keys deleted while degraded are also queued for removal from the
/// primary, retried on every later write and when the store is dropped, so
/// a session ended in memory cannot come back after a restart.
pub struct AuthStore {
    primary: Arc<dyn KeyValueStore>,
    fallback: MemoryStore,
    degraded: AtomicBool,
    stale_keys: Mutex<BTreeSet<String>>,
}

impl AuthStore {
    pub fn new(primary: Arc<dyn KeyValueStore>) -> Self {
        Self {
            primary,
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
            stale_keys: Mutex::new(BTreeSet::new()),
        }
    }

    /// Store with no durable backing at all
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Probe the primary store with a throwaway write
    pub fn verify(&self) -> Result<(), StoreError> {
        if self.is_degraded() {
            return Err(StoreError::Unavailable(
                "running in memory after an earlier write failure".to_string(),
            ));
        }
        self.primary.put(KEY_PROBE, "1")?;
        self.primary.remove(KEY_PROBE)
    }

    // ===== Session =====

    /// Load the persisted session. Partial or unparseable entries yield `None`.
    pub fn load_session(&self, session_duration: Duration) -> Option<Session> {
        let token = self.read(KEY_TOKEN);
        let user = self.read(KEY_USER);
        let expiry = self.read(KEY_SESSION_EXPIRY);

        let (token, user, expiry) = match (token, user, expiry) {
            (Some(t), Some(u), Some(e)) => (t, u, e),
            (None, None, None) => return None,
            _ => {
                warn!("Persisted session is incomplete, ignoring it");
                return None;
            }
        };

        let user: UserRecord = match serde_json::from_str(&user) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Failed to parse persisted user record");
                return None;
            }
        };

        let expires_at = parse_instant(KEY_SESSION_EXPIRY, &expiry)?;

        Some(Session {
            user,
            token,
            issued_at: expires_at - session_duration,
            expires_at,
        })
    }

    pub fn save_session(&self, session: &Session) {
        let user = match serde_json::to_string(&session.user) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize user record");
                return;
            }
        };
        self.write(KEY_TOKEN, &session.token);
        self.write(KEY_USER, &user);
        self.write(KEY_SESSION_EXPIRY, &session.expires_at.to_rfc3339());
    }

    pub fn clear_session(&self) {
        self.delete(KEY_TOKEN);
        self.delete(KEY_USER);
        self.delete(KEY_SESSION_EXPIRY);
    }

    // ===== Lockout =====

    /// Load the persisted lockout state. `None` when nothing usable is stored.
    pub fn load_lockout(&self) -> Option<LockoutState> {
        let failures = self.read(KEY_FAILED_ATTEMPTS);
        let until = self.read(KEY_LOCKOUT_UNTIL);
        if failures.is_none() && until.is_none() {
            return None;
        }

        let consecutive_failures = match failures.as_deref().map(str::trim) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, value = raw, "Invalid persisted failed attempt count");
                    return None;
                }
            },
            None => 0,
        };

        let locked_until = match until {
            Some(raw) => Some(parse_instant(KEY_LOCKOUT_UNTIL, &raw)?),
            None => None,
        };

        Some(LockoutState {
            consecutive_failures,
            locked_until,
        })
    }

    pub fn save_lockout(&self, state: &LockoutState) {
        self.write(KEY_FAILED_ATTEMPTS, &state.consecutive_failures.to_string());
        match state.locked_until {
            Some(until) => self.write(KEY_LOCKOUT_UNTIL, &until.to_rfc3339()),
            None => self.delete(KEY_LOCKOUT_UNTIL),
        }
    }

    // ===== Raw access with fallback =====

    fn read(&self, key: &str) -> Option<String> {
        let result = if self.is_degraded() {
            self.fallback.get(key)
        } else {
            self.primary.get(key)
        };
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read from store");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if !self.is_degraded() {
            match self.primary.put(key, value) {
                Ok(()) => return,
                Err(e) => self.degrade(&e),
            }
        }
        // MemoryStore never fails
        let _ = self.fallback.put(key, value);
        self.purge_stale_keys();
    }

    fn delete(&self, key: &str) {
        if !self.is_degraded() {
            match self.primary.remove(key) {
                Ok(()) => return,
                Err(e) => self.degrade(&e),
            }
        }
        let _ = self.fallback.remove(key);
        lock(&self.stale_keys).insert(key.to_string());
        self.purge_stale_keys();
    }

    /// Retry removing keys from the primary that were deleted in memory
    fn purge_stale_keys(&self) {
        let mut stale = lock(&self.stale_keys);
        stale.retain(|key| match self.primary.remove(key) {
            Ok(()) => {
                debug!(key = key.as_str(), "Removed stale key from durable store");
                false
            }
            Err(_) => true,
        });
    }

    fn degrade(&self, cause: &StoreError) {
        if self.degraded.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            error = %cause,
            "Auth storage unavailable; continuing in memory, state will not survive a restart"
        );
        for key in AUTH_KEYS {
            if let Ok(Some(value)) = self.primary.get(key) {
                let _ = self.fallback.put(key, &value);
            }
        }
        debug!(keys = self.fallback.len(), "Mirrored auth keys into memory");
    }
}

impl Drop for AuthStore {
    fn drop(&mut self) {
        self.purge_stale_keys();
        let stale = lock(&self.stale_keys);
        if !stale.is_empty() {
            error!(keys = stale.len(), "Durable store still holds keys that were cleared in memory");
        }
    }
}

fn parse_instant(key: &str, raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            warn!(key, error = %e, "Invalid persisted timestamp");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Store whose writes start failing once `fail_writes` is set.
    #[derive(Default)]
    pub(crate) struct FlakyStore {
        pub inner: MemoryStore,
        pub fail_writes: AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("quota exceeded".to_string()));
            }
            self.inner.put(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("access denied".to_string()));
            }
            self.inner.remove(key)
        }
    }

    fn user() -> UserRecord {
        UserRecord {
            identifier: "mgr@example.com".to_string(),
            display_name: "Dana Ruiz".to_string(),
            role: "manager".to_string(),
        }
    }

    fn session(expires_at: DateTime<Utc>) -> Session {
        Session {
            user: user(),
            token: "tok-1".to_string(),
            issued_at: expires_at - Duration::hours(8),
            expires_at,
        }
    }

    #[test]
    fn test_session_roundtrip_uses_documented_keys() {
        let backing = Arc::new(MemoryStore::new());
        let store = AuthStore::new(backing.clone());
        let expires_at = Utc::now() + Duration::hours(8);

        store.save_session(&session(expires_at));

        assert_eq!(backing.get(KEY_TOKEN).unwrap().as_deref(), Some("tok-1"));
        assert!(backing.get(KEY_USER).unwrap().unwrap().contains("displayName"));
        let loaded = store.load_session(Duration::hours(8)).unwrap();
        assert_eq!(loaded.user, user());
        assert_eq!(loaded.expires_at.timestamp(), expires_at.timestamp());
        assert_eq!(loaded.issued_at, loaded.expires_at - Duration::hours(8));

        store.clear_session();
        assert!(backing.is_empty());
        assert!(store.load_session(Duration::hours(8)).is_none());
    }

    #[test]
    fn test_incomplete_session_is_ignored() {
        let backing = Arc::new(MemoryStore::new());
        backing.put(KEY_TOKEN, "orphan").unwrap();
        let store = AuthStore::new(backing);
        assert!(store.load_session(Duration::hours(8)).is_none());
    }

    #[test]
    fn test_corrupt_expiry_is_ignored() {
        let backing = Arc::new(MemoryStore::new());
        backing.put(KEY_TOKEN, "tok").unwrap();
        backing.put(KEY_USER, &serde_json::to_string(&user()).unwrap()).unwrap();
        backing.put(KEY_SESSION_EXPIRY, "tomorrow-ish").unwrap();
        let store = AuthStore::new(backing);
        assert!(store.load_session(Duration::hours(8)).is_none());
    }

    #[test]
    fn test_lockout_keys_written_and_removed() {
        let backing = Arc::new(MemoryStore::new());
        let store = AuthStore::new(backing.clone());
        let until = Utc::now() + Duration::minutes(15);

        store.save_lockout(&LockoutState {
            consecutive_failures: 5,
            locked_until: Some(until),
        });
        assert_eq!(backing.get(KEY_FAILED_ATTEMPTS).unwrap().as_deref(), Some("5"));
        assert!(backing.get(KEY_LOCKOUT_UNTIL).unwrap().is_some());

        let loaded = store.load_lockout().unwrap();
        assert_eq!(loaded.consecutive_failures, 5);
        assert_eq!(loaded.locked_until.map(|t| t.timestamp()), Some(until.timestamp()));

        store.save_lockout(&LockoutState::default());
        assert_eq!(backing.get(KEY_FAILED_ATTEMPTS).unwrap().as_deref(), Some("0"));
        assert_eq!(backing.get(KEY_LOCKOUT_UNTIL).unwrap(), None);
    }

    #[test]
    fn test_invalid_failed_attempts_is_ignored() {
        let backing = Arc::new(MemoryStore::new());
        backing.put(KEY_FAILED_ATTEMPTS, "many").unwrap();
        let store = AuthStore::new(backing);
        assert!(store.load_lockout().is_none());
    }

    #[test]
    fn test_write_failure_degrades_to_memory() {
        let backing = Arc::new(FlakyStore::default());
        let store = AuthStore::new(backing.clone());

        store.save_lockout(&LockoutState {
            consecutive_failures: 2,
            locked_until: None,
        });
        assert!(!store.is_degraded());
        assert!(store.verify().is_ok());

        backing.fail_writes.store(true, Ordering::SeqCst);
        store.save_session(&session(Utc::now() + Duration::hours(8)));

        assert!(store.is_degraded());
        assert!(matches!(store.verify(), Err(StoreError::Unavailable(_))));
        // Earlier durable state was mirrored, the new session lives in memory
        assert_eq!(store.load_lockout().unwrap().consecutive_failures, 2);
        assert!(store.load_session(Duration::hours(8)).is_some());
        assert_eq!(backing.inner.get(KEY_TOKEN).unwrap(), None);

        store.clear_session();
        assert!(store.load_session(Duration::hours(8)).is_none());
    }

    #[test]
    fn test_clear_while_degraded_removes_durable_keys_once_writable() {
        let backing = Arc::new(FlakyStore::default());
        let store = AuthStore::new(backing.clone());
        store.save_session(&session(Utc::now() + Duration::hours(8)));

        backing.fail_writes.store(true, Ordering::SeqCst);
        store.clear_session();
        assert!(store.is_degraded());
        assert!(store.load_session(Duration::hours(8)).is_none());
        assert!(backing.inner.get(KEY_TOKEN).unwrap().is_some());

        // Next write retries the removal while still running in memory
        backing.fail_writes.store(false, Ordering::SeqCst);
        store.save_lockout(&LockoutState::default());
        assert!(store.is_degraded());
        assert_eq!(backing.inner.get(KEY_TOKEN).unwrap(), None);
        assert_eq!(backing.inner.get(KEY_USER).unwrap(), None);
        assert_eq!(backing.inner.get(KEY_SESSION_EXPIRY).unwrap(), None);
    }

    #[test]
    fn test_drop_retries_stale_key_removal() {
        let backing = Arc::new(FlakyStore::default());
        let store = AuthStore::new(backing.clone());
        store.save_session(&session(Utc::now() + Duration::hours(8)));

        backing.fail_writes.store(true, Ordering::SeqCst);
        store.clear_session();
        backing.fail_writes.store(false, Ordering::SeqCst);
        drop(store);

        let reopened = AuthStore::new(backing);
        assert!(reopened.load_session(Duration::hours(8)).is_none());
    }
}
