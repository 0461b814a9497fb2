//! The single entry point the rest of the client uses for authentication.
//!
//! `AuthFacade` composes the credential gate, the session clock and the
//! auth store. It is a cheap-to-clone handle; every clone shares the same
//! state. The clock's tick task only holds a weak reference, so dropping
//! the last handle tears everything down.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::{AuthError, AuthState, ClockSignal, CredentialGate, SessionClock, Session};
use crate::api::{ApiClient, ApiError, AuthApi};
use crate::config::{AuthPolicy, Config};
use crate::models::{Credentials, UserRecord};
use crate::storage::{AuthStore, FileStore, MemoryStore};
use crate::time::{Clock, SystemClock};
use crate::utils::lock;

#[derive(Clone)]
pub struct AuthFacade {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    store: Arc<AuthStore>,
    clock: Arc<dyn Clock>,
    policy: AuthPolicy,
    gate: CredentialGate,
    session_clock: SessionClock,
    session: Mutex<Option<Session>>,
    /// Bumped whenever a session begins or ends; late refresh results
    /// carrying an older value are discarded.
    generation: AtomicU64,
}

impl AuthFacade {
    /// Build the facade and rehydrate persisted state.
    ///
    /// A persisted session that is still valid resumes and restarts the
    /// session clock; one that has already expired is cleaned up. Must be
    /// called from within a Tokio runtime.
    pub fn open(
        api: Arc<dyn AuthApi>,
        store: Arc<AuthStore>,
        clock: Arc<dyn Clock>,
        policy: AuthPolicy,
    ) -> Self {
        let gate = CredentialGate::new(api.clone(), store.clone(), clock.clone(), &policy);
        let session_clock = SessionClock::new(clock.clone(), &policy);

        let facade = Self {
            inner: Arc::new(Inner {
                api,
                store,
                clock,
                policy,
                gate,
                session_clock,
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        };
        facade.rehydrate();
        facade
    }

    /// Wire up the HTTP client and file store described by `config`.
    ///
    /// If the store file cannot be opened the facade runs in memory only.
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = config.policy();
        let api = ApiClient::with_timeout(config.api_base_url(), policy.request_timeout)?;

        let store = match Config::data_dir().and_then(|dir| Ok(FileStore::open_in(&dir)?)) {
            Ok(file) => {
                debug!(path = %file.path().display(), "Using file-backed auth store");
                AuthStore::new(Arc::new(file))
            }
            Err(e) => {
                warn!(error = %e, "Auth store unavailable, sign-in will not survive a restart");
                AuthStore::new(Arc::new(MemoryStore::new()))
            }
        };

        Ok(Self::open(
            Arc::new(api),
            Arc::new(store),
            Arc::new(SystemClock),
            policy,
        ))
    }

    fn rehydrate(&self) {
        let inner = &self.inner;
        let now = inner.clock.now();

        match inner.store.load_session(inner.policy.session_duration) {
            Some(session) if !session.is_expired_at(now) => {
                info!(
                    identifier = %session.user.identifier,
                    expires_at = %session.expires_at,
                    "Resuming persisted session"
                );
                let expires_at = session.expires_at;
                {
                    let mut guard = lock(&inner.session);
                    inner.generation.fetch_add(1, Ordering::SeqCst);
                    *guard = Some(session);
                }
                self.start_clock(expires_at);
            }
            Some(session) => {
                info!(expires_at = %session.expires_at, "Persisted session already expired");
                self.logout();
            }
            None => {
                // Drop any partial leftovers
                inner.store.clear_session();
            }
        }
    }

    // =========================================================================
    // Mutating operations
    // =========================================================================

    /// Sign in. Lockout and credential errors propagate unchanged.
    ///
    /// Signing in again ends the current session before the attempt is
    /// evaluated, so a session never coexists with a lockout.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserRecord, AuthError> {
        let inner = &self.inner;
        let had_session = lock(&inner.session).is_some();
        if had_session {
            inner.end_session("new sign-in");
        }
        let grant = inner.gate.attempt(credentials).await?;

        inner.session_clock.stop();
        let session = Session::start(grant, inner.clock.now(), inner.policy.session_duration);
        let user = session.user.clone();
        let expires_at = session.expires_at;
        {
            let mut guard = lock(&inner.session);
            inner.generation.fetch_add(1, Ordering::SeqCst);
            inner.store.save_session(&session);
            *guard = Some(session);
        }
        self.start_clock(expires_at);

        info!(identifier = %user.identifier, %expires_at, "Session started");
        Ok(user)
    }

    /// Sign out. Safe to call when already signed out.
    pub fn logout(&self) {
        self.inner.end_session("logout");
    }

    /// Extend the session now, as the "extend session" action does.
    ///
    /// A failed refresh signs the user out. If a refresh is already in
    /// flight no second request is made and the current expiry is returned.
    pub async fn refresh_token(&self) -> Result<DateTime<Utc>, AuthError> {
        let inner = &self.inner;
        let now = inner.clock.now();

        let expires_at = match lock(&inner.session).as_ref() {
            Some(session) => session.expires_at,
            None => return Err(AuthError::NotAuthenticated),
        };
        if now >= expires_at {
            inner.end_session("session expired");
            return Err(AuthError::NotAuthenticated);
        }

        if !inner.session_clock.try_begin_refresh() {
            debug!("Refresh already in flight, not issuing another");
            return Ok(expires_at);
        }
        let generation = inner.generation.load(Ordering::SeqCst);
        inner.refresh(generation).await
    }

    /// Stop the session clock without touching session state
    pub fn shutdown(&self) {
        self.inner.session_clock.stop();
    }

    // =========================================================================
    // Read-only state
    // =========================================================================

    pub fn is_authenticated(&self) -> bool {
        let now = self.inner.clock.now();
        lock(&self.inner.session)
            .as_ref()
            .map(|session| !session.is_expired_at(now))
            .unwrap_or(false)
    }

    pub fn session_expiry(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.session).as_ref().map(|s| s.expires_at)
    }

    pub fn time_remaining(&self) -> Duration {
        self.inner.session_clock.time_remaining()
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        lock(&self.inner.session).as_ref().map(|s| s.user.clone())
    }

    /// Bearer token for API calls made by the rest of the client
    pub fn token(&self) -> Option<String> {
        if !self.is_authenticated() {
            return None;
        }
        lock(&self.inner.session).as_ref().map(|s| s.token.clone())
    }

    pub fn failed_attempts(&self) -> u32 {
        self.inner.gate.failed_attempts()
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.inner.gate.attempts_remaining()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.gate.is_locked()
    }

    pub fn lockout_time(&self) -> Option<DateTime<Utc>> {
        self.inner.gate.lockout_time()
    }

    pub fn state(&self) -> AuthState {
        let now = self.inner.clock.now();
        if let Some(session) = lock(&self.inner.session).as_ref() {
            if !session.is_expired_at(now) {
                return AuthState::Active {
                    expires_at: session.expires_at,
                };
            }
        }
        match self.inner.gate.lockout_time() {
            Some(until) => AuthState::Locked { until },
            None => AuthState::LoggedOut,
        }
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.inner.policy
    }

    pub fn persistence_degraded(&self) -> bool {
        self.inner.store.is_degraded()
    }

    /// Check the backing store up front
    pub fn check_persistence(&self) -> Result<(), AuthError> {
        Ok(self.inner.store.verify()?)
    }

    fn start_clock(&self, expires_at: DateTime<Utc>) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.session_clock.start(expires_at, move || match weak.upgrade() {
            Some(inner) => inner.on_tick(),
            None => ControlFlow::Break(()),
        });
    }

    #[cfg(test)]
    fn tick(&self) -> ControlFlow<()> {
        self.inner.on_tick()
    }
}

impl Inner {
    fn on_tick(self: &Arc<Self>) -> ControlFlow<()> {
        match self.session_clock.evaluate() {
            ClockSignal::Idle => ControlFlow::Continue(()),
            ClockSignal::Stopped => ControlFlow::Break(()),
            ClockSignal::Expired => {
                self.end_session("session expired");
                ControlFlow::Break(())
            }
            ClockSignal::RefreshDue => {
                debug!("Session close to expiry, refreshing token");
                let generation = self.generation.load(Ordering::SeqCst);
                let inner = Arc::clone(self);
                // Ticks keep running while the request is outstanding
                tokio::spawn(async move {
                    let _ = inner.refresh(generation).await;
                });
                ControlFlow::Continue(())
            }
        }
    }

    /// Run a refresh whose in-flight flag the caller already claimed.
    async fn refresh(&self, generation: u64) -> Result<DateTime<Utc>, AuthError> {
        let token = match lock(&self.session).as_ref() {
            Some(session) => session.token.clone(),
            None => return Err(AuthError::NotAuthenticated),
        };

        let result = match tokio::time::timeout(self.policy.request_timeout, self.api.refresh(&token)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.policy.request_timeout.as_secs())),
        };

        let mut guard = lock(&self.session);
        if self.generation.load(Ordering::SeqCst) != generation || guard.is_none() {
            debug!("Discarding refresh result for a session that already ended");
            return Err(AuthError::NotAuthenticated);
        }

        match result {
            Ok(new_token) => {
                let now = self.clock.now();
                let expires_at = match guard.as_mut() {
                    Some(session) => {
                        session.renew(new_token, now, self.policy.session_duration);
                        self.store.save_session(session);
                        session.expires_at
                    }
                    None => return Err(AuthError::NotAuthenticated),
                };
                drop(guard);

                self.session_clock.extend(expires_at);
                self.session_clock.end_refresh();
                info!(%expires_at, "Session refreshed");
                Ok(expires_at)
            }
            Err(e) => {
                drop(guard);
                warn!(error = %e, "Token refresh failed, signing out");
                self.end_session("refresh failed");
                Err(AuthError::RefreshFailure(e.to_string()))
            }
        }
    }

    /// Stop the clock, then clear memory and storage.
    fn end_session(&self, reason: &str) {
        self.session_clock.stop();

        let ended = {
            let mut guard = lock(&self.session);
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.store.clear_session();
            guard.take()
        };

        match ended {
            Some(session) => info!(identifier = %session.user.identifier, reason, "Session ended"),
            None => debug!(reason, "No active session to end"),
        }
    }
}
