//! Login attempt evaluation with a consecutive-failure lockout.
//!
//! Every transition of `LockoutState` is written through `AuthStore` before
//! the attempt returns, so a restart in the middle of a lockout keeps the
//! lock. Lock expiry is evaluated lazily against the clock whenever the
//! state is read; there is no timer.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::AuthError;
use crate::api::{ApiError, AuthApi};
use crate::config::AuthPolicy;
use crate::models::{Credentials, LoginGrant};
use crate::storage::AuthStore;
use crate::time::Clock;
use crate::utils::lock;

/// Failure counter and lockout window.
///
/// `locked_until` is set exactly when `consecutive_failures` has reached
/// the policy maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockoutState {
    pub consecutive_failures: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| until > now).unwrap_or(false)
    }

    /// True when a lock exists but its window has passed
    pub fn has_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| until <= now).unwrap_or(false)
    }

    pub fn is_consistent(&self, max_attempts: u32) -> bool {
        self.locked_until.is_some() == (self.consecutive_failures >= max_attempts)
    }

    pub fn attempts_remaining(&self, max_attempts: u32) -> u32 {
        max_attempts.saturating_sub(self.consecutive_failures)
    }
}

pub struct CredentialGate {
    api: Arc<dyn AuthApi>,
    store: Arc<AuthStore>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    lockout_duration: Duration,
    request_timeout: std::time::Duration,
    state: Mutex<LockoutState>,
}

impl CredentialGate {
    /// Create a gate, rehydrating any persisted lockout state
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<AuthStore>,
        clock: Arc<dyn Clock>,
        policy: &AuthPolicy,
    ) -> Self {
        let max_attempts = policy.max_attempts.max(1);
        let state = match store.load_lockout() {
            Some(state) if state.is_consistent(max_attempts) => {
                debug!(
                    failures = state.consecutive_failures,
                    locked_until = ?state.locked_until,
                    "Lockout state restored"
                );
                LockoutState {
                    consecutive_failures: state.consecutive_failures.min(max_attempts),
                    ..state
                }
            }
            Some(state) => {
                warn!(?state, "Persisted lockout state is inconsistent, resetting it");
                let state = LockoutState::default();
                store.save_lockout(&state);
                state
            }
            None => LockoutState::default(),
        };

        Self {
            api,
            store,
            clock,
            max_attempts,
            lockout_duration: policy.lockout_duration,
            request_timeout: policy.request_timeout,
            state: Mutex::new(state),
        }
    }

    /// Evaluate a login attempt.
    ///
    /// While locked the remote API is not contacted. Any remote failure,
    /// including transport errors and timeouts, counts as a failed attempt.
    pub async fn attempt(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError> {
        let now = self.clock.now();
        let current = self.evaluate(now);
        if let Some(locked_until) = current.locked_until {
            debug!(%locked_until, "Login rejected locally, sign-in is locked");
            return Err(AuthError::AccountLocked { locked_until });
        }

        if credentials.is_blank() {
            return Err(AuthError::InvalidCredentials {
                attempts_remaining: current.attempts_remaining(self.max_attempts),
            });
        }

        let result = match tokio::time::timeout(self.request_timeout, self.api.login(credentials)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.request_timeout.as_secs())),
        };

        match result {
            Ok(grant) => {
                self.record_success();
                info!(identifier = %credentials.identifier, "Login accepted");
                Ok(grant)
            }
            Err(e) if e.is_rejection() => {
                warn!(identifier = %credentials.identifier, error = %e, "Login rejected by server");
                Err(self.record_failure(self.clock.now()))
            }
            Err(e) => {
                // Transport failures and timeouts count the same as a rejection
                warn!(identifier = %credentials.identifier, error = %e, "Login request failed");
                Err(self.record_failure(self.clock.now()))
            }
        }
    }

    /// Current state with any lapsed lock already reset
    pub fn state(&self) -> LockoutState {
        self.evaluate(self.clock.now())
    }

    pub fn failed_attempts(&self) -> u32 {
        self.state().consecutive_failures
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked_until.is_some()
    }

    /// When the current lock ends, if sign-in is locked
    pub fn lockout_time(&self) -> Option<DateTime<Utc>> {
        self.state().locked_until
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.state().attempts_remaining(self.max_attempts)
    }

    fn evaluate(&self, now: DateTime<Utc>) -> LockoutState {
        let mut state = lock(&self.state);
        if state.has_lapsed_at(now) {
            info!("Lockout window elapsed, sign-in unlocked");
            *state = LockoutState::default();
            self.store.save_lockout(&state);
        }
        *state
    }

    fn record_success(&self) {
        let mut state = lock(&self.state);
        *state = LockoutState::default();
        self.store.save_lockout(&state);
    }

    fn record_failure(&self, now: DateTime<Utc>) -> AuthError {
        let mut state = lock(&self.state);
        state.consecutive_failures = (state.consecutive_failures + 1).min(self.max_attempts);

        if state.consecutive_failures >= self.max_attempts {
            // A concurrent failure may already have started the window
            let locked_until = state.locked_until.unwrap_or(now + self.lockout_duration);
            state.locked_until = Some(locked_until);
            self.store.save_lockout(&state);
            warn!(
                failures = state.consecutive_failures,
                %locked_until,
                "Too many failed logins, sign-in locked"
            );
            AuthError::AccountLocked { locked_until }
        } else {
            self.store.save_lockout(&state);
            AuthError::InvalidCredentials {
                attempts_remaining: state.attempts_remaining(self.max_attempts),
            }
        }
    }
}
