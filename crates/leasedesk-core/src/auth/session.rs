//! The active session and the facade-level auth state.

use chrono::{DateTime, Duration, Utc};

use crate::models::{LoginGrant, UserRecord};

/// The authenticated state granted by a login or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: UserRecord,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn start(grant: LoginGrant, now: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            user: grant.user,
            token: grant.token,
            issued_at: now,
            expires_at: now + lifetime,
        }
    }

    /// Swap in a refreshed token and restart the lifetime from `now`
    pub fn renew(&mut self, token: String, now: DateTime<Utc>, lifetime: Duration) {
        self.token = token;
        self.issued_at = now;
        self.expires_at = now + lifetime;
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn time_remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Facade-level auth state. `Active` and `Locked` never hold at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    Active { expires_at: DateTime<Utc> },
    Locked { until: DateTime<Utc> },
}

impl AuthState {
    pub fn is_active(&self) -> bool {
        matches!(self, AuthState::Active { .. })
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthState::LoggedOut => write!(f, "LOGGED_OUT"),
            AuthState::Active { .. } => write!(f, "ACTIVE"),
            AuthState::Locked { .. } => write!(f, "LOCKED"),
        }
    }
}
