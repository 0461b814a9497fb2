//! Test doubles for the remote auth API.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::{ApiError, AuthApi};
use crate::models::{Credentials, LoginGrant, UserRecord};
use crate::utils::lock;

pub(crate) const GOOD_SECRET: &str = "correct-horse";

/// Accepts `GOOD_SECRET`, rejects everything else with 401.
pub(crate) struct FakeAuthApi {
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub refresh_ok: AtomicBool,
    pub hang_login: AtomicBool,
    /// Signalled whenever a refresh call starts
    pub refresh_entered: Notify,
    /// When set, refresh calls wait on it before answering
    pub refresh_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeAuthApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            refresh_ok: AtomicBool::new(true),
            hang_login: AtomicBool::new(false),
            refresh_entered: Notify::new(),
            refresh_gate: Mutex::new(None),
        })
    }

    pub fn logins(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn fail_refresh(&self) {
        self.refresh_ok.store(false, Ordering::SeqCst);
    }

    /// Hold refresh calls until the returned gate is notified
    pub fn hold_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.refresh_gate) = Some(gate.clone());
        gate
    }
}

pub(crate) fn user(identifier: &str) -> UserRecord {
    UserRecord {
        identifier: identifier.to_string(),
        display_name: "Dana Ruiz".to_string(),
        role: "manager".to_string(),
    }
}

pub(crate) fn good(identifier: &str) -> Credentials {
    Credentials::new(identifier, GOOD_SECRET)
}

pub(crate) fn bad(identifier: &str) -> Credentials {
    Credentials::new(identifier, "wrong")
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError> {
        let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hang_login.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if credentials.secret == GOOD_SECRET {
            Ok(LoginGrant {
                user: user(&credentials.identifier),
                token: format!("tok-{}", n),
            })
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    async fn refresh(&self, _token: &str) -> Result<String, ApiError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_entered.notify_one();
        let gate = lock(&self.refresh_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.refresh_ok.load(Ordering::SeqCst) {
            Ok(format!("tok-r{}", n))
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}
