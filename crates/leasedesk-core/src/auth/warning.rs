//! Session expiry warning.
//!
//! The presenter is polled by the front-end (once a second is plenty) and
//! reads `AuthFacade::time_remaining()`, the only expiry math the UI sees.
//! At or below the warning threshold it produces a countdown; its two
//! actions map onto `refresh_token()` and `logout()`.

use chrono::{DateTime, Duration, Utc};

use super::{AuthError, AuthFacade};
use crate::utils::format_countdown;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningView {
    /// Plenty of time left, show nothing
    Hidden,
    /// Expiry is near
    Countdown { remaining: Duration, label: String },
    /// No active session
    Expired,
}

impl WarningView {
    pub fn is_visible(&self) -> bool {
        !matches!(self, WarningView::Hidden)
    }

    pub fn message(&self) -> Option<String> {
        match self {
            WarningView::Hidden => None,
            WarningView::Countdown { label, .. } => Some(format!(
                "Your session expires in {}. Extend it or sign out.",
                label
            )),
            WarningView::Expired => Some("Your session has ended. Please sign in again.".to_string()),
        }
    }
}

pub struct ExpiryWarningPresenter {
    facade: AuthFacade,
    threshold: Duration,
}

impl ExpiryWarningPresenter {
    pub fn new(facade: AuthFacade) -> Self {
        let threshold = facade.policy().warning_threshold;
        Self { facade, threshold }
    }

    pub fn with_threshold(facade: AuthFacade, threshold: Duration) -> Self {
        Self { facade, threshold }
    }

    pub fn poll(&self) -> WarningView {
        if !self.facade.is_authenticated() {
            return WarningView::Expired;
        }
        let remaining = self.facade.time_remaining();
        if remaining <= self.threshold {
            WarningView::Countdown {
                remaining,
                label: format_countdown(remaining),
            }
        } else {
            WarningView::Hidden
        }
    }

    /// "Extend session" action
    pub async fn extend(&self) -> Result<DateTime<Utc>, AuthError> {
        self.facade.refresh_token().await
    }

    /// "Sign out" action
    pub fn logout(&self) {
        self.facade.logout();
    }
}
