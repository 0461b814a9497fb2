//! Authentication session lifecycle.
//!
//! This module provides:
//! - `CredentialGate`: login attempts with a consecutive-failure lockout
//! - `SessionClock`: expiry tracking and the periodic refresh/expiry tick
//! - `AuthFacade`: the single entry point the rest of the client holds
//! - `ExpiryWarningPresenter`: countdown and extend/logout actions
//!
//! Sessions last 8 hours, are refreshed once 30 minutes or fewer remain,
//! and five consecutive failed logins lock sign-in for 15 minutes. Both
//! session and lockout state are persisted through `storage::AuthStore`.

pub mod clock;
pub mod error;
pub mod facade;
pub mod gate;
pub mod session;
pub mod warning;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{ClockSignal, SessionClock};
pub use error::AuthError;
pub use facade::AuthFacade;
pub use gate::{CredentialGate, LockoutState};
pub use session::{AuthState, Session};
pub use warning::{ExpiryWarningPresenter, WarningView};
