use chrono::{DateTime, Local, Utc};
use thiserror::Error;

use crate::storage::StoreError;

/// Errors the auth layer surfaces to the rest of the client.
///
/// Raw network errors never cross this boundary; they are logged and
/// folded into one of these variants.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials ({attempts_remaining} attempts remaining)")]
    InvalidCredentials { attempts_remaining: u32 },

    #[error("Account locked until {locked_until}")]
    AccountLocked { locked_until: DateTime<Utc> },

    #[error("Session refresh failed: {0}")]
    RefreshFailure(String),

    #[error("Auth storage unavailable: {0}")]
    PersistenceUnavailable(#[from] StoreError),

    #[error("Not signed in")]
    NotAuthenticated,
}

impl AuthError {
    /// Message suitable for showing on a login form
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials { attempts_remaining: 1 } => {
                "Invalid username or password. 1 attempt remaining before sign-in is locked.".to_string()
            }
            AuthError::InvalidCredentials { attempts_remaining } => {
                format!("Invalid username or password. {} attempts remaining.", attempts_remaining)
            }
            AuthError::AccountLocked { locked_until } => format!(
                "Too many failed attempts. Try again after {}.",
                locked_until.with_timezone(&Local).format("%H:%M")
            ),
            AuthError::RefreshFailure(_) => "Your session could not be extended. Please sign in again.".to_string(),
            AuthError::PersistenceUnavailable(_) => {
                "Sign-in will not be remembered after this window closes.".to_string()
            }
            AuthError::NotAuthenticated => "Please sign in.".to_string(),
        }
    }
}
