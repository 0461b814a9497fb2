//! Core library for leasedesk.
//!
//! This crate contains the authentication session lifecycle used by the
//! leasedesk front-ends:
//!
//! - `auth`: lockout policy, session clock, the `AuthFacade` entry point and
//!   the expiry warning presenter
//! - `api`: the remote auth API seam and its HTTP client
//! - `storage`: durable key-value persistence for session and lockout state
//! - `config`: file/environment configuration and timing policy

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;
pub mod time;
pub mod utils;

pub use auth::{AuthError, AuthFacade, AuthState, ExpiryWarningPresenter, WarningView};
pub use config::{AuthPolicy, Config};
pub use models::{Credentials, LoginGrant, UserRecord};
