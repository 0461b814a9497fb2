//! Remote auth API module.
//!
//! This module provides the `AuthApi` seam the auth layer calls for login
//! and token refresh, plus `ApiClient`, its HTTP implementation.
//!
//! The API issues opaque bearer tokens: `POST /auth/login` exchanges
//! credentials for a token and user record, `POST /auth/refresh` exchanges
//! the current token for a new one.

pub mod client;
pub mod error;

use async_trait::async_trait;

pub use client::ApiClient;
pub use error::ApiError;

use crate::models::{Credentials, LoginGrant};

/// Remote authentication endpoints.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token and user record
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError>;

    /// Exchange the current token for a fresh one
    async fn refresh(&self, token: &str) -> Result<String, ApiError>;
}
