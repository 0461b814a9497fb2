//! API client for the rental administration auth endpoints.
//!
//! This module provides the `ApiClient` struct, the reqwest-backed
//! implementation of `AuthApi`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, AuthApi};
use crate::models::{Credentials, LoginGrant, UserRecord};

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    user: UserRecord,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
}

/// API client for the auth endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl ApiClient {
    /// Create a new API client with the default request timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.timeout_secs)
        } else {
            ApiError::NetworkError(e)
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ApiError> {
        let url = self.url("/auth/login");
        debug!(identifier = %credentials.identifier, "Sending login request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest {
                identifier: &credentials.identifier,
                secret: &credentials.secret,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = Self::check_response(response).await?;

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))?;

        Ok(LoginGrant {
            user: body.user,
            token: body.token,
        })
    }

    async fn refresh(&self, token: &str) -> Result<String, ApiError> {
        let url = self.url("/auth/refresh");
        debug!("Sending token refresh request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = Self::check_response(response).await?;

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse refresh response: {}", e)))?;

        if body.token.is_empty() {
            return Err(ApiError::InvalidResponse("Refresh returned an empty token".to_string()));
        }
        Ok(body.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("https://rentals.example.com/api/").unwrap();
        assert_eq!(client.base_url(), "https://rentals.example.com/api");
        assert_eq!(client.url("/auth/login"), "https://rentals.example.com/api/auth/login");
    }

    #[test]
    fn test_parse_login_response() {
        let json = r#"{"token":"eyJhbGciOi.abc","user":{"identifier":"mgr@example.com","displayName":"Dana Ruiz","role":"manager"}}"#;
        let resp: LoginResponse = serde_json::from_str(json).expect("Failed to parse login test JSON");
        assert_eq!(resp.token, "eyJhbGciOi.abc");
        assert_eq!(resp.user.display_name, "Dana Ruiz");
        assert_eq!(resp.user.role, "manager");
    }

    #[test]
    fn test_login_request_body() {
        let body = serde_json::to_value(LoginRequest {
            identifier: "mgr@example.com",
            secret: "pw",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"identifier": "mgr@example.com", "secret": "pw"}));
    }

    #[test]
    fn test_parse_refresh_response() {
        let resp: RefreshResponse = serde_json::from_str(r#"{"token":"next"}"#).unwrap();
        assert_eq!(resp.token, "next");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let client = ApiClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = client.login(&Credentials::new("a", "b")).await;
        assert!(matches!(result, Err(ApiError::NetworkError(_)) | Err(ApiError::Timeout(_))));
    }
}
