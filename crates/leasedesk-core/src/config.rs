//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the API base URL, request timeout and last used identifier,
//! plus the `AuthPolicy` timing constants for the session lifecycle.
//!
//! Configuration is stored at `~/.config/leasedesk/config.json`.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "leasedesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API base URL when neither config nor environment set one
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Environment variable overriding the API base URL
pub const ENV_API_URL: &str = "LEASEDESK_API_URL";

/// Environment variable pre-filling the login identifier
pub const ENV_IDENTIFIER: &str = "LEASEDESK_IDENTIFIER";

/// Consecutive failed logins before the lockout window starts.
pub const MAX_ATTEMPTS: u32 = 5;

/// Lockout window length in minutes.
pub const LOCKOUT_MINUTES: i64 = 15;

/// Session lifetime granted by a login or refresh, in hours.
pub const SESSION_HOURS: i64 = 8;

/// Refresh is triggered once this many minutes or fewer remain.
pub const REFRESH_LEAD_MINUTES: i64 = 30;

/// The expiry warning appears once this many minutes or fewer remain.
pub const WARNING_MINUTES: i64 = 5;

/// Session clock tick period in milliseconds.
pub const TICK_INTERVAL_MS: u64 = 1000;

/// Upper bound on a single login or refresh round trip.
/// 30s allows for slow API responses while keeping the lockout and refresh
/// state machine from stalling on a hung request.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_identifier: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides (call after `dotenvy::dotenv()`)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = Some(url);
            }
        }
        if let Ok(identifier) = std::env::var(ENV_IDENTIFIER) {
            if !identifier.trim().is_empty() {
                self.last_identifier = Some(identifier);
            }
        }
        self
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn policy(&self) -> AuthPolicy {
        let mut policy = AuthPolicy::default();
        if let Some(secs) = self.request_timeout_secs.filter(|s| *s > 0) {
            policy.request_timeout = StdDuration::from_secs(secs);
        }
        policy
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the durable auth store
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

/// Timing and threshold policy for the session lifecycle.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub max_attempts: u32,
    pub lockout_duration: Duration,
    pub session_duration: Duration,
    pub refresh_lead: Duration,
    pub warning_threshold: Duration,
    pub tick_interval: StdDuration,
    pub request_timeout: StdDuration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            lockout_duration: Duration::minutes(LOCKOUT_MINUTES),
            session_duration: Duration::hours(SESSION_HOURS),
            refresh_lead: Duration::minutes(REFRESH_LEAD_MINUTES),
            warning_threshold: Duration::minutes(WARNING_MINUTES),
            tick_interval: StdDuration::from_millis(TICK_INTERVAL_MS),
            request_timeout: StdDuration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}
