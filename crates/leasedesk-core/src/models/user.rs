use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable user snapshot returned by the auth API at login time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub identifier: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub role: String,
}

impl UserRecord {
    /// Name to show in headers, falling back to the login identifier
    pub fn display(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.identifier
        } else {
            &self.display_name
        }
    }
}

/// Login input. Lives only for the duration of a login attempt.
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.identifier.trim().is_empty() || self.secret.is_empty()
    }
}

// Keep secrets out of logs and panic messages
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// What a successful remote login hands back to the credential gate.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub user: UserRecord,
    pub token: String,
}
