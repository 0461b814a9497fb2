//! Durable key-value persistence for auth state.
//!
//! This module provides:
//! - `KeyValueStore`: the string-keyed storage port the auth layer writes through
//! - `MemoryStore`: process-local store, also the degraded-mode fallback
//! - `FileStore`: JSON file store that survives restarts
//! - `AuthStore`: typed access to the `auth.*` keys with in-memory fallback

pub mod auth_store;
pub mod error;
pub mod file;
pub mod memory;

pub use auth_store::{AuthStore, KEY_FAILED_ATTEMPTS, KEY_LOCKOUT_UNTIL, KEY_SESSION_EXPIRY, KEY_TOKEN, KEY_USER};
pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// String-keyed durable storage.
///
/// Writes are synchronous puts. Only `AuthStore` writes the `auth.*` keys.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
