//! Data models shared by the auth layer and its API client.
//!
//! - `UserRecord`: the user snapshot returned by the remote auth API
//! - `Credentials`: transient login input, never persisted
//! - `LoginGrant`: the result of a successful remote login

pub mod user;

pub use user::{Credentials, LoginGrant, UserRecord};
