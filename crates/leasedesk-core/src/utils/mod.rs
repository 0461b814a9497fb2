//! Utility functions for display formatting and lock handling.

pub mod format;
pub mod sync;

pub use format::{format_countdown, format_remaining};
pub use sync::lock;
