//! Core infrastructure shared by every acquisition
//!
//! Errors, configuration, cancellation, the cache lock and user-facing output.

pub mod cancel;
pub mod config;
pub mod error;
pub mod lock;
pub mod output;
