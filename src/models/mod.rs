//! Data models for bugvault.
//!
//! Defines the vocabulary shared by the database layer, the services and
//! the HTTP handlers.

mod access;
mod upload;

pub use access::*;
pub use upload::*;

use chrono::Utc;

/// Current time as unix seconds, the format attachment dates are stored in.
pub fn now() -> i64 {
    Utc::now().timestamp()
}
