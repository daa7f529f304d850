//! Middleware for bugvault.
//!
//! - `token_auth` - API token validation producing the request's `RequestContext`

mod token_auth;

pub use token_auth::{require_token, PROJECT_HEADER};
