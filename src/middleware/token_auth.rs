//! API token authentication middleware.
//!
//! Validates Bearer tokens for API access. Supports both:
//! - `Authorization: Bearer {token}` headers (recommended)
//! - `?token={token}` query string parameters (for download links)
//!
//! Only the SHA-256 hash of a token is stored, on the user row. A valid
//! token yields a `RequestContext` for the token's user; the current
//! project comes from the optional `X-Project-Id` header.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::db;
use crate::models::{RequestContext, ALL_PROJECTS};
use crate::{error::Error, AppState};

/// Header selecting the current project.
pub const PROJECT_HEADER: &str = "x-project-id";

/// Extract token from Authorization header or query string.
///
/// Priority:
/// 1. Authorization: Bearer {token} header
/// 2. ?token={token} query parameter
fn extract_token_from_request(req: &Request<Body>) -> Option<String> {
    if let Some(auth_header) = req.headers().get(AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(query) = req.uri().query() {
        for part in query.split('&') {
            if let Some(token) = part.strip_prefix("token=") {
                if let Ok(decoded) = urlencoding::decode(token) {
                    return Some(decoded.into_owned());
                }
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Current project from the request, `ALL_PROJECTS` when absent.
fn extract_project(req: &Request<Body>) -> Result<i64, Error> {
    match req.headers().get(PROJECT_HEADER) {
        None => Ok(ALL_PROJECTS),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| Error::InvalidInput("X-Project-Id must be a number".into())),
    }
}

/// Middleware that requires a valid API token.
///
/// Injects `RequestContext` into request extensions.
///
/// # Errors
///
/// Returns 401 Unauthorized if no token is present, or if it does not
/// belong to an enabled user.
///
/// # Example
///
/// ```rust,ignore
/// use axum::{Router, middleware};
/// use bugvault::middleware::require_token;
///
/// let app = Router::new()
///     .route("/bugs/:bug_id/attachments", get(list_attachments))
///     .layer(middleware::from_fn_with_state(state.clone(), require_token));
/// ```
pub async fn require_token(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let token = extract_token_from_request(&req).ok_or(Error::Unauthenticated)?;
    if token.is_empty() {
        return Err(Error::InvalidToken);
    }

    let user = db::get_user_by_token_hash(&state.db, &db::hash_token(&token))
        .await?
        .ok_or(Error::InvalidToken)?;

    let ctx = RequestContext::new(user.id, extract_project(&req)?);
    debug!(user_id = ctx.user_id, project_id = ctx.project_id, "Authenticated request");

    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_token_from_header_then_query() {
        let req = request("/x?token=fromquery", &[("authorization", "Bearer fromheader")]);
        assert_eq!(extract_token_from_request(&req).as_deref(), Some("fromheader"));

        let req = request("/x?a=1&token=abc%2Bdef", &[]);
        assert_eq!(extract_token_from_request(&req).as_deref(), Some("abc+def"));

        let req = request("/x", &[("authorization", "Basic xyz")]);
        assert_eq!(extract_token_from_request(&req), None);
    }

    #[test]
    fn test_project_header() {
        assert_eq!(extract_project(&request("/", &[])).unwrap(), ALL_PROJECTS);
        assert_eq!(extract_project(&request("/", &[("X-Project-Id", "7")])).unwrap(), 7);
        assert!(extract_project(&request("/", &[("X-Project-Id", "seven")])).is_err());
    }
}
