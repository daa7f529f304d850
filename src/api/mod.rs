//! API Routes for bugvault
//!
//! This module combines all API routes into a single router.
//! Routes are organized by domain and apply appropriate middleware.

mod attachments;
mod bugs;
mod documents;
pub mod status;
mod upload;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::middleware::require_token;
use crate::AppState;

pub use upload::{read_upload_form, UploadForm};

/// Build the complete API router.
///
/// Route structure:
/// - /health, /health/ready - Health checks (public)
/// - /bugs/*, /projects/*, /attachments/*, /file_download.php - token-protected
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health and status endpoints (public)
        .merge(status::routes())
        // Protected API routes
        .merge(protected_routes(state))
}

/// Protected routes that require authentication.
fn protected_routes(state: AppState) -> Router<AppState> {
    // Request bodies are capped at the transport limit; multipart reads past
    // it surface as an oversized upload.
    let body_limit = usize::try_from(state.config.files.post_max_size).unwrap_or(usize::MAX);

    Router::new()
        .merge(attachments::routes())
        .merge(documents::routes())
        .merge(bugs::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        // Apply token authentication to all protected routes
        .layer(axum::middleware::from_fn_with_state(state, require_token))
}
