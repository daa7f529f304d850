//! Bug Routes
//!
//! The bug operations that carry attachment side effects.
//!
//! Routes:
//! - DELETE /bugs/:bug_id - Delete a bug with all its attachments
//! - PUT /bugs/:bug_id/project - Move a bug (and its files) to another project

use axum::{
    extract::{Path, State},
    routing::{delete, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db;
use crate::models::{AccessLevel, RequestContext};
use crate::{AppState, Error, Result};

/// Level needed to delete or move a bug.
const MANAGE_BUG_THRESHOLD: AccessLevel = AccessLevel::DEVELOPER;

/// Build bug routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bugs/:bug_id", delete(delete_bug))
        .route("/bugs/:bug_id/project", put(move_bug))
}

#[derive(Debug, Deserialize)]
pub struct MoveBugRequest {
    pub project_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MoveBugResponse {
    pub bug_id: i64,
    pub project_id: i64,
    pub moved_files: usize,
}

/// DELETE /bugs/:bug_id
async fn delete_bug(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(bug_id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let bug = db::get_bug(&state.db, bug_id).await?;
    if !state.access.has_bug_level(MANAGE_BUG_THRESHOLD, &bug, ctx.user_id).await? {
        return Err(Error::Forbidden);
    }

    let removed = state.attachments.delete_bug_attachments(bug_id).await?;
    db::delete_bug(&state.db, bug_id).await?;

    info!(bug_id = bug_id, user_id = ctx.user_id, attachments = removed, "Bug deleted");

    Ok(Json(serde_json::json!({
        "bug_id": bug_id,
        "removed_attachments": removed,
    })))
}

/// PUT /bugs/:bug_id/project
///
/// Files are relocated before the bug row changes; if relocation fails the
/// bug stays in its old project.
async fn move_bug(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(bug_id): Path<i64>,
    Json(body): Json<MoveBugRequest>,
) -> Result<Json<MoveBugResponse>> {
    let bug = db::get_bug(&state.db, bug_id).await?;
    db::get_project(&state.db, body.project_id).await?;

    let allowed = state.access.has_bug_level(MANAGE_BUG_THRESHOLD, &bug, ctx.user_id).await?
        && state
            .access
            .has_project_level(MANAGE_BUG_THRESHOLD, body.project_id, ctx.user_id)
            .await?;
    if !allowed {
        return Err(Error::Forbidden);
    }

    let moved_files = state
        .attachments
        .move_bug_attachments(&ctx, bug_id, body.project_id)
        .await?;
    if bug.project_id != body.project_id {
        db::update_bug_project(&state.db, bug_id, body.project_id).await?;
    }

    Ok(Json(MoveBugResponse {
        bug_id,
        project_id: body.project_id,
        moved_files,
    }))
}
