//! Project Documents Routes
//!
//! Routes:
//! - GET /projects/:project_id/documents - List project documents
//! - POST /projects/:project_id/documents - Upload a document (multipart)
//! - DELETE /projects/:project_id/files - Delete every document of a project

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::Serialize;

use super::attachments::AttachmentResponse;
use super::upload::read_upload_form;
use crate::db;
use crate::models::{AttachmentKind, AttachmentTarget, RequestContext};
use crate::services::AddOptions;
use crate::{AppState, Error, Result};

/// Build project document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:project_id/documents",
            get(list_documents).post(upload_document),
        )
        .route("/projects/:project_id/files", delete(delete_documents))
}

#[derive(Debug, Serialize)]
pub struct ListDocumentsResponse {
    pub documents: Vec<AttachmentResponse>,
    pub total: usize,
}

/// GET /projects/:project_id/documents
async fn list_documents(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
) -> Result<Json<ListDocumentsResponse>> {
    db::get_project(&state.db, project_id).await?;
    let allowed = state
        .access
        .has_project_level(state.config.files.access.view_threshold, project_id, ctx.user_id)
        .await?;
    if !allowed {
        return Err(Error::Forbidden);
    }

    let prefix = &state.config.files.document_files_prefix;
    let documents: Vec<AttachmentResponse> = state
        .attachments
        .list_documents(project_id)
        .await?
        .into_iter()
        .map(|doc| AttachmentResponse::new(doc, AttachmentKind::Doc, prefix))
        .collect();
    let total = documents.len();

    Ok(Json(ListDocumentsResponse { documents, total }))
}

/// POST /projects/:project_id/documents
async fn upload_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AttachmentResponse>)> {
    db::get_project(&state.db, project_id).await?;
    if !state.attachments.allow_project_upload(&ctx, project_id).await? {
        return Err(Error::Forbidden);
    }

    let form = read_upload_form(multipart).await?;
    let document = state
        .attachments
        .add(
            &ctx,
            AttachmentTarget::ProjectDocument(project_id),
            &form.file,
            AddOptions {
                title: form.title.clone(),
                description: form.description.clone(),
                ..Default::default()
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AttachmentResponse::new(
            document,
            AttachmentKind::Doc,
            &state.config.files.document_files_prefix,
        )),
    ))
}

/// DELETE /projects/:project_id/files
async fn delete_documents(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let allowed = state
        .access
        .has_project_level(
            state.config.files.access.upload_project_file_threshold,
            project_id,
            ctx.user_id,
        )
        .await?;
    if !allowed {
        return Err(Error::Forbidden);
    }

    let removed = state.attachments.delete_project_files(project_id).await?;

    Ok(Json(serde_json::json!({
        "project_id": project_id,
        "removed": removed,
    })))
}
