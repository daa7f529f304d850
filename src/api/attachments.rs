//! Attachments Routes
//!
//! Bug attachment operations plus the shared download and delete endpoints.
//!
//! Routes:
//! - GET /bugs/:bug_id/attachments - Attachments the caller may view
//! - POST /bugs/:bug_id/attachments - Upload an attachment (multipart)
//! - DELETE /attachments/:file_id?type=bug|doc - Delete one attachment
//! - GET /file_download.php?file_id=&type=bug|doc - Download content

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use super::upload::read_upload_form;
use crate::db::{self, Attachment};
use crate::models::{AttachmentKind, AttachmentTarget, RequestContext};
use crate::services::{naming, AddOptions, VisibleAttachment};
use crate::{AppState, Error, Result};

/// Build attachment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/bugs/:bug_id/attachments",
            get(list_attachments).post(upload_attachment),
        )
        .route("/attachments/:file_id", delete(delete_attachment))
        .route("/file_download.php", get(download_attachment))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Attachment metadata response.
#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub filename: String,
    pub size: i64,
    pub content_type: String,
    pub date_added: i64,
    pub user_id: i64,
    pub downloaded: i64,
    pub download_url: String,
}

impl AttachmentResponse {
    pub fn new(attachment: Attachment, kind: AttachmentKind, doc_prefix: &str) -> Self {
        Self {
            download_url: format!(
                "file_download.php?file_id={}&type={}",
                attachment.id,
                kind.as_str()
            ),
            id: attachment.id,
            kind,
            owner_id: attachment.owner_id,
            filename: naming::display_name(&attachment.filename, doc_prefix),
            title: attachment.title,
            description: attachment.description,
            size: attachment.filesize,
            content_type: attachment.file_type,
            date_added: attachment.date_added,
            user_id: attachment.user_id,
            downloaded: attachment.downloaded,
        }
    }
}

/// List attachments response.
#[derive(Debug, Serialize)]
pub struct ListAttachmentsResponse {
    pub attachments: Vec<VisibleAttachment>,
    pub total: usize,
}

/// `?type=bug|doc`, defaulting to bug.
#[derive(Debug, Deserialize)]
pub struct KindQuery {
    #[serde(rename = "type", default)]
    pub kind: AttachmentKind,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub file_id: i64,
    #[serde(rename = "type", default)]
    pub kind: AttachmentKind,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the attachments of a bug visible to the caller.
///
/// GET /bugs/:bug_id/attachments
async fn list_attachments(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(bug_id): Path<i64>,
) -> Result<Json<ListAttachmentsResponse>> {
    let attachments = state.visibility.visible_attachments(&ctx, bug_id).await?;
    let total = attachments.len();

    Ok(Json(ListAttachmentsResponse { attachments, total }))
}

/// Upload an attachment to a bug.
///
/// POST /bugs/:bug_id/attachments
///
/// Accepts multipart/form-data with a file field named "file" and optional
/// "title" and "description" fields.
async fn upload_attachment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(bug_id): Path<i64>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AttachmentResponse>)> {
    let bug = db::get_bug(&state.db, bug_id).await?;
    if !state.attachments.allow_bug_upload(&ctx, Some(&bug)).await? {
        return Err(Error::Forbidden);
    }
    if state
        .access
        .is_bug_readonly(&bug, ctx.user_id, &state.config.files.access)
        .await?
    {
        return Err(Error::BugReadOnly(bug_id));
    }

    let form = read_upload_form(multipart).await?;
    let attachment = state
        .attachments
        .add(
            &ctx,
            AttachmentTarget::Bug(bug_id),
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
            attachment,
            AttachmentKind::Bug,
            &state.config.files.document_files_prefix,
        )),
    ))
}

/// Delete one attachment.
///
/// DELETE /attachments/:file_id?type=bug|doc
async fn delete_attachment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(file_id): Path<i64>,
    Query(query): Query<KindQuery>,
) -> Result<Json<serde_json::Value>> {
    let attachment = state.attachments.get(query.kind, file_id).await?;

    match query.kind {
        AttachmentKind::Bug => {
            let bug = db::get_bug(&state.db, attachment.owner_id).await?;
            if state
                .access
                .is_bug_readonly(&bug, ctx.user_id, &state.config.files.access)
                .await?
            {
                return Err(Error::BugReadOnly(bug.id));
            }
            if !state.visibility.can_delete(&ctx, &bug, attachment.user_id).await? {
                return Err(Error::Forbidden);
            }
        }
        AttachmentKind::Doc => {
            let allowed = state
                .access
                .has_project_level(
                    state.config.files.access.upload_project_file_threshold,
                    attachment.owner_id,
                    ctx.user_id,
                )
                .await?;
            if !allowed {
                return Err(Error::Forbidden);
            }
        }
    }

    state.attachments.delete(&ctx, query.kind, file_id).await?;

    Ok(Json(serde_json::json!({
        "message": "Attachment deleted successfully"
    })))
}

/// Download an attachment.
///
/// GET /file_download.php?file_id=&type=bug|doc
async fn download_attachment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let attachment = state.attachments.get(query.kind, query.file_id).await?;

    let allowed = match query.kind {
        AttachmentKind::Bug => {
            let bug = db::get_bug(&state.db, attachment.owner_id).await?;
            state
                .visibility
                .can_download(&ctx, &bug, attachment.user_id)
                .await?
        }
        AttachmentKind::Doc => {
            state
                .access
                .has_project_level(
                    state.config.files.access.download_threshold,
                    attachment.owner_id,
                    ctx.user_id,
                )
                .await?
        }
    };
    if !allowed {
        return Err(Error::Forbidden);
    }

    let content = state.attachments.get_content(query.kind, query.file_id).await?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, &content.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                naming::clean_name(&content.filename)
            ),
        )
        .header(header::CONTENT_LENGTH, content.bytes.len())
        .body(Body::from(content.bytes))
        .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
