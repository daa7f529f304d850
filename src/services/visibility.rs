//! Attachment visibility and authorization.
//!
//! Each action (view, download, delete) is granted when the user's level on
//! the bug reaches the action's threshold, or when the user uploaded the
//! file and the matching "own attachments" switch is on. Deleting also
//! requires the bug not to be read-only.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tracing::debug;

use super::access::AccessService;
use super::{naming, paths};
use crate::config::{AttachmentAccessConfig, FileConfig};
use crate::db::{self, Bug, DbPool};
use crate::models::{AccessLevel, RequestContext, UploadMethod};
use crate::Result;

/// What one user may do with one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AttachmentPermissions {
    pub can_view: bool,
    pub can_download: bool,
    pub can_delete: bool,
}

impl AttachmentPermissions {
    /// Decide permissions from the user's level on the bug.
    pub fn evaluate(
        level: AccessLevel,
        bug_readonly: bool,
        uploaded_by_me: bool,
        config: &AttachmentAccessConfig,
    ) -> Self {
        let grant = |threshold: AccessLevel, allow_own: bool| {
            level.is_at_least(threshold) || (uploaded_by_me && allow_own)
        };

        Self {
            can_view: grant(config.view_threshold, config.allow_view_own),
            can_download: grant(config.download_threshold, config.allow_download_own),
            can_delete: !bug_readonly && grant(config.delete_threshold, config.allow_delete_own),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewType {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileIcon {
    pub url: String,
    pub alt: String,
}

/// One attachment as presented to a particular user.
#[derive(Debug, Clone, Serialize)]
pub struct VisibleAttachment {
    pub id: i64,
    pub display_name: String,
    pub size: i64,
    pub date_added: i64,
    /// Resolved local path of the payload.
    pub diskfile: String,
    pub downloaded: i64,
    pub can_download: bool,
    pub can_delete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub exists: bool,
    pub icon: FileIcon,
    /// Lowercase extension of the display name.
    pub alt: String,
    pub preview: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub preview_type: Option<PreviewType>,
}

/// Applies attachment permissions for the current user.
#[derive(Clone)]
pub struct VisibilityFilter {
    db: DbPool,
    config: Arc<FileConfig>,
    access: AccessService,
}

impl VisibilityFilter {
    pub fn new(db: DbPool, config: Arc<FileConfig>, access: AccessService) -> Self {
        Self { db, config, access }
    }

    /// Permissions of the context user on a file of `bug` uploaded by
    /// `uploader_id`.
    pub async fn permissions(
        &self,
        ctx: &RequestContext,
        bug: &Bug,
        uploader_id: i64,
    ) -> Result<AttachmentPermissions> {
        let level = self.access.bug_level(bug, ctx.user_id).await?;
        let readonly = self
            .access
            .is_bug_readonly(bug, ctx.user_id, &self.config.access)
            .await?;

        Ok(AttachmentPermissions::evaluate(
            level,
            readonly,
            uploader_id == ctx.user_id,
            &self.config.access,
        ))
    }

    pub async fn can_view(&self, ctx: &RequestContext, bug: &Bug, uploader_id: i64) -> Result<bool> {
        Ok(self.permissions(ctx, bug, uploader_id).await?.can_view)
    }

    pub async fn can_download(&self, ctx: &RequestContext, bug: &Bug, uploader_id: i64) -> Result<bool> {
        Ok(self.permissions(ctx, bug, uploader_id).await?.can_download)
    }

    pub async fn can_delete(&self, ctx: &RequestContext, bug: &Bug, uploader_id: i64) -> Result<bool> {
        Ok(self.permissions(ctx, bug, uploader_id).await?.can_delete)
    }

    /// Attachments of a bug the context user may view, oldest first, with
    /// per-file download/delete flags and preview decisions.
    pub async fn visible_attachments(
        &self,
        ctx: &RequestContext,
        bug_id: i64,
    ) -> Result<Vec<VisibleAttachment>> {
        let bug = db::get_bug(&self.db, bug_id).await?;
        let rows = db::list_bug_attachments(&self.db, bug_id).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        // Level and read-only state are per bug, not per file.
        let level = self.access.bug_level(&bug, ctx.user_id).await?;
        let readonly = self
            .access
            .is_bug_readonly(&bug, ctx.user_id, &self.config.access)
            .await?;
        let project_path = db::get_project_file_path(&self.db, bug.project_id).await?;

        let mut visible = Vec::with_capacity(rows.len());
        for row in rows {
            let perms = AttachmentPermissions::evaluate(
                level,
                readonly,
                row.user_id == ctx.user_id,
                &self.config.access,
            );
            if !perms.can_view {
                continue;
            }

            let diskfile = paths::resolve_attachment_path(
                &row,
                project_path.as_deref(),
                &self.config.default_upload_folder,
            )
            .await;
            let exists = self.config.upload_method != UploadMethod::Disk
                || fs::try_exists(&diskfile).await.unwrap_or(false);

            let display_name = naming::display_name(&row.filename, &self.config.document_files_prefix);
            let ext = naming::file_extension(&display_name);
            let icon = self.icon_for(&ext).await;
            let preview_type = if exists && perms.can_download {
                self.preview_type(&ext, row.filesize)
            } else {
                None
            };

            visible.push(VisibleAttachment {
                id: row.id,
                display_name,
                size: row.filesize,
                date_added: row.date_added,
                diskfile,
                downloaded: row.downloaded,
                can_download: perms.can_download,
                can_delete: perms.can_delete,
                download_url: perms
                    .can_download
                    .then(|| format!("file_download.php?file_id={}&type=bug", row.id)),
                exists,
                icon,
                alt: ext,
                preview: preview_type.is_some(),
                preview_type,
            });
        }

        debug!(
            bug_id = bug_id,
            user_id = ctx.user_id,
            visible = visible.len(),
            "Built visible attachment list"
        );

        Ok(visible)
    }

    /// Inline preview kind for a downloadable, existing file.
    fn preview_type(&self, ext: &str, size: i64) -> Option<PreviewType> {
        if size <= 0 || size as u64 > self.config.preview_attachments_inline_max_size {
            return None;
        }
        if self.config.preview_text_extensions.iter().any(|e| e == ext) {
            Some(PreviewType::Text)
        } else if self.config.preview_image_extensions.iter().any(|e| e == ext) {
            Some(PreviewType::Image)
        } else {
            None
        }
    }

    async fn icon_for(&self, ext: &str) -> FileIcon {
        let base = self.config.file_icons_url.trim_end_matches('/');
        let url = if ext.is_empty() {
            format!("{}/generic.png", base)
        } else {
            let icon = Path::new(&self.config.file_icons_path).join(format!("{}.png", ext));
            if fs::try_exists(&icon).await.unwrap_or(false) {
                format!("{}/{}.png", base, ext)
            } else {
                format!("img_ext.php?ext={}", urlencoding::encode(ext))
            }
        };

        FileIcon {
            url,
            alt: ext.to_string(),
        }
    }
}
