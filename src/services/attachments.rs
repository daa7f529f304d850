//! Attachment lifecycle: upload, download, delete and relocation.
//!
//! Payload storage is delegated to the deployment's `StorageBackend`; this
//! service owns validation, key generation, the attachment rows and the bug
//! side effects (last-updated stamp, history).

use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};

use super::access::AccessService;
use super::naming;
use super::paths::{self, basename, path_combine};
use super::storage::{move_file, set_mode, StorageBackend, StoredFile};
use crate::config::FileConfig;
use crate::db::{self, Attachment, Bug, CreateAttachment, DbPool, PATH_VERSION_CURRENT};
use crate::models::{
    now, AttachmentKind, AttachmentTarget, RequestContext, UploadError, UploadMethod, UploadedFile,
    ALL_PROJECTS,
};
use crate::{Error, Result};

/// Mode set on a payload before it is moved.
const MOVABLE_MODE: u32 = 0o775;

/// Optional inputs to `AttachmentService::add`.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub title: String,
    pub description: String,
    /// Uploader; defaults to the context user.
    pub user_id: Option<i64>,
    /// Unix seconds; defaults to now.
    pub date_added: Option<i64>,
    /// Leave the bug's last-updated stamp alone (imports).
    pub skip_bug_update: bool,
}

/// A downloaded payload.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub content_type: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Service for managing attachments.
#[derive(Clone)]
pub struct AttachmentService {
    db: DbPool,
    config: Arc<FileConfig>,
    backend: Arc<dyn StorageBackend>,
    access: AccessService,
}

impl AttachmentService {
    pub fn new(
        db: DbPool,
        config: Arc<FileConfig>,
        backend: Arc<dyn StorageBackend>,
        access: AccessService,
    ) -> Self {
        Self {
            db,
            config,
            backend,
            access,
        }
    }

    pub fn method(&self) -> UploadMethod {
        self.backend.method()
    }

    // ------------------------------------------------------------------------
    // Upload policy
    // ------------------------------------------------------------------------

    /// Whether a file name passes the extension deny/allow lists.
    ///
    /// The deny list wins; an empty allow list permits everything else.
    /// Blank list entries are ignored, so an unset deny list does not catch
    /// files without an extension.
    pub fn type_check(&self, filename: &str) -> bool {
        let ext = naming::file_extension(filename);

        let listed = |list: &str| {
            list.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .any(|entry| entry.eq_ignore_ascii_case(&ext))
        };

        if listed(&self.config.disallowed_files) {
            return false;
        }
        if self.config.allowed_files.trim().is_empty() {
            return true;
        }
        listed(&self.config.allowed_files)
    }

    pub fn is_uploading_enabled(&self) -> bool {
        self.config.is_uploading_enabled()
    }

    /// Whether the context user may upload documents to a project.
    pub async fn allow_project_upload(&self, ctx: &RequestContext, project_id: i64) -> Result<bool> {
        if !self.is_uploading_enabled() {
            return Ok(false);
        }
        self.access
            .has_project_level(
                self.config.access.upload_project_file_threshold,
                project_id,
                ctx.user_id,
            )
            .await
    }

    /// Whether the context user may attach files to a bug.
    ///
    /// With no bug, answers for a new bug in the context project, where the
    /// user is the reporter.
    pub async fn allow_bug_upload(&self, ctx: &RequestContext, bug: Option<&Bug>) -> Result<bool> {
        if !self.is_uploading_enabled() {
            return Ok(false);
        }

        let (project_id, is_reporter) = match bug {
            Some(bug) => (bug.project_id, bug.reporter_id == ctx.user_id),
            None => (ctx.project_id, true),
        };

        if is_reporter && self.config.access.allow_reporter_upload {
            return Ok(true);
        }

        self.access
            .has_project_level(
                self.config.access.upload_bug_file_threshold,
                project_id,
                ctx.user_id,
            )
            .await
    }

    /// Check that the transport delivered a readable file.
    pub async fn ensure_uploaded(&self, upload: &UploadedFile) -> Result<()> {
        match upload.error {
            UploadError::IniSize | UploadError::FormSize => {
                return Err(Error::FileTooBig {
                    max_size: self.config.max_upload_size(),
                })
            }
            UploadError::Partial | UploadError::NoFile => return Err(Error::FileNoUpload),
            _ => {}
        }

        if upload.name.is_empty() || upload.tmp_path.as_os_str().is_empty() {
            return Err(Error::FileNoUpload);
        }

        fs::File::open(&upload.tmp_path)
            .await
            .map_err(|_| Error::FileUploadFailed)?;
        Ok(())
    }

    /// Upload folder of a project (the default folder for `ALL_PROJECTS`).
    async fn folder_for_project(&self, project_id: i64) -> Result<String> {
        let project_path = if project_id == ALL_PROJECTS {
            None
        } else {
            db::get_project_file_path(&self.db, project_id).await?
        };
        Ok(paths::upload_folder(
            project_path.as_deref(),
            &self.config.default_upload_folder,
        ))
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Store an upload and record it against a bug or a project.
    ///
    /// Nothing is inserted unless the payload was stored; if the insert
    /// itself fails the stored payload is removed again.
    pub async fn add(
        &self,
        ctx: &RequestContext,
        target: AttachmentTarget,
        upload: &UploadedFile,
        options: AddOptions,
    ) -> Result<Attachment> {
        self.ensure_uploaded(upload).await?;
        let filename = upload.name.clone();

        if !self.type_check(&filename) {
            return Err(Error::FileTypeNotAllowed(filename));
        }

        let (project_id, seed) = match target {
            AttachmentTarget::Bug(bug_id) => {
                if db::bug_filename_exists(&self.db, bug_id, &filename).await? {
                    return Err(Error::FileDuplicate(filename));
                }
                let bug = db::get_bug(&self.db, bug_id).await?;
                (bug.project_id, naming::bug_seed(bug_id, &filename))
            }
            AttachmentTarget::ProjectDocument(project_id) => {
                db::get_project(&self.db, project_id).await?;
                (
                    project_id,
                    naming::document_seed(&self.config.document_files_prefix, project_id, &filename),
                )
            }
        };

        let size = fs::metadata(&upload.tmp_path)
            .await
            .map_err(|_| Error::FileUploadFailed)?
            .len();
        if size == 0 {
            return Err(Error::FileNoUpload);
        }
        let max_size = self.config.max_upload_size();
        if size > max_size {
            return Err(Error::FileTooBig { max_size });
        }

        let folder = self.folder_for_project(project_id).await?;
        if self.method().uses_filesystem() {
            paths::ensure_valid_upload_path(&folder).await?;
        }

        let key = naming::generate_unique_name(&self.db, &seed, &folder).await?;
        let stored = StoredFile::new(key.clone(), path_combine(&folder, &key));
        let content = self.backend.store(&upload.tmp_path, &stored).await?;

        let input = CreateAttachment {
            owner_id: target.owner_id(),
            title: options.title,
            description: options.description,
            diskfile: key,
            filename: filename.clone(),
            folder,
            filesize: size as i64,
            file_type: upload.content_type.clone(),
            date_added: options.date_added.filter(|d| *d > 0).unwrap_or_else(now),
            content,
            user_id: options.user_id.unwrap_or(ctx.user_id),
            path_version: PATH_VERSION_CURRENT,
        };

        let attachment = match db::create_attachment(&self.db, target.kind(), input).await {
            Ok(attachment) => attachment,
            Err(e) => {
                if let Err(cleanup) = self.backend.delete(&stored).await {
                    warn!(key = %stored.key, error = %cleanup, "Failed to remove orphaned payload");
                }
                return Err(e);
            }
        };

        if let AttachmentTarget::Bug(bug_id) = target {
            if !options.skip_bug_update {
                db::touch_bug(&self.db, bug_id).await?;
            }
            db::log_history_event(&self.db, bug_id, ctx.user_id, db::FILE_ADDED, &filename).await?;
        }

        info!(
            attachment_id = attachment.id,
            kind = target.kind().as_str(),
            owner_id = target.owner_id(),
            filename = %attachment.filename,
            size = attachment.filesize,
            method = %self.method(),
            "Attachment added"
        );

        Ok(attachment)
    }

    /// Storage location of an existing row.
    async fn stored_file(&self, attachment: &Attachment, project_id: i64) -> Result<StoredFile> {
        let project_path = db::get_project_file_path(&self.db, project_id).await?;
        let local_path = paths::resolve_attachment_path(
            attachment,
            project_path.as_deref(),
            &self.config.default_upload_folder,
        )
        .await;
        Ok(StoredFile::new(basename(&attachment.diskfile), local_path))
    }

    /// Project an attachment's owner belongs to.
    async fn owner_project(&self, kind: AttachmentKind, attachment: &Attachment) -> Result<i64> {
        match kind {
            AttachmentKind::Bug => Ok(db::get_bug(&self.db, attachment.owner_id).await?.project_id),
            AttachmentKind::Doc => Ok(attachment.owner_id),
        }
    }

    /// Remove one attachment: payload first, then the row.
    pub async fn delete(&self, ctx: &RequestContext, kind: AttachmentKind, file_id: i64) -> Result<()> {
        let attachment = db::get_attachment(&self.db, kind, file_id).await?;

        if self.method().uses_filesystem() {
            let project_id = self.owner_project(kind, &attachment).await?;
            let stored = self.stored_file(&attachment, project_id).await?;
            self.backend.delete(&stored).await?;
        }

        db::delete_attachment(&self.db, kind, file_id).await?;

        if kind == AttachmentKind::Bug {
            let display = naming::display_name(&attachment.filename, &self.config.document_files_prefix);
            db::log_history_event(&self.db, attachment.owner_id, ctx.user_id, db::FILE_DELETED, &display)
                .await?;
        }

        info!(attachment_id = file_id, kind = kind.as_str(), "Attachment deleted");
        Ok(())
    }

    /// Remove every attachment of one owner in a single pass.
    async fn delete_all(&self, kind: AttachmentKind, owner_id: i64, project_id: i64) -> Result<u64> {
        let rows = db::list_owner_attachments(&self.db, kind, owner_id).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        if self.method().uses_filesystem() {
            let mut files = Vec::with_capacity(rows.len());
            for row in &rows {
                files.push(self.stored_file(row, project_id).await?);
            }
            self.backend.delete_many(&files).await?;
        }

        let removed = db::delete_owner_attachments(&self.db, kind, owner_id).await?;
        info!(kind = kind.as_str(), owner_id = owner_id, removed = removed, "Attachments deleted");
        Ok(removed)
    }

    /// Remove all attachments of a bug.
    pub async fn delete_bug_attachments(&self, bug_id: i64) -> Result<u64> {
        let bug = db::get_bug(&self.db, bug_id).await?;
        self.delete_all(AttachmentKind::Bug, bug_id, bug.project_id).await
    }

    /// Remove all documents of a project.
    pub async fn delete_project_files(&self, project_id: i64) -> Result<u64> {
        self.delete_all(AttachmentKind::Doc, project_id, project_id).await
    }

    /// Relocate a bug's payloads to another project's upload folder.
    ///
    /// Only disk storage keeps per-project folders, so other backends are
    /// left alone. Stops at the first payload whose destination already
    /// exists; files moved before that stay moved. Returns how many files
    /// were moved.
    pub async fn move_bug_attachments(
        &self,
        ctx: &RequestContext,
        bug_id: i64,
        to_project: i64,
    ) -> Result<usize> {
        let bug = db::get_bug(&self.db, bug_id).await?;
        if bug.project_id == to_project
            || self.method() != UploadMethod::Disk
            || !self.has_attachments(bug_id).await?
        {
            return Ok(0);
        }

        let path_from = self.folder_for_project(bug.project_id).await?;
        paths::ensure_valid_upload_path(&path_from).await?;
        let path_to = self.folder_for_project(to_project).await?;
        paths::ensure_valid_upload_path(&path_to).await?;
        if path_from == path_to {
            return Ok(0);
        }

        let project_path = db::get_project_file_path(&self.db, bug.project_id).await?;
        let rows = db::list_bug_attachments(&self.db, bug_id).await?;
        let mut moved = 0;

        for row in rows {
            let key = basename(&row.diskfile).to_string();
            let from = paths::resolve_attachment_path(
                &row,
                project_path.as_deref(),
                &self.config.default_upload_folder,
            )
            .await;
            let to = path_combine(&path_to, &key);

            if fs::try_exists(&to).await.unwrap_or(false) {
                warn!(
                    bug_id = bug_id,
                    attachment_id = row.id,
                    moved = moved,
                    to = %to,
                    "Destination exists, aborting attachment move"
                );
                return Err(Error::FileDuplicate(to));
            }

            // The source may be missing; the move reports that.
            if let Err(e) = set_mode(std::path::Path::new(&from), MOVABLE_MODE).await {
                debug!(from = %from, error = %e, "Could not make source writable");
            }
            move_file(
                std::path::Path::new(&from),
                std::path::Path::new(&to),
                self.config.attachments_file_permissions,
            )
            .await?;

            db::relocate_bug_attachment(&self.db, bug_id, row.id, &path_to, &key).await?;
            moved += 1;
        }

        info!(
            bug_id = bug_id,
            user_id = ctx.user_id,
            from = %path_from,
            to = %path_to,
            moved = moved,
            "Bug attachments moved"
        );

        Ok(moved)
    }

    /// Read a payload, sniffing its content type from the bytes.
    ///
    /// Counts as a download.
    pub async fn get_content(&self, kind: AttachmentKind, file_id: i64) -> Result<FileContent> {
        let attachment = db::get_attachment(&self.db, kind, file_id).await?;

        let bytes = if self.method().uses_filesystem() {
            let project_id = self.owner_project(kind, &attachment).await?;
            let stored = self.stored_file(&attachment, project_id).await?;
            self.backend.fetch(&stored, None).await?
        } else {
            let inline = db::get_attachment_content(&self.db, kind, file_id).await?;
            let stored = StoredFile::new(attachment.diskfile.clone(), String::new());
            self.backend.fetch(&stored, inline).await?
        };

        let content_type = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .or_else(|| (!attachment.file_type.is_empty()).then(|| attachment.file_type.clone()))
            .unwrap_or_else(|| {
                mime_guess::from_path(&attachment.filename)
                    .first_or_octet_stream()
                    .to_string()
            });

        db::increment_download_count(&self.db, kind, file_id).await?;
        debug!(attachment_id = file_id, content_type = %content_type, size = bytes.len(), "Serving attachment");

        Ok(FileContent {
            content_type,
            filename: naming::display_name(&attachment.filename, &self.config.document_files_prefix),
            bytes,
        })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get(&self, kind: AttachmentKind, file_id: i64) -> Result<Attachment> {
        db::get_attachment(&self.db, kind, file_id).await
    }

    pub async fn list_documents(&self, project_id: i64) -> Result<Vec<Attachment>> {
        db::list_project_documents(&self.db, project_id).await
    }

    pub async fn attachment_count(&self, bug_id: i64) -> Result<i64> {
        db::count_bug_attachments(&self.db, bug_id).await
    }

    pub async fn has_attachments(&self, bug_id: i64) -> Result<bool> {
        Ok(self.attachment_count(bug_id).await? > 0)
    }

    /// Read one column of an attachment row.
    pub async fn get_field(&self, kind: AttachmentKind, file_id: i64, field: &str) -> Result<String> {
        db::get_attachment_field(&self.db, kind, file_id, field).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateBug, CreateProject, CreateUser};
    use crate::models::AccessLevel;
    use crate::services::storage::{DatabaseBackend, DiskBackend};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Harness {
        service: AttachmentService,
        pool: DbPool,
        ctx: RequestContext,
        bug_id: i64,
        project_id: i64,
        spool: TempDir,
        uploads: TempDir,
    }

    async fn harness(method: UploadMethod, tweak: impl FnOnce(&mut FileConfig)) -> Harness {
        let pool = db::init_pool(":memory:").await.unwrap();
        db::initialize_schema(&pool).await.unwrap();

        let uploads = TempDir::new().unwrap();
        let project = db::create_project(&pool, CreateProject {
            name: "alpha".into(),
            file_path: uploads.path().to_string_lossy().into_owned(),
        })
        .await
        .unwrap();
        let user = db::create_user(&pool, CreateUser {
            username: "dev".into(),
            access_level: AccessLevel::DEVELOPER,
            api_token: None,
        })
        .await
        .unwrap();
        let bug = db::create_bug(&pool, CreateBug {
            project_id: project.id,
            reporter_id: user.id,
            status: 10,
            summary: "crash".into(),
        })
        .await
        .unwrap();

        let mut config = FileConfig {
            upload_method: method,
            default_upload_folder: uploads.path().to_string_lossy().into_owned(),
            attachments_file_permissions: 0o600,
            ..Default::default()
        };
        tweak(&mut config);

        let backend: Arc<dyn StorageBackend> = match method {
            UploadMethod::Database => Arc::new(DatabaseBackend::new()),
            _ => Arc::new(DiskBackend::new(config.attachments_file_permissions)),
        };
        let service = AttachmentService::new(
            pool.clone(),
            Arc::new(config),
            backend,
            AccessService::new(pool.clone()),
        );

        Harness {
            service,
            pool,
            ctx: RequestContext::new(user.id, project.id),
            bug_id: bug.id,
            project_id: project.id,
            spool: TempDir::new().unwrap(),
            uploads,
        }
    }

    fn spooled(h: &Harness, name: &str, data: &[u8]) -> UploadedFile {
        let path: PathBuf = h.spool.path().join(format!("tmp-{}", name));
        std::fs::write(&path, data).unwrap();
        UploadedFile::new(name, path, "text/plain", data.len() as u64)
    }

    #[tokio::test]
    async fn test_type_check_deny_wins() {
        let h = harness(UploadMethod::Database, |c| {
            c.allowed_files = "exe,png".into();
            c.disallowed_files = "EXE".into();
        })
        .await;
        assert!(!h.service.type_check("setup.exe"));
        assert!(h.service.type_check("photo.PNG"));
        assert!(!h.service.type_check("notes.txt"));
    }

    #[tokio::test]
    async fn test_type_check_files_without_extension() {
        let h = harness(UploadMethod::Database, |_| {}).await;
        assert!(h.service.type_check("README"));
        assert!(h.service.type_check("Makefile"));

        let h = harness(UploadMethod::Database, |c| {
            c.allowed_files = "png,jpg".into();
            c.disallowed_files = " , exe".into();
        })
        .await;
        assert!(!h.service.type_check("README"));
        assert!(h.service.type_check("photo.jpg"));
        assert!(!h.service.type_check("setup.exe"));
    }

    #[tokio::test]
    async fn test_ensure_uploaded_transport_errors() {
        let h = harness(UploadMethod::Database, |_| {}).await;

        let too_big = UploadedFile::failed(UploadError::FormSize);
        assert!(matches!(
            h.service.ensure_uploaded(&too_big).await,
            Err(Error::FileTooBig { .. })
        ));
        let partial = UploadedFile::failed(UploadError::Partial);
        assert!(matches!(h.service.ensure_uploaded(&partial).await, Err(Error::FileNoUpload)));

        let unreadable = UploadedFile::new("a.txt", h.spool.path().join("missing"), "text/plain", 1);
        assert!(matches!(
            h.service.ensure_uploaded(&unreadable).await,
            Err(Error::FileUploadFailed)
        ));
    }

    #[tokio::test]
    async fn test_add_bug_attachment_records_history() {
        let h = harness(UploadMethod::Disk, |_| {}).await;
        let upload = spooled(&h, "report.txt", b"contents");

        let attachment = h
            .service
            .add(&h.ctx, AttachmentTarget::Bug(h.bug_id), &upload, AddOptions::default())
            .await
            .unwrap();

        assert_eq!(attachment.diskfile.len(), 32);
        assert_eq!(attachment.filesize, 8);
        assert!(Path::new(&path_combine(&attachment.folder, &attachment.diskfile)).exists());

        let history = db::list_bug_history(&h.pool, h.bug_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].entry_type, db::FILE_ADDED);
        assert_eq!(history[0].old_value, "report.txt");
    }

    #[tokio::test]
    async fn test_add_rejects_empty_and_unknown_owner() {
        let h = harness(UploadMethod::Database, |_| {}).await;

        let empty = spooled(&h, "empty.txt", b"");
        assert!(matches!(
            h.service
                .add(&h.ctx, AttachmentTarget::Bug(h.bug_id), &empty, AddOptions::default())
                .await,
            Err(Error::FileNoUpload)
        ));

        let upload = spooled(&h, "a.txt", b"x");
        assert!(matches!(
            h.service
                .add(&h.ctx, AttachmentTarget::Bug(424242), &upload, AddOptions::default())
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_upload_folder() {
        let h = harness(UploadMethod::Disk, |_| {}).await;
        db::update_project_file_path(&h.pool, h.project_id, "/definitely/missing/folder")
            .await
            .unwrap();

        let upload = spooled(&h, "a.txt", b"x");
        assert!(matches!(
            h.service
                .add(&h.ctx, AttachmentTarget::Bug(h.bug_id), &upload, AddOptions::default())
                .await,
            Err(Error::InvalidUploadPath(_))
        ));
        assert_eq!(h.service.attachment_count(h.bug_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_project_document_lifecycle() {
        let h = harness(UploadMethod::Database, |_| {}).await;
        let upload = spooled(&h, "manual.pdf", b"%PDF-1.4 body");

        let doc = h
            .service
            .add(
                &h.ctx,
                AttachmentTarget::ProjectDocument(h.project_id),
                &upload,
                AddOptions {
                    title: "Manual".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(doc.title, "Manual");

        let content = h.service.get_content(AttachmentKind::Doc, doc.id).await.unwrap();
        assert_eq!(content.bytes, b"%PDF-1.4 body");
        assert_eq!(content.content_type, "application/pdf");
        assert_eq!(
            h.service.get_field(AttachmentKind::Doc, doc.id, "downloaded").await.unwrap(),
            "1"
        );

        assert_eq!(h.service.delete_project_files(h.project_id).await.unwrap(), 1);
        assert!(h.service.list_documents(h.project_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_logs_history_and_removes_payload() {
        let h = harness(UploadMethod::Disk, |_| {}).await;
        let upload = spooled(&h, "0000001-trace.log", b"trace");
        let attachment = h
            .service
            .add(&h.ctx, AttachmentTarget::Bug(h.bug_id), &upload, AddOptions::default())
            .await
            .unwrap();
        let payload = h.uploads.path().join(&attachment.diskfile);
        assert!(payload.exists());

        h.service
            .delete(&h.ctx, AttachmentKind::Bug, attachment.id)
            .await
            .unwrap();
        assert!(!payload.exists());

        let history = db::list_bug_history(&h.pool, h.bug_id).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.entry_type, db::FILE_DELETED);
        assert_eq!(last.old_value, "trace.log");
    }

    #[tokio::test]
    async fn test_upload_permissions() {
        let h = harness(UploadMethod::Database, |c| c.access.allow_reporter_upload = false).await;
        let bug = db::get_bug(&h.pool, h.bug_id).await.unwrap();

        // Developer clears the bug threshold but not the project one
        assert!(h.service.allow_bug_upload(&h.ctx, Some(&bug)).await.unwrap());
        assert!(!h.service.allow_project_upload(&h.ctx, h.project_id).await.unwrap());

        let off = harness(UploadMethod::Database, |c| c.allow_file_upload = false).await;
        assert!(!off.service.is_uploading_enabled());
        assert!(!off.service.allow_bug_upload(&off.ctx, None).await.unwrap());
    }
}
