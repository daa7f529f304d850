//! Attachment database queries.
//!
//! Bug attachments live in `bug_file`, project documents in `project_file`.
//! Both tables share one shape, so every query takes an `AttachmentKind`
//! and reads the owner column back as `owner_id`.

use crate::models::AttachmentKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

/// Reference layout of rows written before `folder` became authoritative.
pub const PATH_VERSION_LEGACY: i64 = 1;
/// `diskfile` is the bare storage key, `folder` holds its directory.
pub const PATH_VERSION_CURRENT: i64 = 2;

/// Columns `get_attachment_field` may read.
const READABLE_FIELDS: &[&str] = &[
    "id",
    "bug_id",
    "project_id",
    "title",
    "description",
    "diskfile",
    "filename",
    "folder",
    "filesize",
    "file_type",
    "date_added",
    "user_id",
    "downloaded",
    "path_version",
];

// ============================================================================
// Types
// ============================================================================

/// Attachment record from the database (without the inline payload).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    /// Bug id for bug attachments, project id for documents.
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub diskfile: String,
    pub filename: String,
    pub folder: String,
    pub filesize: i64,
    pub file_type: String,
    pub date_added: i64,
    pub user_id: i64,
    pub downloaded: i64,
    pub path_version: i64,
}

impl Attachment {
    pub fn is_legacy_reference(&self) -> bool {
        self.path_version < PATH_VERSION_CURRENT
    }
}

/// Input for creating a new attachment.
#[derive(Debug, Clone)]
pub struct CreateAttachment {
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub diskfile: String,
    pub filename: String,
    pub folder: String,
    pub filesize: i64,
    pub file_type: String,
    pub date_added: i64,
    /// Inline payload (database backend only).
    pub content: Option<Vec<u8>>,
    pub user_id: i64,
    pub path_version: i64,
}

fn select_columns(kind: AttachmentKind) -> String {
    format!(
        "id, {} AS owner_id, title, description, diskfile, filename, folder, filesize, \
         file_type, date_added, user_id, downloaded, path_version",
        kind.owner_column()
    )
}

// ============================================================================
// Queries
// ============================================================================

/// Create a new attachment and return its id.
///
/// A clash on the `(folder, diskfile)` unique index means another request
/// claimed the same storage key first; it surfaces as `FileDuplicate`.
pub async fn create_attachment(
    pool: &DbPool,
    kind: AttachmentKind,
    input: CreateAttachment,
) -> Result<Attachment> {
    let query = format!(
        r#"
        INSERT INTO {table} ({owner}, title, description, diskfile, filename, folder,
                             filesize, file_type, date_added, content, user_id, path_version)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {columns}
        "#,
        table = kind.table(),
        owner = kind.owner_column(),
        columns = select_columns(kind),
    );

    sqlx::query_as::<_, Attachment>(&query)
        .bind(input.owner_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.diskfile)
        .bind(&input.filename)
        .bind(&input.folder)
        .bind(input.filesize)
        .bind(&input.file_type)
        .bind(input.date_added)
        .bind(input.content.as_deref())
        .bind(input.user_id)
        .bind(input.path_version)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Error::FileDuplicate(input.diskfile.clone())
            }
            other => Error::Database(other),
        })
}

/// Get an attachment by ID.
pub async fn get_attachment(pool: &DbPool, kind: AttachmentKind, id: i64) -> Result<Attachment> {
    let query = format!(
        "SELECT {} FROM {} WHERE id = ?",
        select_columns(kind),
        kind.table()
    );
    sqlx::query_as::<_, Attachment>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Attachment not found: {}", id)))
}

/// Get the inline payload of an attachment (database backend).
pub async fn get_attachment_content(
    pool: &DbPool,
    kind: AttachmentKind,
    id: i64,
) -> Result<Option<Vec<u8>>> {
    let query = format!("SELECT content FROM {} WHERE id = ?", kind.table());
    let row: Option<(Option<Vec<u8>>,)> = sqlx::query_as(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.and_then(|(content,)| content))
}

/// Read a single column of an attachment as text.
///
/// Only known columns may be read; anything else is `FieldNotFound`.
pub async fn get_attachment_field(
    pool: &DbPool,
    kind: AttachmentKind,
    id: i64,
    field: &str,
) -> Result<String> {
    let owner_mismatch = match kind {
        AttachmentKind::Bug => field == "project_id",
        AttachmentKind::Doc => field == "bug_id",
    };
    if !READABLE_FIELDS.contains(&field) || owner_mismatch {
        return Err(Error::FieldNotFound(field.to_string()));
    }

    let query = format!(
        "SELECT CAST({} AS TEXT) FROM {} WHERE id = ?",
        field,
        kind.table()
    );
    let row: Option<(Option<String>,)> = sqlx::query_as(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some((value,)) => Ok(value.unwrap_or_default()),
        None => Err(Error::NotFound(format!("Attachment not found: {}", id))),
    }
}

/// List attachments of one owner, oldest first.
pub async fn list_owner_attachments(
    pool: &DbPool,
    kind: AttachmentKind,
    owner_id: i64,
) -> Result<Vec<Attachment>> {
    let query = format!(
        "SELECT {} FROM {} WHERE {} = ? ORDER BY date_added, id",
        select_columns(kind),
        kind.table(),
        kind.owner_column()
    );
    sqlx::query_as::<_, Attachment>(&query)
        .bind(owner_id)
        .fetch_all(pool)
        .await
        .map_err(Error::Database)
}

/// List attachments of a bug, oldest first.
pub async fn list_bug_attachments(pool: &DbPool, bug_id: i64) -> Result<Vec<Attachment>> {
    list_owner_attachments(pool, AttachmentKind::Bug, bug_id).await
}

/// List documents of a project, oldest first.
pub async fn list_project_documents(pool: &DbPool, project_id: i64) -> Result<Vec<Attachment>> {
    list_owner_attachments(pool, AttachmentKind::Doc, project_id).await
}

/// Count attachments for a bug.
pub async fn count_bug_attachments(pool: &DbPool, bug_id: i64) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bug_file WHERE bug_id = ?")
        .bind(bug_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Whether a bug already has an attachment with this display name.
pub async fn bug_filename_exists(pool: &DbPool, bug_id: i64, filename: &str) -> Result<bool> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM bug_file WHERE bug_id = ? AND filename = ?")
            .bind(bug_id)
            .bind(filename)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Whether a storage key is already used in a folder.
///
/// Checks both tables, and also the legacy form where `diskfile` held the
/// folder and key concatenated.
pub async fn diskfile_in_use(pool: &DbPool, folder: &str, key: &str) -> Result<bool> {
    let legacy = format!("{}{}", folder, key);
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM bug_file
             WHERE (folder = ? AND diskfile = ?) OR diskfile = ?)
          + (SELECT COUNT(*) FROM project_file
             WHERE (folder = ? AND diskfile = ?) OR diskfile = ?)
        "#,
    )
    .bind(folder)
    .bind(key)
    .bind(&legacy)
    .bind(folder)
    .bind(key)
    .bind(&legacy)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Point a bug attachment at a new folder, upgrading it to a current
/// reference (bare key in `diskfile`).
pub async fn relocate_bug_attachment(
    pool: &DbPool,
    bug_id: i64,
    id: i64,
    folder: &str,
    diskfile: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE bug_file SET folder = ?, diskfile = ?, path_version = ? WHERE bug_id = ? AND id = ?",
    )
    .bind(folder)
    .bind(diskfile)
    .bind(PATH_VERSION_CURRENT)
    .bind(bug_id)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Bump the download counter.
pub async fn increment_download_count(pool: &DbPool, kind: AttachmentKind, id: i64) -> Result<()> {
    let query = format!(
        "UPDATE {} SET downloaded = downloaded + 1 WHERE id = ?",
        kind.table()
    );
    sqlx::query(&query).bind(id).execute(pool).await?;
    Ok(())
}

/// Delete an attachment row by ID.
/// Note: This only deletes the database record, not the payload.
pub async fn delete_attachment(pool: &DbPool, kind: AttachmentKind, id: i64) -> Result<()> {
    let query = format!("DELETE FROM {} WHERE id = ?", kind.table());
    let result = sqlx::query(&query).bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Attachment not found: {}", id)));
    }
    Ok(())
}

/// Delete all attachment rows of one owner. Returns the number removed.
pub async fn delete_owner_attachments(
    pool: &DbPool,
    kind: AttachmentKind,
    owner_id: i64,
) -> Result<u64> {
    let query = format!(
        "DELETE FROM {} WHERE {} = ?",
        kind.table(),
        kind.owner_column()
    );
    let result = sqlx::query(&query).bind(owner_id).execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};

    async fn setup_test_db() -> DbPool {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        pool
    }

    fn bug_file(bug_id: i64, filename: &str, key: &str) -> CreateAttachment {
        CreateAttachment {
            owner_id: bug_id,
            title: String::new(),
            description: String::new(),
            diskfile: key.to_string(),
            filename: filename.to_string(),
            folder: "/srv/uploads/".to_string(),
            filesize: 500,
            file_type: "text/plain".to_string(),
            date_added: 1_700_000_000,
            content: None,
            user_id: 3,
            path_version: PATH_VERSION_CURRENT,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_attachment() {
        let pool = setup_test_db().await;

        let created = create_attachment(&pool, AttachmentKind::Bug, bug_file(1001, "report.txt", "k1"))
            .await
            .unwrap();
        assert_eq!(created.owner_id, 1001);

        let fetched = get_attachment(&pool, AttachmentKind::Bug, created.id).await.unwrap();
        assert_eq!(fetched.filename, "report.txt");
        assert!(!fetched.is_legacy_reference());

        assert!(bug_filename_exists(&pool, 1001, "report.txt").await.unwrap());
        assert!(!bug_filename_exists(&pool, 1002, "report.txt").await.unwrap());
        assert_eq!(count_bug_attachments(&pool, 1001).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_storage_key_clash_is_duplicate() {
        let pool = setup_test_db().await;

        create_attachment(&pool, AttachmentKind::Bug, bug_file(1, "a.txt", "same"))
            .await
            .unwrap();
        let clash = create_attachment(&pool, AttachmentKind::Bug, bug_file(2, "b.txt", "same")).await;
        assert!(matches!(clash, Err(Error::FileDuplicate(_))));
    }

    #[tokio::test]
    async fn test_diskfile_in_use_checks_both_forms() {
        let pool = setup_test_db().await;

        create_attachment(&pool, AttachmentKind::Bug, bug_file(1, "a.txt", "abc"))
            .await
            .unwrap();
        let mut legacy = bug_file(1, "b.txt", "/srv/uploads/def");
        legacy.folder = String::new();
        legacy.path_version = PATH_VERSION_LEGACY;
        create_attachment(&pool, AttachmentKind::Doc, legacy).await.unwrap();

        assert!(diskfile_in_use(&pool, "/srv/uploads/", "abc").await.unwrap());
        assert!(diskfile_in_use(&pool, "/srv/uploads/", "def").await.unwrap());
        assert!(!diskfile_in_use(&pool, "/srv/uploads/", "ghi").await.unwrap());
        assert!(!diskfile_in_use(&pool, "/srv/other/", "abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_inline_content_and_fields() {
        let pool = setup_test_db().await;

        let mut input = bug_file(5, "blob.bin", "blobkey");
        input.content = Some(vec![0, 1, 2, 255]);
        let created = create_attachment(&pool, AttachmentKind::Bug, input).await.unwrap();

        let content = get_attachment_content(&pool, AttachmentKind::Bug, created.id)
            .await
            .unwrap();
        assert_eq!(content, Some(vec![0, 1, 2, 255]));

        assert_eq!(
            get_attachment_field(&pool, AttachmentKind::Bug, created.id, "filesize")
                .await
                .unwrap(),
            "500"
        );
        assert!(matches!(
            get_attachment_field(&pool, AttachmentKind::Bug, created.id, "password").await,
            Err(Error::FieldNotFound(_))
        ));
        assert!(matches!(
            get_attachment_field(&pool, AttachmentKind::Bug, created.id, "project_id").await,
            Err(Error::FieldNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_relocate_and_delete_owner() {
        let pool = setup_test_db().await;

        let created = create_attachment(&pool, AttachmentKind::Bug, bug_file(9, "a.txt", "k"))
            .await
            .unwrap();
        relocate_bug_attachment(&pool, 9, created.id, "/srv/b/", "k").await.unwrap();
        let moved = get_attachment(&pool, AttachmentKind::Bug, created.id).await.unwrap();
        assert_eq!(moved.folder, "/srv/b/");

        increment_download_count(&pool, AttachmentKind::Bug, created.id).await.unwrap();
        let downloaded = get_attachment(&pool, AttachmentKind::Bug, created.id).await.unwrap();
        assert_eq!(downloaded.downloaded, 1);

        assert_eq!(delete_owner_attachments(&pool, AttachmentKind::Bug, 9).await.unwrap(), 1);
        assert!(list_bug_attachments(&pool, 9).await.unwrap().is_empty());
    }
}
