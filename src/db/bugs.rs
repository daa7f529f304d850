//! Bug database queries.
//!
//! Only the parts of a bug the attachment subsystem touches: its project,
//! reporter, status, last-updated stamp and history log.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

/// History entry type for an added attachment.
pub const FILE_ADDED: i64 = 9;
/// History entry type for a removed attachment.
pub const FILE_DELETED: i64 = 10;

// ============================================================================
// Types
// ============================================================================

/// Bug record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Bug {
    pub id: i64,
    pub project_id: i64,
    pub reporter_id: i64,
    pub status: i64,
    pub summary: String,
    pub last_updated: i64,
}

/// Input for creating a new bug.
#[derive(Debug, Clone, Default)]
pub struct CreateBug {
    pub project_id: i64,
    pub reporter_id: i64,
    pub status: i64,
    pub summary: String,
}

/// A bug history entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub bug_id: i64,
    pub user_id: i64,
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub entry_type: i64,
    pub date_modified: i64,
}

// ============================================================================
// Queries
// ============================================================================

/// Create a new bug.
pub async fn create_bug(pool: &DbPool, input: CreateBug) -> Result<Bug> {
    sqlx::query_as::<_, Bug>(
        r#"
        INSERT INTO bugs (project_id, reporter_id, status, summary, last_updated)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(input.project_id)
    .bind(input.reporter_id)
    .bind(input.status)
    .bind(&input.summary)
    .bind(crate::models::now())
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Get a bug by ID.
pub async fn get_bug(pool: &DbPool, id: i64) -> Result<Bug> {
    sqlx::query_as::<_, Bug>("SELECT * FROM bugs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Bug not found: {}", id)))
}

/// Stamp a bug as modified now.
pub async fn touch_bug(pool: &DbPool, id: i64) -> Result<()> {
    sqlx::query("UPDATE bugs SET last_updated = ? WHERE id = ?")
        .bind(crate::models::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Reassign a bug to another project.
pub async fn update_bug_project(pool: &DbPool, id: i64, project_id: i64) -> Result<()> {
    let result = sqlx::query("UPDATE bugs SET project_id = ?, last_updated = ? WHERE id = ?")
        .bind(project_id)
        .bind(crate::models::now())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Bug not found: {}", id)));
    }
    Ok(())
}

/// Delete a bug row and its history. Attachments must be removed first.
pub async fn delete_bug(pool: &DbPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM bug_history WHERE bug_id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM bugs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Append a special history event (attachment added/removed and similar),
/// where only the new value is meaningful.
pub async fn log_history_event(
    pool: &DbPool,
    bug_id: i64,
    user_id: i64,
    entry_type: i64,
    value: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO bug_history (bug_id, user_id, type, old_value, date_modified)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(bug_id)
    .bind(user_id)
    .bind(entry_type)
    .bind(value)
    .bind(crate::models::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// List a bug's history, oldest first.
pub async fn list_bug_history(pool: &DbPool, bug_id: i64) -> Result<Vec<HistoryEntry>> {
    sqlx::query_as::<_, HistoryEntry>(
        "SELECT * FROM bug_history WHERE bug_id = ? ORDER BY date_modified, id",
    )
    .bind(bug_id)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};

    #[tokio::test]
    async fn test_bug_project_update_and_history() {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let bug = create_bug(
            &pool,
            CreateBug {
                project_id: 1,
                reporter_id: 7,
                status: 10,
                summary: "Crash on save".to_string(),
            },
        )
        .await
        .unwrap();

        update_bug_project(&pool, bug.id, 2).await.unwrap();
        assert_eq!(get_bug(&pool, bug.id).await.unwrap().project_id, 2);

        log_history_event(&pool, bug.id, 7, FILE_ADDED, "trace.log").await.unwrap();
        let history = list_bug_history(&pool, bug.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].entry_type, FILE_ADDED);
        assert_eq!(history[0].old_value, "trace.log");

        delete_bug(&pool, bug.id).await.unwrap();
        assert!(matches!(get_bug(&pool, bug.id).await, Err(Error::NotFound(_))));
    }
}
