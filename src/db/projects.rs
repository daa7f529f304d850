//! Project database queries.
//!
//! Projects own bugs and project documents, and may override the upload
//! folder through `file_path`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;

// ============================================================================
// Types
// ============================================================================

/// Project record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub file_path: String,
    pub enabled: bool,
}

impl Project {
    /// The project's own upload folder, if one is configured.
    pub fn upload_path(&self) -> Option<&str> {
        let trimmed = self.file_path.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Input for creating a new project.
#[derive(Debug, Clone, Default)]
pub struct CreateProject {
    pub name: String,
    pub file_path: String,
}

// ============================================================================
// Queries
// ============================================================================

/// Create a new project.
pub async fn create_project(pool: &DbPool, input: CreateProject) -> Result<Project> {
    sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (name, file_path)
        VALUES (?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.name)
    .bind(&input.file_path)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Get a project by ID.
pub async fn get_project(pool: &DbPool, id: i64) -> Result<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Project not found: {}", id)))
}

/// Get a project's configured upload folder (`None` when blank or unknown).
pub async fn get_project_file_path(pool: &DbPool, id: i64) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT file_path FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row
        .map(|(path,)| path.trim().to_string())
        .filter(|path| !path.is_empty()))
}

/// Change a project's upload folder.
pub async fn update_project_file_path(pool: &DbPool, id: i64, file_path: &str) -> Result<()> {
    let result = sqlx::query("UPDATE projects SET file_path = ? WHERE id = ?")
        .bind(file_path)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Project not found: {}", id)));
    }
    Ok(())
}

/// Delete a project row. Documents must be removed first by the caller.
pub async fn delete_project(pool: &DbPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
