//! User and project-access database queries.

use crate::models::AccessLevel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;

use super::DbPool;

// ============================================================================
// Types
// ============================================================================

/// User record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub access_level: i64,
    #[serde(skip_serializing)]
    pub api_token_hash: Option<String>,
    pub enabled: bool,
}

impl User {
    pub fn global_level(&self) -> AccessLevel {
        AccessLevel(self.access_level)
    }
}

/// Input for creating a new user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub access_level: AccessLevel,
    /// Plain API token; only its SHA-256 hash is stored.
    pub api_token: Option<String>,
}

// ============================================================================
// Queries
// ============================================================================

/// Hash an API token using SHA-256.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create a new user.
pub async fn create_user(pool: &DbPool, input: CreateUser) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, access_level, api_token_hash)
        VALUES (?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.username)
    .bind(input.access_level.0)
    .bind(input.api_token.as_deref().map(hash_token))
    .fetch_one(pool)
    .await
    .map_err(Error::Database)
}

/// Get a user by ID.
pub async fn get_user(pool: &DbPool, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))
}

/// Find an enabled user by the hash of their API token.
pub async fn get_user_by_token_hash(pool: &DbPool, token_hash: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE api_token_hash = ? AND enabled = 1")
        .bind(token_hash)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}

/// Grant a user a project-specific access level (replacing any previous one).
pub async fn set_project_access_level(
    pool: &DbPool,
    project_id: i64,
    user_id: i64,
    level: AccessLevel,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO project_user_list (project_id, user_id, access_level)
        VALUES (?, ?, ?)
        ON CONFLICT(project_id, user_id) DO UPDATE SET access_level = excluded.access_level
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .bind(level.0)
    .execute(pool)
    .await?;
    Ok(())
}

/// Get a user's project-specific access level, if one was granted.
pub async fn get_project_access_level(
    pool: &DbPool,
    project_id: i64,
    user_id: i64,
) -> Result<Option<AccessLevel>> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT access_level FROM project_user_list WHERE project_id = ? AND user_id = ?",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(level,)| AccessLevel(level)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_project, init_pool, initialize_schema, CreateProject};

    #[tokio::test]
    async fn test_token_lookup_and_project_levels() {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let user = create_user(
            &pool,
            CreateUser {
                username: "alice".to_string(),
                access_level: AccessLevel::REPORTER,
                api_token: Some("secret-token".to_string()),
            },
        )
        .await
        .unwrap();

        let found = get_user_by_token_hash(&pool, &hash_token("secret-token"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
        assert!(get_user_by_token_hash(&pool, &hash_token("wrong"))
            .await
            .unwrap()
            .is_none());

        let project = create_project(
            &pool,
            CreateProject {
                name: "Alpha".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(get_project_access_level(&pool, project.id, user.id).await.unwrap(), None);
        set_project_access_level(&pool, project.id, user.id, AccessLevel::DEVELOPER)
            .await
            .unwrap();
        set_project_access_level(&pool, project.id, user.id, AccessLevel::MANAGER)
            .await
            .unwrap();
        assert_eq!(
            get_project_access_level(&pool, project.id, user.id).await.unwrap(),
            Some(AccessLevel::MANAGER)
        );
    }
}
