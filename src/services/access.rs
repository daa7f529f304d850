//! Access level checks.
//!
//! A user's level in a project is their `project_user_list` entry when one
//! exists, otherwise their global level. Bug checks use the level in the
//! bug's project.

use tracing::debug;

use crate::config::AttachmentAccessConfig;
use crate::db::{self, Bug, DbPool};
use crate::error::Result;
use crate::models::{AccessLevel, ALL_PROJECTS};

/// Service for checking access levels.
#[derive(Clone)]
pub struct AccessService {
    db: DbPool,
}

impl AccessService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Effective access level of a user in a project.
    ///
    /// Disabled or unknown users have no access at all.
    pub async fn user_project_level(&self, user_id: i64, project_id: i64) -> Result<AccessLevel> {
        let user = match db::get_user(&self.db, user_id).await {
            Ok(user) if user.enabled => user,
            Ok(_) | Err(crate::Error::NotFound(_)) => return Ok(AccessLevel::ANYBODY),
            Err(e) => return Err(e),
        };

        if project_id == ALL_PROJECTS {
            return Ok(user.global_level());
        }

        let level = db::get_project_access_level(&self.db, project_id, user_id)
            .await?
            .unwrap_or_else(|| user.global_level());

        debug!(
            user_id = user_id,
            project_id = project_id,
            level = level.0,
            "Resolved project access level"
        );

        Ok(level)
    }

    pub async fn has_project_level(
        &self,
        threshold: AccessLevel,
        project_id: i64,
        user_id: i64,
    ) -> Result<bool> {
        Ok(self
            .user_project_level(user_id, project_id)
            .await?
            .is_at_least(threshold))
    }

    /// Level of a user on a bug (the level in the bug's project).
    pub async fn bug_level(&self, bug: &Bug, user_id: i64) -> Result<AccessLevel> {
        self.user_project_level(user_id, bug.project_id).await
    }

    pub async fn has_bug_level(&self, threshold: AccessLevel, bug: &Bug, user_id: i64) -> Result<bool> {
        Ok(self.bug_level(bug, user_id).await?.is_at_least(threshold))
    }

    /// A bug is read-only for a user once its status reaches the read-only
    /// threshold, unless the user may update read-only bugs.
    pub async fn is_bug_readonly(
        &self,
        bug: &Bug,
        user_id: i64,
        config: &AttachmentAccessConfig,
    ) -> Result<bool> {
        if bug.status < config.bug_readonly_status_threshold {
            return Ok(false);
        }
        Ok(!self
            .has_bug_level(config.update_readonly_bug_threshold, bug, user_id)
            .await?)
    }
}
