//! Application state for bugvault.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::{backend_for, AccessService, AttachmentService, StorageBackend, VisibilityFilter};
use crate::Result;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Attachment lifecycle service.
    pub attachments: AttachmentService,
    /// Attachment permission checks.
    pub visibility: VisibilityFilter,
    /// Access level lookups.
    pub access: AccessService,
}

impl AppState {
    /// Create a new application state: open the database, bootstrap the
    /// schema and build the configured storage backend.
    pub async fn new(config: Config) -> Result<Self> {
        let db = crate::db::init_pool(&config.database.path).await?;
        crate::db::initialize_schema(&db).await?;

        let backend = backend_for(&config.files);
        tracing::info!(method = %backend.method(), "Storage backend selected");

        Ok(Self::from_parts(db, config, backend))
    }

    /// Wire services around an existing pool and backend.
    pub fn from_parts(db: DbPool, config: Config, backend: Arc<dyn StorageBackend>) -> Self {
        let files = Arc::new(config.files.clone());
        let access = AccessService::new(db.clone());
        let attachments =
            AttachmentService::new(db.clone(), files.clone(), backend, access.clone());
        let visibility = VisibilityFilter::new(db.clone(), files, access.clone());

        Self {
            db,
            config: Arc::new(config),
            attachments,
            visibility,
            access,
        }
    }
}
