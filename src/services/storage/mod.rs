//! Attachment payload storage.
//!
//! One `StorageBackend` is chosen per deployment from `FILE_UPLOAD_METHOD`
//! and injected into the attachment service:
//! - `DiskBackend` keeps payloads as files in the upload folder
//! - `FtpBackend` mirrors them to an FTP server, keeping a local copy
//! - `DatabaseBackend` stores them inline in the attachment row

mod database;
mod disk;
mod ftp;

pub use database::DatabaseBackend;
pub use disk::{delete_local, move_file, set_mode, DiskBackend};
pub use ftp::{FtpBackend, FtpSession, FtpTransport, SuppaFtpTransport};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::FileConfig;
use crate::models::UploadMethod;
use crate::Result;

/// Location of one stored payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Storage key (the name on the remote side for FTP).
    pub key: String,
    /// Resolved local path.
    pub local_path: String,
}

impl StoredFile {
    pub fn new(key: impl Into<String>, local_path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            local_path: local_path.into(),
        }
    }
}

/// Storage backend trait for the supported upload methods.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which upload method this backend implements.
    fn method(&self) -> UploadMethod;

    /// Persist an uploaded temporary file as `target`.
    ///
    /// Returns the bytes that must be written inline into the attachment
    /// row, if the backend keeps payloads in the database.
    async fn store(&self, upload: &Path, target: &StoredFile) -> Result<Option<Vec<u8>>>;

    /// Read a stored payload. `inline` is the row's blob, if any.
    async fn fetch(&self, file: &StoredFile, inline: Option<Vec<u8>>) -> Result<Vec<u8>>;

    /// Remove one stored payload.
    async fn delete(&self, file: &StoredFile) -> Result<()>;

    /// Remove several payloads in one pass.
    async fn delete_many(&self, files: &[StoredFile]) -> Result<()> {
        for file in files {
            self.delete(file).await?;
        }
        Ok(())
    }
}

/// Build the backend for the configured upload method.
pub fn backend_for(config: &FileConfig) -> Arc<dyn StorageBackend> {
    match config.upload_method {
        UploadMethod::Disk => Arc::new(DiskBackend::new(config.attachments_file_permissions)),
        UploadMethod::Ftp => Arc::new(FtpBackend::new(
            Arc::new(SuppaFtpTransport::new(config.ftp.clone())),
            config.attachments_file_permissions,
        )),
        UploadMethod::Database => Arc::new(DatabaseBackend::new()),
    }
}
