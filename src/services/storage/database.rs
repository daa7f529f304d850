//! Inline (database BLOB) storage backend.
//!
//! The payload travels with the attachment row: `store` hands the bytes
//! back for the INSERT and `delete` has nothing to do beyond the row
//! removal the caller performs.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

use super::{StorageBackend, StoredFile};
use crate::models::UploadMethod;
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct DatabaseBackend;

impl DatabaseBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageBackend for DatabaseBackend {
    fn method(&self) -> UploadMethod {
        UploadMethod::Database
    }

    async fn store(&self, upload: &Path, _target: &StoredFile) -> Result<Option<Vec<u8>>> {
        let data = fs::read(upload).await.map_err(|_| Error::FileUploadFailed)?;
        Ok(Some(data))
    }

    async fn fetch(&self, file: &StoredFile, inline: Option<Vec<u8>>) -> Result<Vec<u8>> {
        inline.ok_or_else(|| Error::FileNotFound(file.key.clone()))
    }

    async fn delete(&self, _file: &StoredFile) -> Result<()> {
        Ok(())
    }
}
