//! Filesystem storage backend.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use super::{StorageBackend, StoredFile};
use crate::models::UploadMethod;
use crate::{Error, Result};

/// Mode applied before unlinking or moving, so read-only files can go.
const WRITABLE_MODE: u32 = 0o775;

/// Stores payloads as files named by their storage key.
pub struct DiskBackend {
    file_mode: u32,
}

impl DiskBackend {
    /// `file_mode` is applied to every stored file (e.g. `0o400`).
    pub fn new(file_mode: u32) -> Self {
        Self { file_mode }
    }

    /// Place an upload at `target`, refusing to overwrite.
    pub(super) async fn place(&self, upload: &Path, target: &str) -> Result<()> {
        if fs::try_exists(target).await? {
            warn!(target = %target, "Storage target already exists");
            return Err(Error::FileDuplicate(target.to_string()));
        }
        move_file(upload, Path::new(target), self.file_mode).await
    }
}

#[async_trait]
impl StorageBackend for DiskBackend {
    fn method(&self) -> UploadMethod {
        UploadMethod::Disk
    }

    async fn store(&self, upload: &Path, target: &StoredFile) -> Result<Option<Vec<u8>>> {
        debug!(upload = %upload.display(), target = %target.local_path, "disk: store");
        self.place(upload, &target.local_path).await?;
        Ok(None)
    }

    async fn fetch(&self, file: &StoredFile, _inline: Option<Vec<u8>>) -> Result<Vec<u8>> {
        fs::read(&file.local_path)
            .await
            .map_err(|_| Error::FileNotFound(file.local_path.clone()))
    }

    async fn delete(&self, file: &StoredFile) -> Result<()> {
        delete_local(Path::new(&file.local_path)).await
    }
}

/// Set unix permission bits; a no-op elsewhere.
pub async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Delete a local file even if it is read-only. Missing files are fine.
pub async fn delete_local(path: &Path) -> Result<()> {
    if fs::try_exists(path).await.unwrap_or(false) {
        set_mode(path, WRITABLE_MODE).await?;
        fs::remove_file(path).await?;
        debug!(path = %path.display(), "Deleted local file");
    }
    Ok(())
}

/// Move a file, falling back to copy + delete when a rename is not possible
/// (e.g. across devices), then apply `mode` to the destination.
pub async fn move_file(from: &Path, to: &Path, mode: u32) -> Result<()> {
    let move_failed = |e: std::io::Error| {
        warn!(from = %from.display(), to = %to.display(), error = %e, "File move failed");
        Error::FileMoveFailed(format!("{} -> {}", from.display(), to.display()))
    };

    if let Err(e) = fs::rename(from, to).await {
        debug!(error = %e, "rename failed, falling back to copy");
        fs::copy(from, to).await.map_err(move_failed)?;
        delete_local(from).await?;
    }

    set_mode(to, mode).await
}
