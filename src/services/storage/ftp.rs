//! FTP storage backend.
//!
//! Every operation opens its own FTP session (connect, login, transfer,
//! quit); bulk deletes share one session across all files. A local copy is
//! kept in the upload folder, so downloads only hit the server when that
//! copy is missing.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tokio::fs;
use tracing::{debug, warn};

use super::disk::{delete_local, DiskBackend};
use super::{StorageBackend, StoredFile};
use crate::config::FtpConfig;
use crate::models::UploadMethod;
use crate::{Error, Result};

/// Opens authenticated FTP sessions. Calls block; the backend runs them on
/// the blocking pool.
pub trait FtpTransport: Send + Sync {
    /// Connect and log in. Either failing is `FtpConnectionFailed`.
    fn connect(&self) -> Result<Box<dyn FtpSession>>;
}

/// One logged-in FTP session in binary mode.
pub trait FtpSession: Send {
    fn put(&mut self, remote: &str, data: &[u8]) -> Result<()>;
    fn get(&mut self, remote: &str) -> Result<Vec<u8>>;
    fn delete(&mut self, remote: &str) -> Result<()>;
    fn quit(self: Box<Self>);
}

/// Stores payloads on an FTP server, mirrored in the local upload folder.
pub struct FtpBackend {
    transport: Arc<dyn FtpTransport>,
    local: DiskBackend,
}

impl FtpBackend {
    pub fn new(transport: Arc<dyn FtpTransport>, file_mode: u32) -> Self {
        Self {
            transport,
            local: DiskBackend::new(file_mode),
        }
    }

    /// Run `op` inside a fresh session, always quitting afterwards.
    async fn with_session<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn FtpSession) -> Result<T> + Send + 'static,
    {
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = transport.connect()?;
            let result = op(session.as_mut());
            session.quit();
            result
        })
        .await?
    }
}

#[async_trait]
impl StorageBackend for FtpBackend {
    fn method(&self) -> UploadMethod {
        UploadMethod::Ftp
    }

    async fn store(&self, upload: &Path, target: &StoredFile) -> Result<Option<Vec<u8>>> {
        // Refuse before touching the server, so no remote file is orphaned.
        if fs::try_exists(&target.local_path).await? {
            warn!(target = %target.local_path, "Storage target already exists");
            return Err(Error::FileDuplicate(target.local_path.clone()));
        }

        let data = fs::read(upload).await.map_err(|_| Error::FileUploadFailed)?;
        let remote = target.key.clone();
        debug!(remote = %remote, size = data.len(), "ftp: put");

        self.with_session(move |session| session.put(&remote, &data))
            .await?;

        if let Err(e) = self.local.place(upload, &target.local_path).await {
            let remote = target.key.clone();
            let cleanup = self
                .with_session(move |session| session.delete(&remote))
                .await;
            if let Err(cleanup) = cleanup {
                warn!(remote = %target.key, error = %cleanup, "ftp: could not remove remote copy");
            }
            return Err(e);
        }
        Ok(None)
    }

    async fn fetch(&self, file: &StoredFile, _inline: Option<Vec<u8>>) -> Result<Vec<u8>> {
        if fs::try_exists(&file.local_path).await.unwrap_or(false) {
            return self.local.fetch(file, None).await;
        }

        let remote = file.key.clone();
        debug!(remote = %remote, local = %file.local_path, "ftp: local copy missing, fetching");
        let data = self
            .with_session(move |session| session.get(&remote))
            .await?;

        // Re-populate the local copy; a failure here only costs a refetch.
        if let Err(e) = fs::write(&file.local_path, &data).await {
            warn!(local = %file.local_path, error = %e, "ftp: could not cache local copy");
        }

        Ok(data)
    }

    async fn delete(&self, file: &StoredFile) -> Result<()> {
        self.delete_many(std::slice::from_ref(file)).await
    }

    async fn delete_many(&self, files: &[StoredFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = files.iter().map(|f| f.key.clone()).collect();
        self.with_session(move |session| {
            for key in &keys {
                // A remote file that is already gone is not an error.
                if let Err(e) = session.delete(key) {
                    warn!(remote = %key, error = %e, "ftp: delete failed");
                }
            }
            Ok(())
        })
        .await?;

        for file in files {
            delete_local(Path::new(&file.local_path)).await?;
        }
        Ok(())
    }
}

/// Production transport backed by `suppaftp`.
pub struct SuppaFtpTransport {
    config: FtpConfig,
}

impl SuppaFtpTransport {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    fn address(&self) -> String {
        if self.config.server.contains(':') {
            self.config.server.clone()
        } else {
            format!("{}:21", self.config.server)
        }
    }
}

impl FtpTransport for SuppaFtpTransport {
    fn connect(&self) -> Result<Box<dyn FtpSession>> {
        let address = self.address();
        let mut stream = FtpStream::connect(&address)
            .map_err(|e| Error::FtpConnectionFailed(format!("{}: {}", address, e)))?;

        stream
            .login(&self.config.user, &self.config.pass)
            .map_err(|e| Error::FtpConnectionFailed(format!("login as {}: {}", self.config.user, e)))?;

        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| Error::FtpConnectionFailed(format!("binary mode: {}", e)))?;

        Ok(Box::new(SuppaFtpSession { stream }))
    }
}

struct SuppaFtpSession {
    stream: FtpStream,
}

impl FtpSession for SuppaFtpSession {
    fn put(&mut self, remote: &str, data: &[u8]) -> Result<()> {
        self.stream
            .put_file(remote, &mut Cursor::new(data))
            .map(|_| ())
            .map_err(|e| Error::Internal(format!("FTP upload of {} failed: {}", remote, e)))
    }

    fn get(&mut self, remote: &str) -> Result<Vec<u8>> {
        self.stream
            .retr_as_buffer(remote)
            .map(Cursor::into_inner)
            .map_err(|e| Error::FileNotFound(format!("ftp://{}: {}", remote, e)))
    }

    fn delete(&mut self, remote: &str) -> Result<()> {
        self.stream
            .rm(remote)
            .map_err(|e| Error::Internal(format!("FTP delete of {} failed: {}", remote, e)))
    }

    fn quit(mut self: Box<Self>) {
        if let Err(e) = self.stream.quit() {
            debug!(error = %e, "ftp: quit failed");
        }
    }
}
