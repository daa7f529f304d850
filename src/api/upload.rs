//! Multipart upload spooling.
//!
//! The `file` part is streamed into a temporary file so the lifecycle
//! service sees the same shape a form upload has: a client name, a
//! temporary path, a MIME type and a transport outcome. Body-limit
//! overruns and broken streams become transport errors on the file rather
//! than request failures, so validation reports them uniformly.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::models::{UploadError, UploadedFile};
use crate::{Error, Result};

/// A parsed upload form. The spooled file lives as long as this value.
#[derive(Debug)]
pub struct UploadForm {
    pub file: UploadedFile,
    pub title: String,
    pub description: String,
    _spool: Option<NamedTempFile>,
}

fn transport_error(err: &MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::IniSize
    } else {
        UploadError::Partial
    }
}

/// Stream one file part to disk.
async fn spool(mut field: Field<'_>) -> Result<(UploadedFile, Option<NamedTempFile>)> {
    let name = field.file_name().unwrap_or_default().to_string();
    if name.is_empty() {
        return Ok((UploadedFile::failed(UploadError::NoFile), None));
    }

    let content_type = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| mime_guess::from_path(&name).first_or_octet_stream().to_string());

    let spool = NamedTempFile::new().map_err(|_| Error::FileUploadFailed)?;
    let mut out = tokio::fs::File::create(spool.path())
        .await
        .map_err(|_| Error::FileUploadFailed)?;

    let mut size: u64 = 0;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                size += chunk.len() as u64;
                out.write_all(&chunk)
                    .await
                    .map_err(|_| Error::FileUploadFailed)?;
            }
            Ok(None) => break,
            Err(e) => {
                debug!(file = %name, error = %e, "Upload stream interrupted");
                return Ok((UploadedFile::failed(transport_error(&e)), Some(spool)));
            }
        }
    }
    out.flush().await.map_err(|_| Error::FileUploadFailed)?;

    let file = UploadedFile::new(name, spool.path(), content_type, size);
    Ok((file, Some(spool)))
}

/// Read a `file` / `title` / `description` multipart form.
pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut file = None;
    let mut spooled = None;
    let mut title = String::new();
    let mut description = String::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if file.is_none() {
                    file = Some(UploadedFile::failed(transport_error(&e)));
                }
                break;
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" if file.is_none() => {
                let (uploaded, tmp) = spool(field).await?;
                file = Some(uploaded);
                spooled = tmp;
            }
            "title" => {
                title = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidInput(format!("Failed to read title: {}", e)))?;
            }
            "description" => {
                description = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidInput(format!("Failed to read description: {}", e)))?;
            }
            _ => {}
        }
    }

    Ok(UploadForm {
        file: file.unwrap_or_else(|| UploadedFile::failed(UploadError::NoFile)),
        title,
        description,
        _spool: spooled,
    })
}
