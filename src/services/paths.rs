//! Attachment path resolution.
//!
//! Rows written by older releases stored either a bare file name or a full
//! path in `diskfile`, and projects may have had their upload folder moved
//! since. Current rows keep the bare key in `diskfile` and the directory in
//! `folder`. This module turns either form into a usable local path.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::db::Attachment;
use crate::{Error, Result};

/// Join a directory and a file name with exactly one `/` between them.
pub fn path_combine(dir: &str, filename: &str) -> String {
    format!("{}/{}", dir.trim_end_matches(['/', '\\']), filename)
}

/// Last path component, accepting both separator styles.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn has_separator(path: &str) -> bool {
    path.contains('/') || path.contains('\\')
}

async fn exists(path: &str) -> bool {
    !path.is_empty() && fs::try_exists(path).await.unwrap_or(false)
}

/// Upload folder for a project: its own `file_path`, else the default.
pub fn upload_folder(project_path: Option<&str>, default_path: &str) -> String {
    match project_path.map(str::trim) {
        Some(path) if !path.is_empty() => path.to_string(),
        _ => default_path.to_string(),
    }
}

/// Resolve a stored `diskfile` to a local path.
///
/// 1. An existing path is returned as is.
/// 2. Project folder + base name, if that exists.
/// 3. Default folder + base name, if that exists.
/// 4. A bare name (no separator) gets the expected path from 2 or 3,
///    without checking existence.
/// 5. Anything else is returned unchanged.
pub async fn normalize_attachment_path(
    diskfile: &str,
    project_path: Option<&str>,
    default_path: &str,
) -> String {
    if exists(diskfile).await {
        return diskfile.to_string();
    }

    let base = basename(diskfile);
    let mut expected: Option<String> = None;

    if let Some(project_path) = project_path.filter(|p| !p.trim().is_empty()) {
        let candidate = path_combine(project_path, base);
        if exists(&candidate).await {
            return candidate;
        }
        expected = Some(candidate);
    }

    if !default_path.trim().is_empty() {
        let candidate = path_combine(default_path, base);
        if exists(&candidate).await {
            return candidate;
        }
        expected.get_or_insert(candidate);
    }

    match expected {
        Some(path) if !has_separator(diskfile) => path,
        _ => diskfile.to_string(),
    }
}

/// Local path of an attachment's payload.
///
/// Current rows resolve from `folder` while the payload is still there.
/// Legacy rows, and current rows whose project folder has since been
/// reconfigured, go through `normalize_attachment_path`. A current row
/// found nowhere keeps its recorded location.
pub async fn resolve_attachment_path(
    attachment: &Attachment,
    project_path: Option<&str>,
    default_path: &str,
) -> String {
    let recorded = (!attachment.is_legacy_reference() && !attachment.folder.is_empty())
        .then(|| path_combine(&attachment.folder, &attachment.diskfile));

    if let Some(recorded) = &recorded {
        if exists(recorded).await {
            return recorded.clone();
        }
    }

    let resolved = normalize_attachment_path(&attachment.diskfile, project_path, default_path).await;
    debug!(
        attachment_id = attachment.id,
        diskfile = %attachment.diskfile,
        resolved = %resolved,
        "Resolved attachment path through the normalizer"
    );

    match recorded {
        Some(recorded) if !exists(&resolved).await => recorded,
        _ => resolved,
    }
}

/// Check that an upload folder exists, is a directory, and is readable and
/// writable.
pub async fn ensure_valid_upload_path(path: &str) -> Result<()> {
    let invalid = || Error::InvalidUploadPath(path.to_string());

    if path.trim().is_empty() {
        return Err(invalid());
    }

    let metadata = fs::metadata(path).await.map_err(|_| invalid())?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        warn!(path = %path, "Upload path is not a writable directory");
        return Err(invalid());
    }

    // Readable: the directory can be listed.
    fs::read_dir(Path::new(path)).await.map_err(|_| invalid())?;

    Ok(())
}
